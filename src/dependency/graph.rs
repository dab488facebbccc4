use std::collections::{BTreeMap, BTreeSet};

use crate::access::AccessMode;

/// Identifier of a vertex in a dependency [`Graph`].
///
/// Vertices are numbered from 1 in creation order;
/// 0 stands for "before everything" and produces keys nothing else writes.
pub type VertexId = usize;

/// Error in using a dependency [`Graph`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Vertices or dependencies were added, or `finalize` called, after finalizing.
    #[error("the graph has already been finalized")]
    AlreadyFinalized,
    /// Results were requested before finalizing.
    #[error("the graph has not been finalized yet")]
    NotFinalized,
    /// A vertex id that was never handed out.
    #[error("vertex {0} does not exist")]
    UnknownVertex(VertexId),
}

/// A resolved dependency: `consumer` reads `key` as last written by `producer`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DependencyEdge<Key> {
    /// The vertex whose write is read.
    pub producer: VertexId,
    /// The data read.
    pub key: Key,
    /// The reading vertex.
    pub consumer: VertexId,
}

impl<Key> DependencyEdge<Key> {
    /// Whether this edge crosses from one repetition of the whole sequence to the next,
    /// i.e. the consumer reads what the producer wrote in the previous iteration.
    #[inline]
    pub fn is_wraparound(&self) -> bool {
        self.producer >= self.consumer
    }
}

#[derive(Clone, Debug)]
struct Finalized<Key> {
    vertices: BTreeSet<VertexId>,
    edges: Vec<DependencyEdge<Key>>,
}

/// A read/write dependency resolver over opaque data keys.
///
/// Vertices (kernel invocations) are created in execution order,
/// and each declares how it accesses some keys.
/// [`finalize`][Self::finalize] then connects every reader of a key
/// to the last writer of that key before it,
/// or, if nothing writes it earlier, to the last writer overall,
/// as in a loop that runs the whole sequence repeatedly.
///
/// ```
/// # use kernelmesh::{AccessMode, Graph};
/// let mut graph = Graph::new();
/// let a = graph.add_vertex().unwrap();
/// let b = graph.add_vertex().unwrap();
/// graph.add_dependency(a, "field", AccessMode::Write).unwrap();
/// graph.add_dependency(b, "field", AccessMode::Read).unwrap();
/// graph.finalize().unwrap();
///
/// let edges = graph.edges().unwrap();
/// assert_eq!(edges.len(), 1);
/// assert_eq!((edges[0].producer, edges[0].consumer), (a, b));
/// ```
#[derive(Clone, Debug)]
pub struct Graph<Key> {
    next_vertex: VertexId,
    reads: BTreeMap<Key, BTreeSet<VertexId>>,
    writes: BTreeMap<Key, BTreeSet<VertexId>>,
    finalized: Option<Finalized<Key>>,
}

impl<Key> Default for Graph<Key> {
    fn default() -> Self {
        Self {
            next_vertex: 1,
            reads: BTreeMap::new(),
            writes: BTreeMap::new(),
            finalized: None,
        }
    }
}

impl<Key: Ord + Clone + std::fmt::Debug> Graph<Key> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new vertex, ordered after every existing one.
    pub fn add_vertex(&mut self) -> Result<VertexId, GraphError> {
        if self.finalized.is_some() {
            return Err(GraphError::AlreadyFinalized);
        }
        let id = self.next_vertex;
        self.next_vertex += 1;
        Ok(id)
    }

    /// Declare that a vertex accesses a key in the given mode.
    ///
    /// An [`Accumulate`][AccessMode::Accumulate] access creates an extra vertex
    /// and declares a read and a write of the key at both.
    pub fn add_dependency(
        &mut self,
        vertex: VertexId,
        key: Key,
        mode: AccessMode,
    ) -> Result<(), GraphError> {
        if self.finalized.is_some() {
            return Err(GraphError::AlreadyFinalized);
        }
        if vertex == 0 || vertex >= self.next_vertex {
            return Err(GraphError::UnknownVertex(vertex));
        }
        match mode {
            AccessMode::Accumulate => {
                let fold = self.add_vertex()?;
                for v in [vertex, fold] {
                    self.declare(v, key.clone(), true, true);
                }
            }
            _ => self.declare(vertex, key, mode.reads(), mode.writes()),
        }
        Ok(())
    }

    fn declare(&mut self, vertex: VertexId, key: Key, read: bool, write: bool) {
        if read {
            self.reads.entry(key.clone()).or_default().insert(vertex);
        }
        if write {
            self.writes.entry(key).or_default().insert(vertex);
        }
    }

    /// Resolve all declared dependencies into edges.
    /// No more vertices or dependencies can be added afterwards.
    ///
    /// Keys that are written but never read get a new reader vertex after all others,
    /// and keys that are read but never written are written by vertex 0.
    pub fn finalize(&mut self) -> Result<(), GraphError> {
        if self.finalized.is_some() {
            return Err(GraphError::AlreadyFinalized);
        }

        let unread: Vec<Key> = self
            .writes
            .keys()
            .filter(|k| !self.reads.contains_key(*k))
            .cloned()
            .collect();
        for key in unread {
            let reader = self.add_vertex()?;
            log::trace!("key {key:?} is never read, adding trailing reader {reader}");
            self.reads.entry(key).or_default().insert(reader);
        }
        let unwritten: Vec<Key> = self
            .reads
            .keys()
            .filter(|k| !self.writes.contains_key(*k))
            .cloned()
            .collect();
        for key in unwritten {
            log::trace!("key {key:?} is never written, produced by vertex 0");
            self.writes.entry(key).or_default().insert(0);
        }

        let mut edges = Vec::new();
        for (key, readers) in &self.reads {
            let writers = &self.writes[key];
            for &reader in readers {
                // last writer before the reader, wrapping around to the last overall
                let producer = writers
                    .range(..reader)
                    .next_back()
                    .or_else(|| writers.last())
                    .copied()
                    .expect("Key with no writers after finalize. This is a bug in kernelmesh");
                log::trace!("{key:?}: {producer} -> {reader}");
                edges.push(DependencyEdge {
                    producer,
                    key: key.clone(),
                    consumer: reader,
                });
            }
        }

        let mut vertices: BTreeSet<VertexId> = (1..self.next_vertex).collect();
        if edges.iter().any(|e| e.producer == 0) {
            vertices.insert(0);
        }
        log::debug!(
            "dependency graph finalized with {} vertices and {} edges",
            vertices.len(),
            edges.len()
        );
        self.finalized = Some(Finalized { vertices, edges });
        Ok(())
    }

    /// Whether [`finalize`][Self::finalize] has been called.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    fn finalized(&self) -> Result<&Finalized<Key>, GraphError> {
        self.finalized.as_ref().ok_or(GraphError::NotFinalized)
    }

    /// Get all vertices of the finalized graph,
    /// including synthesized ones.
    pub fn vertices(&self) -> Result<&BTreeSet<VertexId>, GraphError> {
        Ok(&self.finalized()?.vertices)
    }

    /// Get all edges of the finalized graph,
    /// grouped by key in key order and by consumer within each key.
    pub fn edges(&self) -> Result<&[DependencyEdge<Key>], GraphError> {
        Ok(&self.finalized()?.edges)
    }

    /// Iterate over the edges a vertex depends on.
    pub fn dependencies_of(
        &self,
        vertex: VertexId,
    ) -> Result<impl '_ + Iterator<Item = &DependencyEdge<Key>>, GraphError> {
        let finalized = self.finalized()?;
        if !finalized.vertices.contains(&vertex) {
            return Err(GraphError::UnknownVertex(vertex));
        }
        Ok(finalized.edges.iter().filter(move |e| e.consumer == vertex))
    }

    /// Get a topological order of the vertices over the edges within one iteration
    /// (wraparound edges are left out).
    ///
    /// Among vertices whose dependencies are all satisfied,
    /// the lowest id goes first.
    pub fn execution_order(&self) -> Result<Vec<VertexId>, GraphError> {
        Ok(self.execution_levels()?.into_iter().flatten().collect())
    }

    /// Group the vertices into levels where every vertex only depends
    /// on vertices in earlier levels (wraparound edges are left out),
    /// so that the vertices of one level can run concurrently.
    pub fn execution_levels(&self) -> Result<Vec<Vec<VertexId>>, GraphError> {
        let finalized = self.finalized()?;
        let mut in_degree: BTreeMap<VertexId, usize> =
            finalized.vertices.iter().map(|&v| (v, 0)).collect();
        let mut successors: BTreeMap<VertexId, Vec<VertexId>> = BTreeMap::new();
        for edge in finalized.edges.iter().filter(|e| !e.is_wraparound()) {
            *in_degree.entry(edge.consumer).or_default() += 1;
            successors.entry(edge.producer).or_default().push(edge.consumer);
        }

        let mut levels = Vec::new();
        let mut ready: Vec<VertexId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&v, _)| v)
            .collect();
        while !ready.is_empty() {
            let mut next = Vec::new();
            for v in &ready {
                for s in successors.get(v).into_iter().flatten() {
                    let degree = in_degree
                        .get_mut(s)
                        .expect("Edge to unknown vertex. This is a bug in kernelmesh");
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*s);
                    }
                }
            }
            next.sort_unstable();
            levels.push(std::mem::replace(&mut ready, next));
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(
        producer: VertexId,
        key: &'static str,
        consumer: VertexId,
    ) -> DependencyEdge<&'static str> {
        DependencyEdge {
            producer,
            key,
            consumer,
        }
    }

    #[test]
    fn write_to_read() {
        let mut graph = Graph::new();
        let a = graph.add_vertex().unwrap();
        let b = graph.add_vertex().unwrap();
        graph.add_dependency(a, "field", AccessMode::Write).unwrap();
        graph.add_dependency(b, "field", AccessMode::Read).unwrap();
        graph.finalize().unwrap();
        assert_eq!(graph.edges().unwrap(), &[edge(a, "field", b)]);
        assert_eq!(graph.execution_order().unwrap(), vec![a, b]);
    }

    #[test]
    fn cyclic_read_write() {
        let mut graph = Graph::new();
        let [a, b, c] = [(); 3].map(|_| graph.add_vertex().unwrap());
        for v in [a, b, c] {
            graph.add_dependency(v, "field", AccessMode::ReadWrite).unwrap();
        }
        graph.finalize().unwrap();
        assert_eq!(
            graph.edges().unwrap(),
            &[edge(c, "field", a), edge(a, "field", b), edge(b, "field", c)]
        );
        assert!(graph.edges().unwrap()[0].is_wraparound());
        assert_eq!(graph.execution_levels().unwrap(), vec![vec![a], vec![b], vec![c]]);
    }

    #[test]
    fn isolated_read() {
        let mut graph = Graph::new();
        let l = graph.add_vertex().unwrap();
        graph.add_dependency(l, "field", AccessMode::Read).unwrap();
        graph.finalize().unwrap();

        let vertices = graph.vertices().unwrap();
        assert_eq!(vertices.len(), 2);
        let edges = graph.edges().unwrap();
        assert_eq!(edges, &[edge(0, "field", l)]);
        // the synthesized producer depends on nothing
        assert_eq!(graph.dependencies_of(0).unwrap().count(), 0);
        assert_eq!(graph.dependencies_of(l).unwrap().count(), 1);
    }

    #[test]
    fn unread_write_gets_trailing_reader() {
        let mut graph = Graph::new();
        let w = graph.add_vertex().unwrap();
        graph.add_dependency(w, "out", AccessMode::Write).unwrap();
        graph.finalize().unwrap();
        let edges = graph.edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].producer, w);
        assert!(edges[0].consumer > w);
        assert!(!edges[0].is_wraparound());
        assert_eq!(graph.vertices().unwrap().len(), 2);
    }

    #[test]
    fn accumulate() {
        let mut graph = Graph::new();
        let a = graph.add_vertex().unwrap();
        let b = graph.add_vertex().unwrap();
        let r = graph.add_vertex().unwrap();
        graph.add_dependency(a, "sum", AccessMode::Accumulate).unwrap();
        graph.add_dependency(b, "sum", AccessMode::Accumulate).unwrap();
        graph.add_dependency(r, "sum", AccessMode::Read).unwrap();
        graph.finalize().unwrap();

        // two accumulations, each with its own fold vertex
        assert_eq!(graph.vertices().unwrap().len(), 5);
        let edges = graph.edges().unwrap();
        // every reader has exactly one producer
        let consumers: BTreeSet<VertexId> = edges.iter().map(|e| e.consumer).collect();
        assert_eq!(consumers.len(), edges.len());
        // the plain reader sees the contribution of the last accumulation
        assert!(edges.iter().any(|e| e.consumer == r && e.producer == b));
    }

    #[test]
    fn independent_keys_run_concurrently() {
        let mut graph = Graph::new();
        let w1 = graph.add_vertex().unwrap();
        let w2 = graph.add_vertex().unwrap();
        let r = graph.add_vertex().unwrap();
        graph.add_dependency(w1, "x", AccessMode::Write).unwrap();
        graph.add_dependency(w2, "y", AccessMode::Write).unwrap();
        graph.add_dependency(r, "x", AccessMode::Read).unwrap();
        graph.add_dependency(r, "y", AccessMode::Read).unwrap();
        graph.finalize().unwrap();
        assert_eq!(
            graph.execution_levels().unwrap(),
            vec![vec![w1, w2], vec![r]]
        );
    }

    #[test]
    fn usage_errors() {
        let mut graph: Graph<u32> = Graph::new();
        assert_eq!(graph.edges().unwrap_err(), GraphError::NotFinalized);
        let v = graph.add_vertex().unwrap();
        assert_eq!(
            graph.add_dependency(0, 1, AccessMode::Read),
            Err(GraphError::UnknownVertex(0))
        );
        assert_eq!(
            graph.add_dependency(v + 1, 1, AccessMode::Read),
            Err(GraphError::UnknownVertex(v + 1))
        );
        graph.finalize().unwrap();
        assert_eq!(graph.finalize(), Err(GraphError::AlreadyFinalized));
        assert_eq!(graph.add_vertex(), Err(GraphError::AlreadyFinalized));
        // a vertex without dependencies is still part of the graph
        assert_eq!(graph.vertices().unwrap().len(), 1);
        assert!(graph.edges().unwrap().is_empty());
    }
}
