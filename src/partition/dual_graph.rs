//! The dual graph of a set of elements, in the CSR form graph partitioners expect.
//
// Each element is a vertex, and two elements are connected
// if they share at least `num_common_nodes` nodes.
// With `num_common_nodes` equal to the number of nodes in a face
// this connects cells across faces.
//
// * `xadj[i] .. xadj[i+1]` = range of the neighbour list of element i in `adjncy`
// * `adjncy`               = concatenated sorted neighbour lists
// * `vwgt[i]`              = vertex weight, 1 for every element
//
// The graph is symmetric and has no self loops.

use super::{check_elements, PartitionError};

/// CSR adjacency of the dual graph of a set of elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DualGraph {
    /// Offsets of each vertex's neighbor list in `adjncy`, one more than the vertex count.
    pub xadj: Vec<usize>,
    /// Concatenated sorted neighbor lists.
    pub adjncy: Vec<usize>,
    /// Vertex weights, 1 for every element.
    pub vwgt: Vec<i32>,
}

impl DualGraph {
    /// Build the dual graph of a flat element list
    /// where every `element_size` indices form one element.
    pub fn from_elements(
        elements: &[usize],
        element_size: usize,
        num_nodes: usize,
        num_common_nodes: usize,
    ) -> Result<Self, PartitionError> {
        let count = check_elements(elements, element_size, num_nodes, 1)?;
        if num_common_nodes == 0 || num_common_nodes > element_size {
            return Err(PartitionError::InvalidCommonNodes {
                num_common_nodes,
                element_size,
            });
        }

        // node -> elements containing it, also in CSR form
        let mut node_offsets = vec![0usize; num_nodes + 1];
        for &node in elements {
            node_offsets[node + 1] += 1;
        }
        for i in 0..num_nodes {
            node_offsets[i + 1] += node_offsets[i];
        }
        let mut node_elements = vec![0usize; elements.len()];
        let mut fill = node_offsets.clone();
        for (element_idx, element) in elements.chunks_exact(element_size).enumerate() {
            for &node in element {
                node_elements[fill[node]] = element_idx;
                fill[node] += 1;
            }
        }

        // count shared nodes with every element reachable through a node,
        // reusing one counter array and resetting only the touched entries
        let mut shared = vec![0usize; count];
        let mut touched: Vec<usize> = Vec::new();
        let mut xadj = Vec::with_capacity(count + 1);
        xadj.push(0);
        let mut adjncy = Vec::new();
        for (element_idx, element) in elements.chunks_exact(element_size).enumerate() {
            for &node in element {
                for &other in &node_elements[node_offsets[node]..node_offsets[node + 1]] {
                    if other == element_idx {
                        continue;
                    }
                    if shared[other] == 0 {
                        touched.push(other);
                    }
                    shared[other] += 1;
                }
            }
            touched.sort_unstable();
            for &other in &touched {
                if shared[other] >= num_common_nodes {
                    adjncy.push(other);
                }
                shared[other] = 0;
            }
            touched.clear();
            xadj.push(adjncy.len());
        }

        Ok(Self {
            xadj,
            adjncy,
            vwgt: vec![1; count],
        })
    }

    /// Number of vertices (elements) in the graph.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.xadj.len() - 1
    }

    /// Number of undirected edges in the graph.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.adjncy.len() / 2
    }

    /// Sorted neighbors of a vertex.
    #[inline]
    pub fn neighbors(&self, vertex: usize) -> &[usize] {
        &self.adjncy[self.xadj[vertex]..self.xadj[vertex + 1]]
    }

    /// Computes the edge cut of a partitioning,
    /// i.e. the number of edges between vertices in different parts.
    ///
    /// # Panics
    ///
    /// If `parts` doesn't have an entry for every vertex.
    pub fn edge_cut(&self, parts: &[usize]) -> usize {
        assert_eq!(parts.len(), self.num_vertices(), "partition vector length mismatch");
        (0..self.num_vertices())
            .map(|v| {
                self.neighbors(v)
                    .iter()
                    .filter(|&&u| u > v && parts[u] != parts[v])
                    .count()
            })
            .sum()
    }
}
