//! Assigning mesh elements and nodes to partitions.
//!
//! A [`Partitioner`] splits a flat list of elements (fixed-size node index tuples)
//! into a given number of parts and assigns every node to the part
//! of the lowest-index element containing it.
//! [`create_partitions`] applies a partitioner twice
//! to build the two-level L1/L2 hierarchy and reorders the mesh
//! so that every L2 partition occupies a contiguous range of cells and nodes.

mod dual_graph;
pub use dual_graph::DualGraph;

mod graph_growing;
pub use graph_growing::GraphGrowing;

#[cfg(feature = "metis")]
mod metis;
#[cfg(feature = "metis")]
pub use self::metis::Metis;

mod hierarchy;
pub use hierarchy::{create_partitions, PartitionLayout};

use crate::mesh::MeshError;

/// Error in partitioning a mesh.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// The identity partitioner can only produce a single partition.
    #[error("the identity partitioner can't create {requested} partitions, only 1")]
    IdentityRequiresSinglePartition {
        /// Number of partitions asked for.
        requested: usize,
    },
    /// Zero partitions were requested.
    #[error("number of partitions must be at least 1")]
    ZeroPartitions,
    /// The shared node threshold of a dual graph is unsatisfiable.
    #[error(
        "elements of size {element_size} can't share {num_common_nodes} nodes \
        (must be between 1 and the element size)"
    )]
    InvalidCommonNodes {
        /// The requested threshold.
        num_common_nodes: usize,
        /// Number of nodes per element.
        element_size: usize,
    },
    /// The flat element list can't be split into whole elements.
    #[error(
        "element index list of length {len} \
        is not a multiple of the element size {element_size}"
    )]
    ElementSizeMismatch {
        /// Length of the given index list.
        len: usize,
        /// Number of nodes per element.
        element_size: usize,
    },
    /// A partition layout doesn't describe the mesh it was paired with.
    #[error(
        "partition layout covers {layout_elements} elements and {layout_nodes} nodes, \
        but the mesh has {mesh_elements} and {mesh_nodes}"
    )]
    LayoutMismatch {
        /// Number of elements the layout assigns.
        layout_elements: usize,
        /// Number of nodes the layout assigns.
        layout_nodes: usize,
        /// Number of cells in the mesh.
        mesh_elements: usize,
        /// Number of nodes in the mesh.
        mesh_nodes: usize,
    },
    /// A local L1 partition id is not part of the layout.
    #[error("L1 partition {l1} does not exist (there are {num_l1})")]
    L1OutOfRange {
        /// The requested L1 partition.
        l1: usize,
        /// Number of L1 partitions in the layout.
        num_l1: usize,
    },
    /// An external graph partitioning routine failed.
    #[error("{backend} failed: {reason}")]
    Backend {
        /// Name of the failing backend.
        backend: &'static str,
        /// Error reported by the backend.
        reason: String,
    },
    /// The elements don't form a valid mesh.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Result of partitioning a set of elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionAssignment {
    /// For each element, the partition it's assigned to.
    pub elements: Vec<usize>,
    /// For each node, the partition it's assigned to.
    pub nodes: Vec<usize>,
}

/// A method of splitting elements into partitions.
pub trait Partitioner {
    /// Assign each of the given elements and each node in `0..num_nodes`
    /// to one of `num_partitions` partitions.
    ///
    /// `elements` is a flat list where every `element_size` indices form one element.
    fn partition(
        &self,
        elements: &[usize],
        element_size: usize,
        num_nodes: usize,
        num_partitions: usize,
    ) -> Result<PartitionAssignment, PartitionError>;
}

/// The trivial partitioner which puts everything in partition 0.
/// Fails if more than one partition is requested.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityPartitioner;

impl Partitioner for IdentityPartitioner {
    fn partition(
        &self,
        elements: &[usize],
        element_size: usize,
        num_nodes: usize,
        num_partitions: usize,
    ) -> Result<PartitionAssignment, PartitionError> {
        let count = check_elements(elements, element_size, num_nodes, num_partitions)?;
        if num_partitions != 1 {
            return Err(PartitionError::IdentityRequiresSinglePartition {
                requested: num_partitions,
            });
        }
        Ok(PartitionAssignment {
            elements: vec![0; count],
            nodes: vec![0; num_nodes],
        })
    }
}

/// Splits elements into contiguous blocks of nearly equal size in their given order,
/// element `i` of `n` going to partition `i * num_partitions / n`.
///
/// This ignores connectivity entirely and is mostly useful
/// for reproducible layouts in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContiguousPartitioner;

impl Partitioner for ContiguousPartitioner {
    fn partition(
        &self,
        elements: &[usize],
        element_size: usize,
        num_nodes: usize,
        num_partitions: usize,
    ) -> Result<PartitionAssignment, PartitionError> {
        let count = check_elements(elements, element_size, num_nodes, num_partitions)?;
        let element_parts: Vec<usize> = (0..count).map(|i| i * num_partitions / count).collect();
        let nodes = assign_nodes(elements, element_size, num_nodes, &element_parts);
        Ok(PartitionAssignment {
            elements: element_parts,
            nodes,
        })
    }
}

/// A routine that partitions a graph while trying to minimize the edge cut.
pub trait GraphPartitioner {
    /// Name of the routine, used in error messages.
    fn name(&self) -> &'static str;

    /// Assign each vertex of the graph to one of `num_partitions` partitions.
    fn partition_graph(
        &self,
        graph: &DualGraph,
        num_partitions: usize,
    ) -> Result<Vec<usize>, PartitionError>;
}

/// Partitions elements by building their [`DualGraph`]
/// and handing it to a graph partitioning backend.
#[derive(Clone, Copy, Debug)]
pub struct DualGraphPartitioner<B> {
    /// Number of nodes two elements must share to be connected in the dual graph.
    pub num_common_nodes: usize,
    /// The routine that partitions the dual graph.
    pub backend: B,
}

impl<B: GraphPartitioner> Partitioner for DualGraphPartitioner<B> {
    fn partition(
        &self,
        elements: &[usize],
        element_size: usize,
        num_nodes: usize,
        num_partitions: usize,
    ) -> Result<PartitionAssignment, PartitionError> {
        let count = check_elements(elements, element_size, num_nodes, num_partitions)?;
        let graph = DualGraph::from_elements(
            elements,
            element_size,
            num_nodes,
            self.num_common_nodes,
        )?;

        let element_parts = if num_partitions == 1 {
            vec![0; count]
        } else {
            let parts = self.backend.partition_graph(&graph, num_partitions)?;
            if parts.len() != count || parts.iter().any(|&p| p >= num_partitions) {
                return Err(PartitionError::Backend {
                    backend: self.backend.name(),
                    reason: "returned an invalid partition vector".to_string(),
                });
            }
            parts
        };
        log::debug!(
            "{} split {count} elements into {num_partitions} parts with edge cut {}",
            self.backend.name(),
            graph.edge_cut(&element_parts),
        );

        let nodes = assign_nodes(elements, element_size, num_nodes, &element_parts);
        Ok(PartitionAssignment {
            elements: element_parts,
            nodes,
        })
    }
}

/// How partitions are created, see [`PartitionMethod`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PartitionConfig {
    /// Number of coarse (process-level) partitions.
    pub num_l1: usize,
    /// Number of fine (concurrency-unit-level) partitions inside each L1 partition.
    pub l2_per_l1: usize,
    /// Partitioner used at both levels.
    pub method: PartitionMethod,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            num_l1: 1,
            l2_per_l1: 1,
            method: PartitionMethod::Identity,
        }
    }
}

impl PartitionConfig {
    /// Total number of L2 partitions.
    #[inline]
    pub fn num_l2(&self) -> usize {
        self.num_l1 * self.l2_per_l1
    }

    /// Check that the configuration can be satisfied,
    /// independently of the mesh it's applied to.
    pub fn validate(&self) -> Result<(), PartitionError> {
        if self.num_l1 == 0 || self.l2_per_l1 == 0 {
            return Err(PartitionError::ZeroPartitions);
        }
        match self.method {
            PartitionMethod::Identity if self.num_l1 > 1 || self.l2_per_l1 > 1 => {
                Err(PartitionError::IdentityRequiresSinglePartition {
                    requested: self.num_l1.max(self.l2_per_l1),
                })
            }
            PartitionMethod::DualGraph { num_common_nodes: 0 } => {
                Err(PartitionError::InvalidCommonNodes {
                    num_common_nodes: 0,
                    element_size: 0,
                })
            }
            #[cfg(feature = "metis")]
            PartitionMethod::Metis { num_common_nodes: 0 } => {
                Err(PartitionError::InvalidCommonNodes {
                    num_common_nodes: 0,
                    element_size: 0,
                })
            }
            _ => Ok(()),
        }
    }
}

/// The partitioner used at both levels of the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum PartitionMethod {
    /// See [`IdentityPartitioner`].
    Identity,
    /// See [`ContiguousPartitioner`].
    Contiguous,
    /// Dual graph partitioning with the native [`GraphGrowing`] backend.
    DualGraph {
        /// See [`DualGraphPartitioner::num_common_nodes`].
        num_common_nodes: usize,
    },
    /// Dual graph partitioning with METIS.
    #[cfg(feature = "metis")]
    Metis {
        /// See [`DualGraphPartitioner::num_common_nodes`].
        num_common_nodes: usize,
    },
}

impl PartitionMethod {
    /// Construct the partitioner this method describes.
    pub fn partitioner(&self) -> Box<dyn Partitioner> {
        match *self {
            Self::Identity => Box::new(IdentityPartitioner),
            Self::Contiguous => Box::new(ContiguousPartitioner),
            Self::DualGraph { num_common_nodes } => Box::new(DualGraphPartitioner {
                num_common_nodes,
                backend: GraphGrowing,
            }),
            #[cfg(feature = "metis")]
            Self::Metis { num_common_nodes } => Box::new(DualGraphPartitioner {
                num_common_nodes,
                backend: Metis,
            }),
        }
    }
}

/// Validate partitioner input, returning the number of elements.
pub(crate) fn check_elements(
    elements: &[usize],
    element_size: usize,
    num_nodes: usize,
    num_partitions: usize,
) -> Result<usize, PartitionError> {
    if num_partitions == 0 {
        return Err(PartitionError::ZeroPartitions);
    }
    if element_size == 0 || elements.len() % element_size != 0 {
        return Err(PartitionError::ElementSizeMismatch {
            len: elements.len(),
            element_size,
        });
    }
    if let Some((i, &node)) = elements.iter().enumerate().find(|(_, &n)| n >= num_nodes) {
        return Err(MeshError::NodeOutOfRange {
            cell: i / element_size,
            node,
            node_count: num_nodes,
        }
        .into());
    }
    Ok(elements.len() / element_size)
}

/// Assign every node to the partition of the lowest-index element containing it.
/// Nodes not in any element go to partition 0.
fn assign_nodes(
    elements: &[usize],
    element_size: usize,
    num_nodes: usize,
    element_parts: &[usize],
) -> Vec<usize> {
    let mut nodes: Vec<Option<usize>> = vec![None; num_nodes];
    for (element, &part) in elements.chunks_exact(element_size).zip(element_parts) {
        for &node in element {
            nodes[node].get_or_insert(part);
        }
    }
    nodes.into_iter().map(|p| p.unwrap_or(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::unit_cube_5_tets_data;

    #[test]
    fn identity_partitioner() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let parts = IdentityPartitioner
            .partition(&cells, 4, nodes.len(), 1)
            .unwrap();
        assert!(parts.elements.iter().all(|&p| p == 0));
        assert_eq!(parts.elements.len(), 5);
        assert_eq!(parts.nodes, vec![0; 8]);

        let err = IdentityPartitioner
            .partition(&cells, 4, nodes.len(), 2)
            .unwrap_err();
        assert_eq!(
            err,
            PartitionError::IdentityRequiresSinglePartition { requested: 2 }
        );
    }

    #[test]
    fn contiguous_partitioner() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let parts = ContiguousPartitioner
            .partition(&cells, 4, nodes.len(), 4)
            .unwrap();
        assert_eq!(parts.elements, vec![0, 0, 1, 2, 3]);
        // nodes go with the first cell they appear in;
        // the middle cell has no nodes of its own
        assert_eq!(parts.nodes, vec![0, 0, 0, 0, 1, 0, 0, 2]);
    }

    #[test]
    fn unreferenced_nodes_go_to_zero() {
        let elements = [1, 2, 2, 3];
        let parts = ContiguousPartitioner.partition(&elements, 2, 5, 2).unwrap();
        assert_eq!(parts.elements, vec![0, 1]);
        assert_eq!(parts.nodes, vec![0, 0, 0, 1, 0]);
    }

    #[test]
    fn invalid_input() {
        let err = ContiguousPartitioner.partition(&[0, 1, 2], 2, 3, 1).unwrap_err();
        assert_eq!(
            err,
            PartitionError::ElementSizeMismatch {
                len: 3,
                element_size: 2
            }
        );
        let err = ContiguousPartitioner.partition(&[0, 1, 2, 3], 2, 3, 1).unwrap_err();
        assert_eq!(
            err,
            PartitionError::Mesh(MeshError::NodeOutOfRange {
                cell: 1,
                node: 3,
                node_count: 3
            })
        );
        let err = ContiguousPartitioner.partition(&[0, 1], 2, 3, 0).unwrap_err();
        assert_eq!(err, PartitionError::ZeroPartitions);
    }

    #[test]
    fn dual_graph_partitioner() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let partitioner = DualGraphPartitioner {
            num_common_nodes: 3,
            backend: GraphGrowing,
        };
        let parts = partitioner.partition(&cells, 4, nodes.len(), 2).unwrap();
        assert_eq!(parts.elements.len(), 5);
        for p in 0..2 {
            assert!(parts.elements.contains(&p), "partition {p} is empty");
        }
        // every node is in the partition of the first cell containing it
        for (node, &part) in parts.nodes.iter().enumerate() {
            let first_cell = cells.chunks_exact(4).position(|c| c.contains(&node)).unwrap();
            assert_eq!(part, parts.elements[first_cell]);
        }
    }

    #[test]
    fn config_validation() {
        assert_eq!(PartitionConfig::default().validate(), Ok(()));
        let config = PartitionConfig {
            num_l1: 2,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(PartitionError::IdentityRequiresSinglePartition { requested: 2 })
        );
        let config = PartitionConfig {
            num_l1: 2,
            l2_per_l1: 0,
            method: PartitionMethod::Contiguous,
        };
        assert_eq!(config.validate(), Err(PartitionError::ZeroPartitions));
        let config = PartitionConfig {
            num_l1: 2,
            l2_per_l1: 3,
            method: PartitionMethod::DualGraph {
                num_common_nodes: 2,
            },
        };
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.num_l2(), 6);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_from_json() {
        let config = PartitionConfig {
            num_l1: 2,
            l2_per_l1: 4,
            method: PartitionMethod::DualGraph {
                num_common_nodes: 3,
            },
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PartitionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);

        let partial: PartitionConfig =
            serde_json::from_str(r#"{ "l2_per_l1": 3, "method": { "kind": "contiguous" } }"#)
                .unwrap();
        assert_eq!(partial.num_l1, 1);
        assert_eq!(partial.l2_per_l1, 3);
        assert_eq!(partial.method, PartitionMethod::Contiguous);
    }
}
