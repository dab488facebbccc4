use super::{DualGraph, GraphPartitioner, PartitionError};

/// Graph partitioning with METIS' k-way routine.
///
/// Any failure reported by METIS (invalid input, out of memory)
/// is returned as [`PartitionError::Backend`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Metis;

impl Metis {
    const NAME: &'static str = "METIS";

    fn backend_error(reason: impl std::fmt::Display) -> PartitionError {
        PartitionError::Backend {
            backend: Self::NAME,
            reason: reason.to_string(),
        }
    }
}

impl GraphPartitioner for Metis {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn partition_graph(
        &self,
        graph: &DualGraph,
        num_partitions: usize,
    ) -> Result<Vec<usize>, PartitionError> {
        if num_partitions == 0 {
            return Err(PartitionError::ZeroPartitions);
        }
        if graph.num_vertices() == 0 {
            return Ok(Vec::new());
        }

        let to_idx = |v: usize| {
            ::metis::Idx::try_from(v)
                .map_err(|_| Self::backend_error(format!("index {v} does not fit in idx_t")))
        };
        let xadj = graph
            .xadj
            .iter()
            .map(|&v| to_idx(v))
            .collect::<Result<Vec<_>, _>>()?;
        let adjncy = graph
            .adjncy
            .iter()
            .map(|&v| to_idx(v))
            .collect::<Result<Vec<_>, _>>()?;
        let nparts = to_idx(num_partitions)?;

        let mut part: Vec<::metis::Idx> = vec![0; graph.num_vertices()];
        let objval = ::metis::Graph::new(1, nparts, &xadj, &adjncy)
            .map_err(Self::backend_error)?
            .part_kway(&mut part)
            .map_err(Self::backend_error)?;
        log::debug!("METIS partitioned {} vertices with edge cut {objval}", part.len());

        part.into_iter()
            .map(|p| {
                usize::try_from(p)
                    .map_err(|_| Self::backend_error(format!("negative partition id {p}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::unit_cube_5_tets_data;

    #[test]
    fn partition_cube() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let graph = DualGraph::from_elements(&cells, 4, nodes.len(), 3).unwrap();
        let parts = Metis.partition_graph(&graph, 2).unwrap();
        assert_eq!(parts.len(), 5);
        assert!(parts.iter().all(|&p| p < 2));
    }
}
