use itertools::Itertools;
use nalgebra as na;

use super::{check_elements, PartitionConfig, PartitionError};

/// Where every element and node of a mesh went
/// when it was split into the two-level partition hierarchy.
///
/// L2 partitions are numbered `l1 * l2_per_l1 + local`,
/// and after [`create_partitions`] every L2 partition's elements and nodes
/// occupy one contiguous index range, in L2 order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionLayout {
    pub num_l1: usize,
    pub l2_per_l1: usize,
    /// For each (reordered) element, its L2 partition. Nondecreasing.
    pub element_l2: Vec<usize>,
    /// For each (reordered) node, its L2 partition. Nondecreasing.
    pub node_l2: Vec<usize>,
    /// Elements of L2 partition `p` are `element_offsets[p]..element_offsets[p + 1]`.
    pub element_offsets: Vec<usize>,
    /// Nodes of L2 partition `p` are `node_offsets[p]..node_offsets[p + 1]`.
    pub node_offsets: Vec<usize>,
    /// For each reordered element, its index in the original element list.
    pub element_permutation: Vec<usize>,
    /// For each reordered node, its index in the original node list.
    pub node_permutation: Vec<usize>,
}

impl PartitionLayout {
    /// Total number of L2 partitions.
    #[inline]
    pub fn num_l2(&self) -> usize {
        self.num_l1 * self.l2_per_l1
    }

    /// The L1 partition an L2 partition belongs to.
    #[inline]
    pub fn l1_of(&self, l2: usize) -> usize {
        l2 / self.l2_per_l1
    }

    /// Range of element indices in an L2 partition.
    #[inline]
    pub fn element_range(&self, l2: usize) -> std::ops::Range<usize> {
        self.element_offsets[l2]..self.element_offsets[l2 + 1]
    }

    /// Range of node indices in an L2 partition.
    #[inline]
    pub fn node_range(&self, l2: usize) -> std::ops::Range<usize> {
        self.node_offsets[l2]..self.node_offsets[l2 + 1]
    }
}

/// Split a mesh into `config.num_l1` L1 partitions
/// and each of those into `config.l2_per_l1` L2 partitions,
/// then reorder nodes and elements so that each L2 partition is contiguous.
///
/// L2 partitioning happens independently within each L1 partition,
/// using the full node index space.
/// Element node references are remapped to the new node order,
/// and elements are sorted within each L2 partition
/// by their sorted node tuples.
///
/// Returns the reordered nodes and elements along with the layout describing them.
#[allow(clippy::type_complexity)]
pub fn create_partitions<const WORLD_DIM: usize>(
    nodes: Vec<na::SVector<f64, WORLD_DIM>>,
    elements: Vec<usize>,
    element_size: usize,
    config: &PartitionConfig,
) -> Result<
    (
        Vec<na::SVector<f64, WORLD_DIM>>,
        Vec<usize>,
        PartitionLayout,
    ),
    PartitionError,
> {
    config.validate()?;
    let num_nodes = nodes.len();
    let count = check_elements(&elements, element_size, num_nodes, config.num_l1)?;
    let partitioner = config.method.partitioner();
    let num_l2 = config.num_l2();

    //
    // assign partitions
    //

    let l1 = partitioner.partition(&elements, element_size, num_nodes, config.num_l1)?;
    log::debug!(
        "L1 partitioning: {count} elements into {} parts",
        config.num_l1
    );

    let mut element_l2 = vec![0; count];
    // nodes not referenced by their L1 partition's elements
    // go to the first L2 partition of it
    let mut node_l2: Vec<usize> = l1.nodes.iter().map(|&g| g * config.l2_per_l1).collect();
    for group in 0..config.num_l1 {
        let members = (0..count).filter(|&e| l1.elements[e] == group).collect_vec();
        if members.is_empty() {
            log::warn!("L1 partition {group} has no elements");
            continue;
        }
        let group_elements = members
            .iter()
            .flat_map(|&e| &elements[e * element_size..(e + 1) * element_size])
            .copied()
            .collect_vec();
        let l2 = partitioner.partition(
            &group_elements,
            element_size,
            num_nodes,
            config.l2_per_l1,
        )?;
        let base = group * config.l2_per_l1;
        for (&e, &local) in members.iter().zip(&l2.elements) {
            element_l2[e] = base + local;
        }
        for (node, &local) in l2.nodes.iter().enumerate() {
            if l1.nodes[node] == group {
                node_l2[node] = base + local;
            }
        }
    }

    //
    // reorder
    //

    let mut node_permutation = (0..num_nodes).collect_vec();
    node_permutation.sort_by_key(|&n| node_l2[n]);
    let mut new_node_index = vec![0; num_nodes];
    for (new, &old) in node_permutation.iter().enumerate() {
        new_node_index[old] = new;
    }

    let remapped = elements.iter().map(|&n| new_node_index[n]).collect_vec();
    let sorted_keys = remapped
        .chunks_exact(element_size)
        .map(|e| e.iter().copied().sorted_unstable().collect_vec())
        .collect_vec();
    let mut element_permutation = (0..count).collect_vec();
    element_permutation.sort_by(|&a, &b| {
        element_l2[a]
            .cmp(&element_l2[b])
            .then_with(|| sorted_keys[a].cmp(&sorted_keys[b]))
    });

    let new_nodes = node_permutation.iter().map(|&old| nodes[old]).collect_vec();
    let new_elements = element_permutation
        .iter()
        .flat_map(|&old| &remapped[old * element_size..(old + 1) * element_size])
        .copied()
        .collect_vec();
    let element_l2 = element_permutation.iter().map(|&e| element_l2[e]).collect_vec();
    let node_l2 = node_permutation.iter().map(|&n| node_l2[n]).collect_vec();

    let element_offsets = offsets(&element_l2, num_l2);
    let node_offsets = offsets(&node_l2, num_l2);
    for l2 in 0..num_l2 {
        if element_offsets[l2] == element_offsets[l2 + 1] {
            log::warn!("L2 partition {l2} has no elements");
        }
    }
    log::debug!(
        "L2 partitioning: element offsets {element_offsets:?}, node offsets {node_offsets:?}"
    );

    Ok((
        new_nodes,
        new_elements,
        PartitionLayout {
            num_l1: config.num_l1,
            l2_per_l1: config.l2_per_l1,
            element_l2,
            node_l2,
            element_offsets,
            node_offsets,
            element_permutation,
            node_permutation,
        },
    ))
}

/// Prefix sums of partition sizes for a nondecreasing partition vector.
fn offsets(parts: &[usize], num_parts: usize) -> Vec<usize> {
    let mut offsets = vec![0; num_parts + 1];
    for &p in parts {
        offsets[p + 1] += 1;
    }
    for i in 0..num_parts {
        offsets[i + 1] += offsets[i];
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mesh::unit_cube_5_tets_data, partition::PartitionMethod};

    fn contiguous(num_l1: usize, l2_per_l1: usize) -> PartitionConfig {
        PartitionConfig {
            num_l1,
            l2_per_l1,
            method: PartitionMethod::Contiguous,
        }
    }

    #[test]
    fn single_partition_keeps_everything() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let (new_nodes, new_cells, layout) =
            create_partitions(nodes.clone(), cells.clone(), 4, &PartitionConfig::default())
                .unwrap();
        assert_eq!(new_nodes, nodes);
        assert_eq!(layout.element_offsets, vec![0, 5]);
        assert_eq!(layout.node_offsets, vec![0, 8]);
        // cells are only sorted by their node tuples
        itertools::assert_equal(
            layout.element_permutation.iter().map(|&e| &cells[e * 4..(e + 1) * 4]),
            new_cells.chunks_exact(4),
        );
        let keys = new_cells
            .chunks_exact(4)
            .map(|c| c.iter().copied().sorted().collect_vec())
            .collect_vec();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn even_split_of_cube() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let (new_nodes, new_cells, layout) =
            create_partitions(nodes.clone(), cells.clone(), 4, &contiguous(1, 4)).unwrap();
        assert_eq!(layout.num_l2(), 4);
        assert_eq!(layout.element_l2, vec![0, 0, 1, 2, 3]);
        assert_eq!(layout.element_offsets, vec![0, 2, 3, 4, 5]);
        // the middle cell brings no nodes of its own
        assert_eq!(layout.node_offsets, vec![0, 6, 7, 8, 8]);
        // the middle cell stays alone in the last partition
        assert_eq!(layout.element_permutation[4], 4);

        // referential integrity: reordered cells refer to the same coordinates
        for (new, &old) in layout.element_permutation.iter().enumerate() {
            let before = cells[old * 4..(old + 1) * 4].iter().map(|&n| nodes[n]);
            let after = new_cells[new * 4..(new + 1) * 4].iter().map(|&n| new_nodes[n]);
            itertools::assert_equal(before, after);
        }
    }

    #[test]
    fn two_levels() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let (_, _, layout) = create_partitions(nodes, cells, 4, &contiguous(2, 2)).unwrap();
        assert_eq!(layout.num_l2(), 4);
        // L1: [0, 0, 0, 1, 1] -> L2 within the first: [0, 0, 1], within the second: [0, 1]
        assert_eq!(layout.element_l2, vec![0, 0, 1, 2, 3]);
        assert_eq!(layout.l1_of(3), 1);
        for l2 in 0..4 {
            let range = layout.element_range(l2);
            assert!(layout.element_l2[range].iter().all(|&p| p == l2));
            let range = layout.node_range(l2);
            assert!(layout.node_l2[range].iter().all(|&p| p == l2));
        }
    }

    #[test]
    fn identity_rejects_multiple_partitions() {
        let (nodes, cells) = unit_cube_5_tets_data();
        let config = PartitionConfig {
            l2_per_l1: 2,
            ..Default::default()
        };
        assert_eq!(
            create_partitions(nodes, cells, 4, &config).unwrap_err(),
            PartitionError::IdentityRequiresSinglePartition { requested: 2 }
        );
    }
}
