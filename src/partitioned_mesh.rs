//! A mesh split into the two-level partition hierarchy,
//! with every entity assigned to exactly one owning L2 partition.
//!
//! An entity shared between cells is owned by the L2 partition
//! of the lowest-index cell containing it.
//! Cells are numbered so that each L2 partition's cells form one contiguous range,
//! which makes ownership of a cell's sub-entities a property of the cell order alone.

use fixedbitset as fb;
use nalgebra as na;

use crate::{
    mesh::{EntityIter, SimplicialMesh},
    partition::{create_partitions, PartitionConfig, PartitionError, PartitionLayout},
};

/// A mesh reordered by partition, together with entity ownership
/// for the L2 partitions handled locally.
#[derive(Clone, Debug)]
pub struct PartitionedMesh<const DIM: usize, const WORLD_DIM: usize> {
    mesh: SimplicialMesh<DIM, WORLD_DIM>,
    layout: PartitionLayout,
    /// sorted, deduplicated
    local_l1: Vec<usize>,
    /// `entity_to_l2[d][e]`: owning L2 partition of `d`-entity `e`
    entity_to_l2: Vec<Vec<usize>>,
    /// `l2_to_entity[d][p]`: sorted `d`-entities owned by L2 partition `p`.
    /// empty for partitions not handled locally
    l2_to_entity: Vec<Vec<Vec<usize>>>,
}

impl<const DIM: usize, const WORLD_DIM: usize> PartitionedMesh<DIM, WORLD_DIM> {
    /// Partition raw mesh data according to the given config,
    /// build the reordered mesh and assign entity ownership
    /// for the L2 partitions inside the `local_l1` partitions.
    pub fn new(
        nodes: Vec<na::SVector<f64, WORLD_DIM>>,
        cells: Vec<usize>,
        config: &PartitionConfig,
        local_l1: &[usize],
    ) -> Result<Self, PartitionError> {
        let (nodes, cells, layout) = create_partitions(nodes, cells, DIM + 1, config)?;
        let mesh = SimplicialMesh::try_new(nodes, cells)?;
        Self::from_layout(mesh, layout, local_l1)
    }

    /// Assign entity ownership in a mesh that was built
    /// from the output of [`create_partitions`].
    pub fn from_layout(
        mesh: SimplicialMesh<DIM, WORLD_DIM>,
        layout: PartitionLayout,
        local_l1: &[usize],
    ) -> Result<Self, PartitionError> {
        if layout.element_l2.len() != mesh.cell_count()
            || layout.node_l2.len() != mesh.nodes().len()
        {
            return Err(PartitionError::LayoutMismatch {
                layout_elements: layout.element_l2.len(),
                layout_nodes: layout.node_l2.len(),
                mesh_elements: mesh.cell_count(),
                mesh_nodes: mesh.nodes().len(),
            });
        }
        if let Some(&l1) = local_l1.iter().find(|&&l1| l1 >= layout.num_l1) {
            return Err(PartitionError::L1OutOfRange {
                l1,
                num_l1: layout.num_l1,
            });
        }
        let mut local_l1 = local_l1.to_vec();
        local_l1.sort_unstable();
        local_l1.dedup();

        let num_l2 = layout.num_l2();
        let local_l2: Vec<usize> = local_l1
            .iter()
            .flat_map(|&l1| l1 * layout.l2_per_l1..(l1 + 1) * layout.l2_per_l1)
            .collect();

        // every entity's owner, local or not, by the lowest containing cell.
        // incidence lists are sorted, so that's the first one
        let mut entity_to_l2: Vec<Vec<usize>> = (0..DIM)
            .map(|dim| {
                (0..mesh.num_entities_dyn(dim))
                    .map(|e| {
                        let first_cell = mesh.incidence_dyn(dim, DIM, e)[0];
                        layout.element_l2[first_cell]
                    })
                    .collect()
            })
            .collect();
        entity_to_l2.push(layout.element_l2.clone());

        // owned entity lists for the local partitions:
        // walk each partition's cells in order and claim the sub-entities
        // for which the current cell is the lowest containing one
        let mut l2_to_entity: Vec<Vec<Vec<usize>>> = Vec::with_capacity(DIM + 1);
        for dim in 0..DIM {
            let mut claimed = fb::FixedBitSet::with_capacity(mesh.num_entities_dyn(dim));
            let mut per_l2 = vec![Vec::new(); num_l2];
            for &l2 in &local_l2 {
                let owned = &mut per_l2[l2];
                for cell in layout.element_range(l2) {
                    for &e in mesh.cell_entities_dyn(dim, cell) {
                        if claimed.contains(e) {
                            continue;
                        }
                        if mesh.incidence_dyn(dim, DIM, e)[0] == cell {
                            claimed.insert(e);
                            owned.push(e);
                        }
                    }
                }
                owned.sort_unstable();
            }
            l2_to_entity.push(per_l2);
        }
        let mut cells_per_l2 = vec![Vec::new(); num_l2];
        for &l2 in &local_l2 {
            cells_per_l2[l2] = layout.element_range(l2).collect();
        }
        l2_to_entity.push(cells_per_l2);

        for &l2 in &local_l2 {
            log::debug!(
                "L2 partition {l2} owns {:?} entities per dimension",
                l2_to_entity.iter().map(|d| d[l2].len()).collect::<Vec<_>>()
            );
        }

        Ok(Self {
            mesh,
            layout,
            local_l1,
            entity_to_l2,
            l2_to_entity,
        })
    }

    /// The reordered mesh.
    #[inline]
    pub fn mesh(&self) -> &SimplicialMesh<DIM, WORLD_DIM> {
        &self.mesh
    }

    /// The partition layout the mesh was reordered by.
    #[inline]
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// Total number of L2 partitions, local or not.
    #[inline]
    pub fn num_l2(&self) -> usize {
        self.layout.num_l2()
    }

    /// The L1 partitions handled locally.
    #[inline]
    pub fn local_l1(&self) -> &[usize] {
        &self.local_l1
    }

    /// Iterate over the L2 partitions inside the local L1 partitions, in order.
    pub fn local_l2(&self) -> impl '_ + Iterator<Item = usize> {
        let per = self.layout.l2_per_l1;
        self.local_l1
            .iter()
            .flat_map(move |&l1| l1 * per..(l1 + 1) * per)
    }

    /// Check whether an L2 partition is inside a local L1 partition.
    #[inline]
    pub fn is_local_l2(&self, l2: usize) -> bool {
        l2 < self.num_l2()
            && self
                .local_l1
                .binary_search(&self.layout.l1_of(l2))
                .is_ok()
    }

    /// Range of cell indices in an L2 partition.
    #[inline]
    pub fn cell_range(&self, l2: usize) -> std::ops::Range<usize> {
        self.layout.element_range(l2)
    }

    /// Range of node indices in an L2 partition.
    #[inline]
    pub fn node_range(&self, l2: usize) -> std::ops::Range<usize> {
        self.layout.node_range(l2)
    }

    /// The L2 partition a cell belongs to.
    #[inline]
    pub fn cell_l2(&self, cell: usize) -> usize {
        self.layout.element_l2[cell]
    }

    /// The L2 partition a node belongs to.
    ///
    /// Note this is the partition the node's data is stored in,
    /// which need not be the owner of the node as a 0-dimensional entity
    /// (see [`entity_owner`][Self::entity_owner]).
    #[inline]
    pub fn node_l2(&self, node: usize) -> usize {
        self.layout.node_l2[node]
    }

    /// Get the sorted `D`-dimensional entities owned by an L2 partition.
    ///
    /// Empty for partitions that aren't local.
    #[inline]
    pub fn owned_entities<const D: usize>(&self, l2: usize) -> &[usize]
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.owned_entities_dyn(D, l2)
    }

    #[inline]
    pub(crate) fn owned_entities_dyn(&self, dim: usize, l2: usize) -> &[usize] {
        &self.l2_to_entity[dim][l2]
    }

    /// Get the L2 partition owning a `D`-dimensional entity.
    ///
    /// This is defined for every entity in the mesh,
    /// including ones owned by partitions that aren't local.
    #[inline]
    pub fn entity_owner<const D: usize>(&self, index: usize) -> usize
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.entity_owner_dyn(D, index)
    }

    #[inline]
    pub(crate) fn entity_owner_dyn(&self, dim: usize, index: usize) -> usize {
        self.entity_to_l2[dim][index]
    }

    /// Iterate over the `D`-dimensional entities owned by an L2 partition.
    pub fn l2_entities<const D: usize>(&self, l2: usize) -> EntityIter<'_, DIM, WORLD_DIM>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.l2_entities_dyn(D, l2)
    }

    pub(crate) fn l2_entities_dyn(&self, dim: usize, l2: usize) -> EntityIter<'_, DIM, WORLD_DIM> {
        self.mesh
            .entities_from_indices_dyn(dim, &self.l2_to_entity[dim][l2])
    }
}
