use fixedbitset as fb;
use nalgebra as na;

use super::{Entity, SimplicialMesh};

/// A subset of the `D`-dimensional entities in a mesh.
///
/// Can be used to restrict loops to certain parts of the mesh,
/// e.g. the boundary given by [`SimplicialMesh::boundary`].
///
/// You can iterate over the entities in this set
/// with [`SimplicialMesh::entities_in_subset`].
#[derive(Clone, Debug)]
pub struct Subset<const D: usize> {
    /// A bitset containing the global indices of entities present in the subset.
    ///
    /// Iterate over the indices with `indices.ones()`.
    pub indices: fb::FixedBitSet,
}

// bitsets built in different ways may differ in capacity,
// so compare only the members
impl<const D: usize> PartialEq for Subset<D> {
    fn eq(&self, other: &Self) -> bool {
        self.indices.ones().eq(other.indices.ones())
    }
}
impl<const D: usize> Eq for Subset<D> {}

impl<const D: usize> Subset<D> {
    #[inline]
    pub(super) fn new(indices: fb::FixedBitSet) -> Self {
        Self { indices }
    }

    /// Create a subset from an iterator of entity indices.
    pub fn from_indices(indices: impl Iterator<Item = usize>) -> Self {
        Self::new(fb::FixedBitSet::from_iter(indices))
    }

    /// Create a subset containing the entities yielded by an iterator.
    pub fn from_entity_iter<'a, const DIM: usize, const WORLD_DIM: usize>(
        iter: impl Iterator<Item = Entity<'a, DIM, WORLD_DIM>>,
    ) -> Self {
        Self::new(iter.map(|e| e.index()).collect())
    }

    /// Create an empty subset.
    ///
    /// Handy as the starting point when taking unions of many subsets.
    pub fn new_empty() -> Self {
        Self::new(fb::FixedBitSet::new())
    }

    /// Create a subset containing every `D`-entity in the mesh.
    pub fn new_full<const DIM: usize, const WORLD_DIM: usize>(
        mesh: &SimplicialMesh<DIM, WORLD_DIM>,
    ) -> Self
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        let mut indices = fb::FixedBitSet::with_capacity(mesh.num_entities::<D>());
        indices.set_range(.., true);
        Self::new(indices)
    }

    /// Take the complement of a subset, i.e. the entities not in that subset.
    pub fn complement<const DIM: usize, const WORLD_DIM: usize>(
        &self,
        mesh: &SimplicialMesh<DIM, WORLD_DIM>,
    ) -> Self
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        let mut indices = Self::new_full(mesh).indices;
        indices.difference_with(&self.indices);
        Self::new(indices)
    }

    /// Take the intersection (i.e. set of entities that are in both)
    /// of this subset with another of the same dimension.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut indices = self.indices.clone();
        indices.intersect_with(&other.indices);
        Self::new(indices)
    }

    /// Take the union of this subset with another of the same dimension.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        let mut indices = self.indices.clone();
        indices.union_with(&other.indices);
        Self::new(indices)
    }

    /// Take the difference (i.e. set of entities that are in `self` but not in `other`)
    /// of this subset with another of the same dimension.
    #[inline]
    pub fn difference(&self, other: &Self) -> Self {
        let mut indices = self.indices.clone();
        indices.difference_with(&other.indices);
        Self::new(indices)
    }

    /// Get the number of entities in this subset.
    #[inline]
    pub fn count(&self) -> usize {
        self.indices.count_ones(..)
    }

    /// Check if the subset contains a given entity.
    ///
    /// # Panics
    ///
    /// If the entity is not of dimension `D`.
    #[inline]
    pub fn contains<const DIM: usize, const WORLD_DIM: usize>(
        &self,
        entity: Entity<'_, DIM, WORLD_DIM>,
    ) -> bool {
        assert_eq!(entity.dim(), D, "entity dimension doesn't match the subset");
        self.indices.contains(entity.index())
    }
}
