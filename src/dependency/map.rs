use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

use crate::{access::AccessPattern, loops::LoopShape, partitioned_mesh::PartitionedMesh};

/// Which L2 partitions, and exactly which of their entities,
/// a kernel running on each local L2 partition touches.
///
/// Entities are recorded by their global index,
/// grouped by codimension relative to the mesh cells.
/// Maps of several kernels dispatched together
/// can be merged with `+=`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataDependencyMap {
    cell_dim: usize,
    has_access: BTreeMap<usize, BTreeSet<usize>>,
    /// `(accessor, accessed) -> [sorted entities; cell_dim + 1]` indexed by codimension
    by_entity: BTreeMap<(usize, usize), Vec<Vec<usize>>>,
}

impl DataDependencyMap {
    /// Evaluate an access pattern at every entity a loop visits
    /// in each local L2 partition of a mesh.
    ///
    /// The loop ranges over the entities owned by each partition.
    pub fn new<const DIM: usize, const WORLD_DIM: usize, P, L>(
        pmesh: &PartitionedMesh<DIM, WORLD_DIM>,
        pattern: &P,
        shape: &L,
    ) -> Self
    where
        P: AccessPattern<DIM, WORLD_DIM>,
        L: LoopShape,
    {
        assert!(
            L::ENTITY_DIM <= DIM,
            "loop over {}-dimensional entities in a {DIM}-dimensional mesh",
            L::ENTITY_DIM,
        );

        let mut has_access: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        let mut accessed: BTreeMap<(usize, usize), Vec<BTreeSet<usize>>> = BTreeMap::new();
        for l2 in pmesh.local_l2() {
            for entity in pmesh.l2_entities_dyn(L::ENTITY_DIM, l2) {
                shape.visit(entity, |visited| {
                    let target = pattern.access(visited);
                    let other = pmesh.entity_owner_dyn(target.dim(), target.index());
                    has_access.entry(l2).or_default().insert(other);
                    accessed
                        .entry((l2, other))
                        .or_insert_with(|| vec![BTreeSet::new(); DIM + 1])[target.codim()]
                        .insert(target.index());
                });
            }
        }

        let by_entity: BTreeMap<(usize, usize), Vec<Vec<usize>>> = accessed
            .into_iter()
            .map(|(pair, sets)| {
                let sorted = sets.into_iter().map(|s| s.into_iter().collect_vec());
                (pair, sorted.collect_vec())
            })
            .collect();
        let map = Self {
            cell_dim: DIM,
            has_access,
            by_entity,
        };
        for accessor in map.accessors() {
            log::trace!(
                "L2 partition {accessor} accesses {:?}",
                map.has_access(accessor).collect_vec()
            );
        }
        map
    }

    /// Dimension of the cells of the mesh this map was built on.
    #[inline]
    pub fn cell_dim(&self) -> usize {
        self.cell_dim
    }

    /// Check whether any access at all was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.has_access.is_empty()
    }

    /// Iterate over the L2 partitions that access anything, in order.
    pub fn accessors(&self) -> impl '_ + Iterator<Item = usize> {
        self.has_access.keys().copied()
    }

    /// Iterate over the L2 partitions whose entities an L2 partition accesses, in order.
    pub fn has_access(&self, accessor: usize) -> impl '_ + Iterator<Item = usize> {
        self.has_access.get(&accessor).into_iter().flatten().copied()
    }

    /// Get the entities of `accessed` touched from `accessor`,
    /// as one sorted list per codimension.
    pub fn has_access_by_entity(&self, accessor: usize, accessed: usize) -> Vec<&[usize]> {
        match self.by_entity.get(&(accessor, accessed)) {
            Some(lists) => lists.iter().map(Vec::as_slice).collect(),
            None => vec![<&[usize]>::default(); self.cell_dim + 1],
        }
    }

    /// Iterate over the entities an L2 partition touches but does not own,
    /// grouped by the owning partition and indexed by codimension within each group.
    pub fn halo_entities(
        &self,
        accessor: usize,
    ) -> impl '_ + Iterator<Item = (usize, &[Vec<usize>])> {
        self.by_entity
            .range((accessor, 0)..=(accessor, usize::MAX))
            .filter(move |((_, owner), _)| *owner != accessor)
            .map(|((_, owner), lists)| (*owner, lists.as_slice()))
    }
}

impl std::ops::AddAssign<&DataDependencyMap> for DataDependencyMap {
    fn add_assign(&mut self, rhs: &DataDependencyMap) {
        assert_eq!(
            self.cell_dim, rhs.cell_dim,
            "merged dependency maps are from meshes of different dimensions"
        );
        for (&accessor, accessed) in &rhs.has_access {
            self.has_access
                .entry(accessor)
                .or_default()
                .extend(accessed.iter().copied());
        }
        for (&pair, rhs_lists) in &rhs.by_entity {
            let lists = self
                .by_entity
                .entry(pair)
                .or_insert_with(|| vec![Vec::new(); rhs_lists.len()]);
            for (list, rhs_list) in lists.iter_mut().zip(rhs_lists) {
                *list = list.iter().merge(rhs_list).dedup().copied().collect();
            }
        }
    }
}

impl std::ops::AddAssign for DataDependencyMap {
    fn add_assign(&mut self, rhs: DataDependencyMap) {
        *self += &rhs;
    }
}
