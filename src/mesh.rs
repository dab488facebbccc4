//! The simplicial mesh and its canonical entity tables.
//!
//! A mesh is constructed from node coordinates and a cell-to-node mapping only.
//! Every face, edge and node of every cell is derived from that,
//! deduplicated and given a dense global index,
//! along with incidence, neighbor and boundary relations.
//! All of this happens once at construction and the mesh is immutable afterwards,
//! so entity sequences can be iterated from any number of threads without locking.

/// Low-level topology construction and corresponding tests.
mod mesh_construction;
/// re-export the testing meshes for use in other modules' tests
/// (pub because they're also used in integration tests and doctests)
#[doc(hidden)]
pub use mesh_construction::{tiny_mesh_2d, unit_cube_5_tets, unit_cube_5_tets_data};

mod entity;
pub use entity::{Entity, EntityIter, EntityKind, SubEntityIter};

mod subset;
pub use subset::Subset;

mod tuple_table;

//

use fixedbitset as fb;
use nalgebra as na;
use nalgebra_sparse::pattern::SparsityPattern;

use entity::IndexIter;
use tuple_table::TupleTable;

/// Error in constructing a mesh from raw nodes and cells.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// The flat cell index list can't be split into whole cells.
    #[error("cell index list of length {len} is not a multiple of the cell size {cell_size}")]
    CellIndexCount {
        /// Length of the given index list.
        len: usize,
        /// Number of nodes per cell.
        cell_size: usize,
    },
    /// A cell refers to a node that doesn't exist.
    #[error("cell {cell} refers to node {node}, but there are only {node_count} nodes")]
    NodeOutOfRange {
        /// Index of the offending cell.
        cell: usize,
        /// The nonexistent node index.
        node: usize,
        /// Number of nodes given.
        node_count: usize,
    },
    /// A cell lists the same node more than once.
    #[error("cell {cell} is degenerate (repeated node index)")]
    DegenerateCell {
        /// Index of the offending cell.
        cell: usize,
    },
}

/// A mesh where all cells are simplices
/// (line segments, triangles, tetrahedra etc).
///
/// `DIM` is the dimension of the cells
/// and `WORLD_DIM` the dimension of the space the nodes live in.
#[derive(Clone, Debug)]
pub struct SimplicialMesh<const DIM: usize, const WORLD_DIM: usize> {
    nodes: Vec<na::SVector<f64, WORLD_DIM>>,
    /// cell node indices in the order they were given, `DIM + 1` per cell
    cells: Vec<usize>,
    /// the same with each cell's indices sorted
    cell_keys: Vec<usize>,
    /// cell indices ordered by `cell_keys`, for lookup by node tuple
    cell_lookup: Vec<usize>,
    /// Storage for each dimension of entity in the mesh.
    pub(crate) entities: Vec<EntityCollection>,
}

#[derive(Clone, Debug)]
pub(crate) struct EntityCollection {
    /// sorted node tuples; the position of a tuple is the entity's global index.
    /// empty for cells, which are stored in the mesh as given
    table: TupleTable,
    /// number of entities of this dimension
    count: usize,
    /// number of entities of this dimension in one cell
    per_cell: usize,
    /// for every cell, the global indices of its sub-entities of this dimension
    /// in combination order. `per_cell` entries per cell
    cell_entities: Vec<usize>,
    /// `incidence[k]` maps entities of this dimension
    /// to the sorted entities of dimension `dim + k + 1` containing them
    incidence: Vec<SparsityPattern>,
    /// entities of the same dimension sharing a sub-entity one dimension down
    neighbors: SparsityPattern,
    /// entities on the boundary of the mesh
    mesh_boundary: fb::FixedBitSet,
}

impl<const DIM: usize, const WORLD_DIM: usize> SimplicialMesh<DIM, WORLD_DIM> {
    /// Construct a mesh from raw nodes and cell indices.
    ///
    /// The indices are given as a flat array,
    /// where every `DIM + 1` indices correspond to one cell.
    ///
    /// # Panics
    ///
    /// If the cells are invalid, see [`try_new`][Self::try_new].
    #[inline]
    pub fn new(nodes: Vec<na::SVector<f64, WORLD_DIM>>, cells: Vec<usize>) -> Self {
        match Self::try_new(nodes, cells) {
            Ok(mesh) => mesh,
            Err(e) => panic!("Invalid mesh input: {e}"),
        }
    }

    /// Construct a mesh from raw nodes and cell indices,
    /// returning an error if the cells don't describe proper simplices
    /// (wrong number of indices, references to missing nodes, or repeated nodes in a cell).
    pub fn try_new(
        nodes: Vec<na::SVector<f64, WORLD_DIM>>,
        cells: Vec<usize>,
    ) -> Result<Self, MeshError> {
        mesh_construction::build_mesh(nodes, cells)
    }

    /// Get a slice of all node coordinates in the mesh.
    #[inline]
    pub fn nodes(&self) -> &[na::SVector<f64, WORLD_DIM>] {
        &self.nodes
    }

    /// Get the number of cells in the mesh.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.entities[DIM].count
    }

    /// Access the node indices of the cells as given at construction
    /// as a chunked iterator where each element is a `DIM + 1`-length slice.
    #[inline]
    pub fn cells(&self) -> std::slice::ChunksExact<'_, usize> {
        self.cells.chunks_exact(DIM + 1)
    }

    /// Get the number of `D`-dimensional entities in the mesh.
    #[inline]
    pub fn num_entities<const D: usize>(&self) -> usize
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.num_entities_dyn(D)
    }

    /// Entity count taking the dimension as a runtime parameter
    /// to allow usage in dynamic contexts (internal APIs)
    #[inline]
    pub(crate) fn num_entities_dyn(&self, dim: usize) -> usize {
        self.entities[dim].count
    }

    /// Get a `D`-dimensional entity by its global index.
    #[inline]
    pub fn entity<const D: usize>(&self, index: usize) -> Entity<'_, DIM, WORLD_DIM>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.entity_dyn(D, index)
    }

    pub(crate) fn entity_dyn(&self, dim: usize, index: usize) -> Entity<'_, DIM, WORLD_DIM> {
        assert!(
            index < self.entities[dim].count,
            "{dim}-entity index {index} out of range"
        );
        Entity {
            mesh: self,
            dim,
            index,
            local_index: index,
            cell: (dim == DIM).then_some(index),
        }
    }

    /// Get a cell by its index.
    #[inline]
    pub fn cell(&self, index: usize) -> Entity<'_, DIM, WORLD_DIM> {
        self.entity_dyn(DIM, index)
    }

    /// Iterate over all `D`-dimensional entities in the mesh.
    pub fn entities<const D: usize>(&self) -> EntityIter<'_, DIM, WORLD_DIM>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.entities_dyn(D, 0..self.num_entities_dyn(D))
    }

    /// Iterate over the `D`-dimensional entities with global indices in the given range.
    ///
    /// # Panics
    ///
    /// If the range extends past the number of `D`-entities.
    pub fn entities_in<const D: usize>(
        &self,
        range: std::ops::Range<usize>,
    ) -> EntityIter<'_, DIM, WORLD_DIM>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.entities_dyn(D, range)
    }

    pub(crate) fn entities_dyn(
        &self,
        dim: usize,
        range: std::ops::Range<usize>,
    ) -> EntityIter<'_, DIM, WORLD_DIM> {
        assert!(
            range.end <= self.entities[dim].count,
            "range {range:?} out of bounds for {} {dim}-entities",
            self.entities[dim].count,
        );
        EntityIter::new(self, dim, IndexIter::All(range))
    }

    /// Iterate over the `D`-dimensional entities with the given global indices,
    /// in the order given.
    pub fn entities_from_indices<'a, const D: usize>(
        &'a self,
        indices: &'a [usize],
    ) -> EntityIter<'a, DIM, WORLD_DIM>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.entities_from_indices_dyn(D, indices)
    }

    pub(crate) fn entities_from_indices_dyn<'a>(
        &'a self,
        dim: usize,
        indices: &'a [usize],
    ) -> EntityIter<'a, DIM, WORLD_DIM> {
        let count = self.entities[dim].count;
        assert!(
            indices.iter().all(|&i| i < count),
            "index list out of bounds for {count} {dim}-entities",
        );
        EntityIter::new(self, dim, IndexIter::Listed(indices.iter()))
    }

    /// Iterate over the `D`-dimensional entities that pass the given predicate.
    ///
    /// The predicate is evaluated once per entity when this is called;
    /// the returned sequence can then be cloned and iterated any number of times.
    pub fn entity_range<const D: usize>(
        &self,
        pred: impl Fn(Entity<'_, DIM, WORLD_DIM>) -> bool,
    ) -> EntityIter<'_, DIM, WORLD_DIM>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        let indices: Vec<usize> = self
            .entities::<D>()
            .filter(|e| pred(*e))
            .map(|e| e.index())
            .collect();
        EntityIter::new(self, D, IndexIter::Owned(indices.into_iter()))
    }

    /// Create a subset of `D`-dimensional entities containing the entities
    /// that pass the given predicate.
    pub fn subset_from_predicate<const D: usize>(
        &self,
        pred: impl Fn(Entity<'_, DIM, WORLD_DIM>) -> bool,
    ) -> Subset<D>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        let mut indices = fb::FixedBitSet::with_capacity(self.num_entities_dyn(D));
        for entity in self.entities::<D>().filter(|e| pred(*e)) {
            indices.insert(entity.index());
        }
        Subset::new(indices)
    }

    /// Iterate over the entities in a subset.
    pub fn entities_in_subset<const D: usize>(
        &self,
        subset: &Subset<D>,
    ) -> EntityIter<'_, DIM, WORLD_DIM>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        let count = self.num_entities_dyn(D);
        let indices: Vec<usize> = subset.indices.ones().filter(|&i| i < count).collect();
        EntityIter::new(self, D, IndexIter::Owned(indices.into_iter()))
    }

    /// Get the set of `D`-dimensional entities on the mesh boundary.
    ///
    /// Faces are on the boundary if they belong to exactly one cell,
    /// cells if any of their faces is,
    /// and lower-dimensional entities if they lie on a boundary face.
    pub fn boundary<const D: usize>(&self) -> Subset<D>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        Subset::new(self.entities[D].mesh_boundary.clone())
    }

    /// Check whether a `D`-dimensional entity is on the mesh boundary.
    #[inline]
    pub fn is_boundary<const D: usize>(&self, index: usize) -> bool
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.entities[D].mesh_boundary.contains(index)
    }

    /// Get the global indices of the `D`-dimensional sub-entities of a cell,
    /// in the order of the combinations of the cell's nodes that span them.
    #[inline]
    pub fn cell_entities<const D: usize>(&self, cell: usize) -> &[usize]
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.cell_entities_dyn(D, cell)
    }

    #[inline]
    pub(crate) fn cell_entities_dyn(&self, dim: usize, cell: usize) -> &[usize] {
        let per_cell = self.entities[dim].per_cell;
        &self.entities[dim].cell_entities[cell * per_cell..(cell + 1) * per_cell]
    }

    /// Get the sorted indices of the `K`-dimensional entities
    /// containing the `D`-dimensional entity with the given index.
    ///
    /// # Panics
    ///
    /// If `K <= D`.
    #[inline]
    pub fn incidence<const D: usize, const K: usize>(&self, index: usize) -> &[usize]
    where
        na::Const<DIM>: na::DimNameSub<na::Const<K>>,
        na::Const<K>: na::DimNameSub<na::Const<D>>,
    {
        self.incidence_dyn(D, K, index)
    }

    #[inline]
    pub(crate) fn incidence_dyn(&self, dim: usize, upper_dim: usize, index: usize) -> &[usize] {
        assert!(
            upper_dim > dim && upper_dim <= DIM,
            "incidence from dimension {dim} to {upper_dim} does not exist"
        );
        self.entities[dim].incidence[upper_dim - dim - 1].lane(index)
    }

    /// Get the sorted indices of the `D`-dimensional entities sharing a
    /// `D - 1`-dimensional sub-entity with the given entity.
    ///
    /// Nodes have no neighbors by this definition.
    #[inline]
    pub fn neighbors<const D: usize>(&self, index: usize) -> &[usize]
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.entities[D].neighbors.lane(index)
    }

    /// Find the index of an entity given its node indices (in any order).
    ///
    /// Returns None if no `D`-entity with the given nodes exists.
    /// This is always the case if the number of nodes isn't `D + 1`.
    /// Cells with identical node sets resolve to the lowest cell index.
    pub fn find_entity<const D: usize>(&self, nodes: &[usize]) -> Option<usize>
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.find_entity_dyn(D, nodes)
    }

    pub(crate) fn find_entity_dyn(&self, dim: usize, nodes: &[usize]) -> Option<usize> {
        if nodes.len() != dim + 1 {
            return None;
        }
        let mut key = nodes.to_vec();
        key.sort_unstable();
        if dim < DIM {
            return self.entities[dim].table.position(&key);
        }

        let first = self
            .cell_lookup
            .partition_point(|&c| self.cell_key(c) < key.as_slice());
        let &cell = self.cell_lookup.get(first)?;
        (self.cell_key(cell) == key.as_slice()).then_some(cell)
    }

    #[inline]
    fn cell_key(&self, cell: usize) -> &[usize] {
        &self.cell_keys[cell * (DIM + 1)..(cell + 1) * (DIM + 1)]
    }

    /// Node indices of an entity.
    /// Sorted for everything but cells, which keep their given order.
    #[inline]
    pub(crate) fn entity_nodes(&self, dim: usize, index: usize) -> &[usize] {
        if dim == DIM {
            &self.cells[index * (DIM + 1)..(index + 1) * (DIM + 1)]
        } else {
            self.entities[dim].table.get(index)
        }
    }

    /// Sorted node indices of an entity.
    #[inline]
    pub(crate) fn entity_key(&self, dim: usize, index: usize) -> &[usize] {
        if dim == DIM {
            self.cell_key(index)
        } else {
            self.entities[dim].table.get(index)
        }
    }

    /// Sub-entity lookup for entities that aren't cells,
    /// whose sub-entities are not stored but found by binary search.
    pub(crate) fn lookup_sub_entities(
        &self,
        dim: usize,
        index: usize,
        sub_dim: usize,
    ) -> Vec<usize> {
        use itertools::Itertools;

        if sub_dim == dim {
            return vec![index];
        }
        let combinations: Vec<Vec<usize>> = (0..dim + 1).combinations(sub_dim + 1).collect();
        let mut buf = Vec::with_capacity(sub_dim + 1);
        let mut out = Vec::with_capacity(combinations.len());
        mesh_construction::lookup_combinations(
            self.entity_nodes(dim, index),
            &combinations,
            &self.entities[sub_dim].table,
            &mut buf,
            &mut out,
        );
        out
    }
}
