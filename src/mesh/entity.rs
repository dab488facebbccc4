use super::SimplicialMesh;

use nalgebra as na;

/// What an entity is relative to the cells of the mesh.
///
/// Some queries only make sense for certain kinds of entity,
/// e.g. the outward normal of a face is only defined
/// when the face was reached through the cell it bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A top-dimensional entity.
    Cell,
    /// A lower-dimensional entity reached by iterating the sub-entities of a specific cell,
    /// so that its containing cell and its position in that cell are known.
    CellSubEntity,
    /// A lower-dimensional entity fetched from the mesh directly
    /// or reached from another non-cell entity.
    Free,
}

/// A view into a single entity of the mesh.
///
/// Entities are cheap to copy and construct on demand;
/// they borrow the mesh and never outlive it.
/// Two entities are equal if they have the same dimension and span the same nodes.
#[derive(Clone, Copy)]
pub struct Entity<'a, const DIM: usize, const WORLD_DIM: usize> {
    pub(super) mesh: &'a SimplicialMesh<DIM, WORLD_DIM>,
    pub(super) dim: usize,
    pub(super) index: usize,
    pub(super) local_index: usize,
    pub(super) cell: Option<usize>,
}

impl<'a, const DIM: usize, const WORLD_DIM: usize> std::fmt::Debug for Entity<'a, DIM, WORLD_DIM> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("dim", &self.dim)
            .field("index", &self.index)
            .field("local_index", &self.local_index)
            .field("cell", &self.cell)
            .field("nodes", &self.nodes())
            .finish()
    }
}

impl<'a, const DIM: usize, const WORLD_DIM: usize> PartialEq for Entity<'a, DIM, WORLD_DIM> {
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim
            && self.mesh.entity_key(self.dim, self.index)
                == other.mesh.entity_key(other.dim, other.index)
    }
}
impl<'a, const DIM: usize, const WORLD_DIM: usize> Eq for Entity<'a, DIM, WORLD_DIM> {}

impl<'a, const DIM: usize, const WORLD_DIM: usize> Entity<'a, DIM, WORLD_DIM> {
    /// The mesh this entity belongs to.
    #[inline]
    pub fn mesh(&self) -> &'a SimplicialMesh<DIM, WORLD_DIM> {
        self.mesh
    }

    /// Dimension of the entity.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Codimension of the entity, i.e. cell dimension minus its own.
    #[inline]
    pub fn codim(&self) -> usize {
        DIM - self.dim
    }

    /// Get the global index of this entity
    /// in the ordering of entities of its dimension.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the position of this entity relative to the entity it was reached from
    /// with [`sub_entities`][Self::sub_entities].
    /// Equal to the global index for entities fetched from the mesh directly.
    #[inline]
    pub fn local_index(&self) -> usize {
        self.local_index
    }

    /// Get the index of the cell this entity was reached through, if any.
    /// Always `Some` for cells themselves.
    #[inline]
    pub fn containing_cell(&self) -> Option<usize> {
        self.cell
    }

    /// Get the role of this entity relative to the cells of the mesh.
    #[inline]
    pub fn kind(&self) -> EntityKind {
        if self.dim == DIM {
            EntityKind::Cell
        } else if self.cell.is_some() {
            EntityKind::CellSubEntity
        } else {
            EntityKind::Free
        }
    }

    /// Get the node indices of this entity.
    ///
    /// These are sorted for every entity except cells,
    /// which keep the order given at mesh construction.
    #[inline]
    pub fn nodes(&self) -> &'a [usize] {
        self.mesh.entity_nodes(self.dim, self.index)
    }

    /// Iterate over the coordinates of the nodes of this entity.
    #[inline]
    pub fn node_coords(&self) -> impl 'a + Iterator<Item = na::SVector<f64, WORLD_DIM>> {
        let mesh = self.mesh;
        self.nodes().iter().map(move |&n| mesh.nodes[n])
    }

    /// Check whether this entity lies on the boundary of the mesh.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        self.mesh.entities[self.dim].mesh_boundary.contains(self.index)
    }

    /// Iterate over the `sub_dim`-dimensional entities spanned by subsets of this entity's nodes.
    ///
    /// The local index of each yielded entity is its position
    /// among the combinations of this entity's nodes,
    /// and the containing cell of this entity is carried over to them.
    ///
    /// # Panics
    ///
    /// If `sub_dim` is greater than the dimension of this entity.
    pub fn sub_entities(&self, sub_dim: usize) -> SubEntityIter<'a, DIM, WORLD_DIM> {
        assert!(
            sub_dim <= self.dim,
            "a {}-entity has no {sub_dim}-dimensional sub-entities",
            self.dim
        );
        let indices = if self.dim == DIM {
            IndexIter::Listed(self.mesh.cell_entities_dyn(sub_dim, self.index).iter())
        } else {
            IndexIter::Owned(
                self.mesh
                    .lookup_sub_entities(self.dim, self.index, sub_dim)
                    .into_iter(),
            )
        };
        SubEntityIter {
            mesh: self.mesh,
            dim: sub_dim,
            cell: self.cell,
            indices,
            position: 0,
        }
    }

    /// Iterate over the `upper_dim`-dimensional entities containing this one.
    ///
    /// # Panics
    ///
    /// If `upper_dim` is not between this entity's dimension (exclusive)
    /// and the cell dimension (inclusive).
    pub fn incident(&self, upper_dim: usize) -> EntityIter<'a, DIM, WORLD_DIM> {
        let indices = self.mesh.incidence_dyn(self.dim, upper_dim, self.index);
        EntityIter::new(self.mesh, upper_dim, IndexIter::Listed(indices.iter()))
    }

    /// Iterate over the entities of the same dimension
    /// sharing a sub-entity one dimension down with this one.
    /// Empty for nodes.
    pub fn neighbors(&self) -> EntityIter<'a, DIM, WORLD_DIM> {
        let indices = self.mesh.entities[self.dim].neighbors.lane(self.index);
        EntityIter::new(self.mesh, self.dim, IndexIter::Listed(indices.iter()))
    }
}

/// Iterator over a set of same-dimensional entities in a mesh.
///
/// These are lazy and restartable: clone one to iterate it again.
#[derive(Clone)]
pub struct EntityIter<'a, const DIM: usize, const WORLD_DIM: usize> {
    mesh: &'a SimplicialMesh<DIM, WORLD_DIM>,
    dim: usize,
    idx_iter: IndexIter<'a>,
}

impl<'a, const DIM: usize, const WORLD_DIM: usize> EntityIter<'a, DIM, WORLD_DIM> {
    #[inline]
    pub(super) fn new(
        mesh: &'a SimplicialMesh<DIM, WORLD_DIM>,
        dim: usize,
        idx_iter: IndexIter<'a>,
    ) -> Self {
        Self {
            mesh,
            dim,
            idx_iter,
        }
    }

    /// Dimension of the entities in this sequence.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl<'a, const DIM: usize, const WORLD_DIM: usize> Iterator for EntityIter<'a, DIM, WORLD_DIM> {
    type Item = Entity<'a, DIM, WORLD_DIM>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.idx_iter.next()?;
        Some(Entity {
            mesh: self.mesh,
            dim: self.dim,
            index,
            local_index: index,
            cell: (self.dim == DIM).then_some(index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.idx_iter.size_hint()
    }
}

impl<'a, const DIM: usize, const WORLD_DIM: usize> ExactSizeIterator
    for EntityIter<'a, DIM, WORLD_DIM>
{
}

/// Iterator over the sub-entities of an entity,
/// obtained with [`Entity::sub_entities`].
#[derive(Clone)]
pub struct SubEntityIter<'a, const DIM: usize, const WORLD_DIM: usize> {
    mesh: &'a SimplicialMesh<DIM, WORLD_DIM>,
    dim: usize,
    cell: Option<usize>,
    indices: IndexIter<'a>,
    position: usize,
}

impl<'a, const DIM: usize, const WORLD_DIM: usize> Iterator
    for SubEntityIter<'a, DIM, WORLD_DIM>
{
    type Item = Entity<'a, DIM, WORLD_DIM>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.indices.next()?;
        let local_index = self.position;
        self.position += 1;
        Some(Entity {
            mesh: self.mesh,
            dim: self.dim,
            index,
            local_index,
            cell: self.cell,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

/// A set of indices to iterate over,
/// defined either as a contiguous range
/// or an explicit list, borrowed or owned.
#[derive(Clone, Debug)]
pub(super) enum IndexIter<'a> {
    All(std::ops::Range<usize>),
    Listed(std::slice::Iter<'a, usize>),
    Owned(std::vec::IntoIter<usize>),
}

impl<'a> Iterator for IndexIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::All(range) => range.next(),
            Self::Listed(indices) => indices.next().copied(),
            Self::Owned(indices) => indices.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::All(range) => range.size_hint(),
            Self::Listed(indices) => indices.size_hint(),
            Self::Owned(indices) => indices.size_hint(),
        }
    }
}
