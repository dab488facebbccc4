//! How a kernel touches data: through which entity, and in which mode.

use nalgebra as na;

use crate::mesh::{Entity, EntityKind};

/// The way a kernel invocation uses a data buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessMode {
    /// The buffer is only read.
    Read,
    /// The buffer is overwritten without reading it first.
    Write,
    /// The buffer is read and then written.
    ReadWrite,
    /// Contributions folded into the buffer in any order relative to each other,
    /// each exactly once.
    Accumulate,
}

impl AccessMode {
    /// Whether this mode reads the buffer.
    #[inline]
    pub fn reads(self) -> bool {
        !matches!(self, Self::Write)
    }

    /// Whether this mode writes the buffer.
    #[inline]
    pub fn writes(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// A mapping from an entity visited by a loop
/// to the entity whose data the kernel actually touches.
///
/// The dimension of the touched entity is fixed per pattern,
/// which lets dependency analysis group accesses by codimension.
pub trait AccessPattern<const DIM: usize, const WORLD_DIM: usize> {
    /// Dimension of the entities this pattern returns.
    const TARGET_DIM: usize;

    /// Codimension of the entities this pattern returns
    /// relative to the cells of the mesh.
    fn codim(&self) -> usize {
        DIM - Self::TARGET_DIM
    }

    /// Get the entity touched when visiting the given one.
    fn access<'a>(&self, entity: Entity<'a, DIM, WORLD_DIM>) -> Entity<'a, DIM, WORLD_DIM>;
}

/// Access to the visited entity itself, which must be `D`-dimensional.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfAccess<const D: usize>;

impl<const D: usize, const DIM: usize, const WORLD_DIM: usize> AccessPattern<DIM, WORLD_DIM>
    for SelfAccess<D>
where
    na::Const<DIM>: na::DimNameSub<na::Const<D>>,
{
    const TARGET_DIM: usize = D;

    #[inline]
    fn access<'a>(&self, entity: Entity<'a, DIM, WORLD_DIM>) -> Entity<'a, DIM, WORLD_DIM> {
        assert_eq!(entity.dim(), D, "self access to an entity of the wrong dimension");
        entity
    }
}

/// Access to the cell the visited entity was reached through.
///
/// Entities not reached through a cell
/// resolve to the lowest-index cell containing them,
/// and cells to themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContainingCell;

impl<const DIM: usize, const WORLD_DIM: usize> AccessPattern<DIM, WORLD_DIM> for ContainingCell {
    const TARGET_DIM: usize = DIM;

    fn access<'a>(&self, entity: Entity<'a, DIM, WORLD_DIM>) -> Entity<'a, DIM, WORLD_DIM> {
        let mesh = entity.mesh();
        match entity.containing_cell() {
            Some(cell) => mesh.cell(cell),
            None => mesh.cell(mesh.incidence_dyn(entity.dim(), DIM, entity.index())[0]),
        }
    }
}

/// Access to the cell on the other side of the visited face.
///
/// On the mesh boundary, where there is no other cell,
/// this is the cell the face was reached through.
/// Faces not reached through a cell resolve to the highest-index cell containing them,
/// and cells to themselves.
///
/// Only faces and cells can be visited with this pattern.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeighborCell;

impl<const DIM: usize, const WORLD_DIM: usize> AccessPattern<DIM, WORLD_DIM> for NeighborCell {
    const TARGET_DIM: usize = DIM;

    fn access<'a>(&self, entity: Entity<'a, DIM, WORLD_DIM>) -> Entity<'a, DIM, WORLD_DIM> {
        let mesh = entity.mesh();
        match entity.kind() {
            EntityKind::Cell => entity,
            _ => {
                assert_eq!(
                    entity.dim() + 1,
                    DIM,
                    "neighbor cell access from an entity that isn't a face"
                );
                let cells = mesh.incidence_dyn(entity.dim(), DIM, entity.index());
                let other = match entity.containing_cell() {
                    Some(from) => cells.iter().copied().find(|&c| c != from).unwrap_or(from),
                    None => cells[cells.len() - 1],
                };
                mesh.cell(other)
            }
        }
    }
}
