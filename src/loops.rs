//! Loop shapes: what a kernel visits for each entity in the range it runs over.

use crate::mesh::{Entity, EntityIter};

/// The structure of a loop over a range of `ENTITY_DIM`-dimensional entities.
pub trait LoopShape {
    /// Dimension of the entities the loop ranges over.
    const ENTITY_DIM: usize;

    /// Call `f` with every entity visited for one entity of the range.
    fn visit<'a, const DIM: usize, const WORLD_DIM: usize>(
        &self,
        entity: Entity<'a, DIM, WORLD_DIM>,
        f: impl FnMut(Entity<'a, DIM, WORLD_DIM>),
    );

    /// Run a kernel over every entity visited for a range of entities, in order.
    fn run<'a, const DIM: usize, const WORLD_DIM: usize>(
        &self,
        range: EntityIter<'a, DIM, WORLD_DIM>,
        mut kernel: impl FnMut(Entity<'a, DIM, WORLD_DIM>),
    ) {
        assert_eq!(
            range.dim(),
            Self::ENTITY_DIM,
            "loop range has the wrong dimension"
        );
        for entity in range {
            self.visit(entity, &mut kernel);
        }
    }
}

/// Visit each entity of the range itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForEachEntity<const D: usize>;

impl<const D: usize> LoopShape for ForEachEntity<D> {
    const ENTITY_DIM: usize = D;

    #[inline]
    fn visit<'a, const DIM: usize, const WORLD_DIM: usize>(
        &self,
        entity: Entity<'a, DIM, WORLD_DIM>,
        mut f: impl FnMut(Entity<'a, DIM, WORLD_DIM>),
    ) {
        f(entity)
    }
}

/// Visit the `K`-dimensional sub-entities of each `D`-dimensional entity of the range,
/// e.g. the faces of every cell.
///
/// The visited entities carry their position in the parent entity
/// and the parent's containing cell.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForEachIncidence<const D: usize, const K: usize>;

impl<const D: usize, const K: usize> LoopShape for ForEachIncidence<D, K> {
    const ENTITY_DIM: usize = D;

    #[inline]
    fn visit<'a, const DIM: usize, const WORLD_DIM: usize>(
        &self,
        entity: Entity<'a, DIM, WORLD_DIM>,
        f: impl FnMut(Entity<'a, DIM, WORLD_DIM>),
    ) {
        entity.sub_entities(K).for_each(f)
    }
}
