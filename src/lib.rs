//! Topology, partitioning and dependency analysis
//! for kernels running over unstructured simplicial meshes.
//!
//! The pieces build on each other:
//! - a [`SimplicialMesh`] derives every sub-entity of its cells
//!   along with incidence, neighbor and boundary information,
//! - [`partition`] splits a mesh into a two-level hierarchy of partitions
//!   and reorders it so every partition is one contiguous index range,
//! - a [`PartitionedMesh`] assigns each entity to exactly one owning partition,
//! - [`access`] and [`loops`] describe what a kernel visits and touches,
//! - [`dependency`] turns that into an execution order between kernel invocations
//!   and a map of the data partitions need from each other.
//!
//! Running kernels and moving data are left to the caller.
//!
//! ```
//! # use kernelmesh::*;
//! let nodes = vec![Vec2::new(0., 0.), Vec2::new(1., 0.), Vec2::new(0., 1.), Vec2::new(1., 1.)];
//! let cells = vec![0, 1, 2, 1, 3, 2];
//! let config = PartitionConfig {
//!     num_l1: 1,
//!     l2_per_l1: 2,
//!     method: PartitionMethod::Contiguous,
//! };
//! let pmesh = PartitionedMesh::<2, 2>::new(nodes, cells, &config, &[0]).unwrap();
//! assert_eq!(pmesh.mesh().num_entities::<1>(), 5);
//!
//! let map = DataDependencyMap::new(&pmesh, &NeighborCell, &ForEachIncidence::<2, 1>);
//! assert_eq!(map.has_access(0).collect::<Vec<_>>(), vec![0, 1]);
//! ```

#![warn(missing_docs)]

pub mod mesh;
#[doc(inline)]
pub use mesh::{Entity, EntityIter, EntityKind, MeshError, SimplicialMesh, Subset};

pub mod geometry;
#[doc(inline)]
pub use geometry::Geometry;

pub mod partition;
#[doc(inline)]
pub use partition::{PartitionConfig, PartitionError, PartitionLayout, PartitionMethod};

pub mod partitioned_mesh;
#[doc(inline)]
pub use partitioned_mesh::PartitionedMesh;

pub mod access;
#[doc(inline)]
pub use access::{AccessMode, AccessPattern, ContainingCell, NeighborCell, SelfAccess};

pub mod loops;
#[doc(inline)]
pub use loops::{ForEachEntity, ForEachIncidence, LoopShape};

pub mod dependency;
#[doc(inline)]
pub use dependency::{DataDependencyMap, DependencyEdge, Graph};

// nalgebra re-exports of common types for convenience

pub use nalgebra as na;
/// Type alias for a 2D `nalgebra` vector.
pub type Vec2 = na::Vector2<f64>;
/// Type alias for a 3D `nalgebra` vector.
pub type Vec3 = na::Vector3<f64>;
