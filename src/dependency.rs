//! Ordering kernel invocations and planning data exchange between partitions.
//!
//! [`Graph`] resolves read-after-write hazards between kernel invocations
//! declared against opaque data keys,
//! and [`DataDependencyMap`] records which partitions touch which other partitions'
//! entities when a kernel runs over a partitioned mesh.

mod graph;
pub use graph::{DependencyEdge, Graph, GraphError, VertexId};

mod map;
pub use map::DataDependencyMap;
