//! End-to-end scenarios on the unit cube split into five tetrahedra:
//! four corner cells around one middle cell.

use approx::assert_relative_eq;
use itertools::Itertools;

use kernelmesh::{
    mesh::{unit_cube_5_tets, unit_cube_5_tets_data},
    partition::{IdentityPartitioner, PartitionError, Partitioner},
    AccessMode, DataDependencyMap, ForEachEntity, ForEachIncidence, Geometry, Graph, NeighborCell,
    PartitionConfig, PartitionMethod, PartitionedMesh, SelfAccess,
};

#[test]
fn cube_topology() {
    let mesh = unit_cube_5_tets();
    assert_eq!(mesh.num_entities::<3>(), 5);
    assert_eq!(mesh.num_entities::<2>(), 16);
    assert_eq!(mesh.num_entities::<1>(), 18);
    assert_eq!(mesh.num_entities::<0>(), 8);

    let (shared, single): (Vec<_>, Vec<_>) = mesh
        .entities::<2>()
        .partition(|f| mesh.incidence::<2, 3>(f.index()).len() == 2);
    assert_eq!(shared.len(), 4);
    assert_eq!(single.len(), 12);
    // the shared faces are exactly those of the middle cell
    let middle = mesh.find_entity::<3>(&[0, 3, 5, 6]).unwrap();
    itertools::assert_equal(
        shared.iter().map(|f| f.index()).sorted(),
        mesh.cell_entities::<2>(middle).iter().copied().sorted(),
    );
    assert!(single.iter().all(|f| f.is_boundary()));
    assert!(shared.iter().all(|f| !f.is_boundary()));

    let geom = Geometry::new(&mesh);
    assert_relative_eq!(geom.volumes::<3>().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(geom.volumes::<3>()[middle], 1.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn identity_partitioner_round_trip() {
    let (nodes, cells) = unit_cube_5_tets_data();
    let parts = IdentityPartitioner.partition(&cells, 4, nodes.len(), 1).unwrap();
    assert_eq!(parts.elements, vec![0; 5]);
    assert_eq!(parts.nodes, vec![0; 8]);
    assert_eq!(
        IdentityPartitioner.partition(&cells, 4, nodes.len(), 2),
        Err(PartitionError::IdentityRequiresSinglePartition { requested: 2 })
    );
}

#[test]
fn even_split_access_maps() {
    let (nodes, cells) = unit_cube_5_tets_data();
    let config = PartitionConfig {
        num_l1: 1,
        l2_per_l1: 4,
        method: PartitionMethod::Contiguous,
    };
    let pmesh = PartitionedMesh::<3, 3>::new(nodes, cells, &config, &[0]).unwrap();

    let own = DataDependencyMap::new(&pmesh, &SelfAccess::<3>, &ForEachEntity::<3>);
    for l2 in 0..4 {
        itertools::assert_equal(own.has_access(l2), [l2]);
    }

    let across = DataDependencyMap::new(&pmesh, &NeighborCell, &ForEachIncidence::<3, 2>);
    itertools::assert_equal(across.has_access(3), [0, 1, 2]);
    for l2 in 0..3 {
        itertools::assert_equal(across.has_access(l2), [l2, 3]);
    }
}

/// Partition with the dual graph, derive the data each partition needs,
/// and order a two-kernel time step over it.
#[test]
fn partitioned_time_step() {
    let (nodes, cells) = unit_cube_5_tets_data();
    let config = PartitionConfig {
        num_l1: 1,
        l2_per_l1: 2,
        method: PartitionMethod::DualGraph {
            num_common_nodes: 3,
        },
    };
    let pmesh = PartitionedMesh::<3, 3>::new(nodes, cells, &config, &[0]).unwrap();
    let mesh = pmesh.mesh();
    for l2 in 0..2 {
        assert!(!pmesh.cell_range(l2).is_empty());
    }

    // every face is owned once, by the partition of its lowest cell
    let mut owned_faces = (0..2)
        .flat_map(|l2| pmesh.owned_entities::<2>(l2).iter().copied())
        .collect_vec();
    owned_faces.sort_unstable();
    itertools::assert_equal(owned_faces, 0..mesh.num_entities::<2>());

    // flux across faces reads the neighbor cell,
    // the update only touches the cell itself
    let flux = DataDependencyMap::new(&pmesh, &NeighborCell, &ForEachIncidence::<3, 2>);
    let update = DataDependencyMap::new(&pmesh, &SelfAccess::<3>, &ForEachEntity::<3>);
    for l2 in 0..2 {
        assert!(flux.has_access(l2).any(|p| p == l2));
        // faces are seen from both sides
        for other in flux.has_access(l2) {
            assert!(flux.has_access(other).any(|p| p == l2));
        }
        itertools::assert_equal(update.has_access(l2), [l2]);
    }
    let mut step = flux.clone();
    step += &update;
    assert_eq!(step, flux);

    let mut graph = Graph::new();
    let flux_kernels = (0..2).map(|_| graph.add_vertex().unwrap()).collect_vec();
    let update_kernels = (0..2).map(|_| graph.add_vertex().unwrap()).collect_vec();
    for l2 in 0..2 {
        for other in flux.has_access(l2) {
            graph
                .add_dependency(flux_kernels[l2], ("u", other), AccessMode::Read)
                .unwrap();
        }
        graph
            .add_dependency(flux_kernels[l2], ("flux", l2), AccessMode::Write)
            .unwrap();
        graph
            .add_dependency(update_kernels[l2], ("flux", l2), AccessMode::Read)
            .unwrap();
        graph
            .add_dependency(update_kernels[l2], ("u", l2), AccessMode::ReadWrite)
            .unwrap();
    }
    graph.finalize().unwrap();

    assert_eq!(
        graph.execution_levels().unwrap(),
        vec![flux_kernels.clone(), update_kernels.clone()]
    );
    for edge in graph.edges().unwrap() {
        let (name, l2) = edge.key;
        // field values come from the previous step's update
        if name == "u" {
            assert_eq!(edge.producer, update_kernels[l2]);
            assert!(edge.is_wraparound());
        } else {
            assert_eq!(edge.producer, flux_kernels[l2]);
            assert_eq!(edge.consumer, update_kernels[l2]);
        }
    }
}
