//! Built meshes, partitions and dependency results are immutable
//! and can be read from many threads at once.

use itertools::Itertools;

use kernelmesh::{
    mesh::{unit_cube_5_tets, unit_cube_5_tets_data},
    DataDependencyMap, ForEachIncidence, Geometry, Graph, NeighborCell, PartitionConfig,
    PartitionMethod, PartitionedMesh, SimplicialMesh,
};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn shared_types_are_send_and_sync() {
    assert_send_sync::<SimplicialMesh<3, 3>>();
    assert_send_sync::<PartitionedMesh<3, 3>>();
    assert_send_sync::<DataDependencyMap>();
    assert_send_sync::<Graph<&str>>();
    assert_send_sync::<Geometry<'_, 3, 3>>();
}

#[test]
fn concurrent_reads_of_one_mesh() {
    let mesh = unit_cube_5_tets();
    let geom = Geometry::new(&mesh);

    let results = std::thread::scope(|s| {
        let handles = (0..4)
            .map(|_| {
                s.spawn(|| {
                    let faces = mesh
                        .entities::<2>()
                        .map(|f| (f.index(), f.is_boundary()))
                        .collect_vec();
                    // the volume cache is filled by whichever thread gets there first
                    let volumes = geom.volumes::<3>().to_vec();
                    (faces, volumes)
                })
            })
            .collect_vec();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect_vec()
    });

    let (faces, volumes) = &results[0];
    assert_eq!(faces.len(), 16);
    assert_eq!(faces.iter().filter(|(_, boundary)| *boundary).count(), 12);
    assert_eq!(volumes.len(), 5);
    assert!(results.iter().all(|r| r == &results[0]));
    // every thread saw the same cached table
    assert_eq!(geom.volumes::<3>(), volumes.as_slice());
}

#[test]
fn concurrent_dependency_maps() {
    let (nodes, cells) = unit_cube_5_tets_data();
    let config = PartitionConfig {
        num_l1: 1,
        l2_per_l1: 4,
        method: PartitionMethod::Contiguous,
    };
    let pmesh = PartitionedMesh::<3, 3>::new(nodes, cells, &config, &[0]).unwrap();
    let expected = DataDependencyMap::new(&pmesh, &NeighborCell, &ForEachIncidence::<3, 2>);

    std::thread::scope(|s| {
        for l2 in 0..4 {
            let (pmesh, expected) = (&pmesh, &expected);
            s.spawn(move || {
                let map = DataDependencyMap::new(pmesh, &NeighborCell, &ForEachIncidence::<3, 2>);
                assert_eq!(&map, expected);
                // every partition reaches across at least one face
                assert!(expected.has_access(l2).any(|p| p != l2));
            });
        }
    });
}
