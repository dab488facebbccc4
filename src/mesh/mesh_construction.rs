use nalgebra as na;
use nalgebra_sparse::pattern::SparsityPattern;

use fixedbitset as fb;
use itertools::Itertools;

use super::{tuple_table::TupleTable, EntityCollection, MeshError, SimplicialMesh};

/// Construct a mesh from raw nodes and cell indices.
///
/// The indices are given as a flat array,
/// where every `DIM + 1` indices correspond to one cell.
///
/// Every sub-entity of every cell is derived here, once,
/// along with incidence, adjacency and boundary information.
/// The resulting tables are never modified afterwards.
pub fn build_mesh<const DIM: usize, const WORLD_DIM: usize>(
    nodes: Vec<na::SVector<f64, WORLD_DIM>>,
    cells: Vec<usize>,
) -> Result<SimplicialMesh<DIM, WORLD_DIM>, MeshError> {
    assert!(DIM > 0, "meshes must have at least one dimension");
    let cell_size = DIM + 1;
    validate_cells(&cells, cell_size, nodes.len())?;
    let cell_count = cells.len() / cell_size;

    //
    // canonical entity tables
    //

    // local structure of a cell: for each dimension,
    // the positions of the cell's nodes spanning each sub-entity of that dimension
    let cell_combinations: Vec<Vec<Vec<usize>>> = (0..=DIM)
        .map(|dim| (0..cell_size).combinations(dim + 1).collect())
        .collect();

    // every combination of a cell's nodes, sorted, is a sub-entity.
    // duplicates between cells are merged by sorting the whole list,
    // which also assigns each distinct entity its dense global index
    let mut tables: Vec<TupleTable> = Vec::with_capacity(DIM);
    for (dim, combinations) in cell_combinations.iter().take(DIM).enumerate() {
        let mut raw: Vec<usize> =
            Vec::with_capacity(cell_count * combinations.len() * (dim + 1));
        for cell in cells.chunks_exact(cell_size) {
            for combination in combinations {
                let start = raw.len();
                raw.extend(combination.iter().map(|&i| cell[i]));
                raw[start..].sort_unstable();
            }
        }
        tables.push(TupleTable::from_unsorted(dim + 1, &raw));
    }

    // for each cell, the global index of every sub-entity in combination order.
    // this is the local structure table used to navigate from a cell to its sub-entities
    let mut cell_entities: Vec<Vec<usize>> = Vec::with_capacity(DIM + 1);
    let mut buf: Vec<usize> = Vec::with_capacity(cell_size);
    for (table, combinations) in tables.iter().zip(&cell_combinations) {
        let mut entities = Vec::with_capacity(cell_count * combinations.len());
        for cell in cells.chunks_exact(cell_size) {
            lookup_combinations(cell, combinations, table, &mut buf, &mut entities);
        }
        cell_entities.push(entities);
    }
    cell_entities.push((0..cell_count).collect());

    let entity_counts: Vec<usize> = tables
        .iter()
        .map(|t| t.len())
        .chain(std::iter::once(cell_count))
        .collect();

    //
    // incidence
    //

    // downward[upper][lower] holds, for every entity of dimension `upper`,
    // the sorted indices of its sub-entities of dimension `lower`.
    // these are only needed during construction;
    // the upward maps kept in the mesh are their transposes
    let mut downward: Vec<Vec<SparsityPattern>> = Vec::with_capacity(DIM + 1);
    for upper in 0..=DIM {
        let mut patterns = Vec::with_capacity(upper);
        for lower in 0..upper {
            let mut offsets = Vec::with_capacity(entity_counts[upper] + 1);
            offsets.push(0);
            let mut indices = Vec::new();
            if upper == DIM {
                let per_cell = cell_combinations[lower].len();
                for row in cell_entities[lower].chunks_exact(per_cell) {
                    let start = indices.len();
                    indices.extend_from_slice(row);
                    sort_dedup_tail(&mut indices, start);
                    offsets.push(indices.len());
                }
            } else {
                let combinations: Vec<Vec<usize>> =
                    (0..upper + 1).combinations(lower + 1).collect();
                for entity in tables[upper].iter() {
                    let start = indices.len();
                    lookup_combinations(
                        entity,
                        &combinations,
                        &tables[lower],
                        &mut buf,
                        &mut indices,
                    );
                    sort_dedup_tail(&mut indices, start);
                    offsets.push(indices.len());
                }
            }
            let pattern = SparsityPattern::try_from_offsets_and_indices(
                entity_counts[upper],
                entity_counts[lower],
                offsets,
                indices,
            )
            .expect("Error in incidence pattern construction. This is a bug in kernelmesh");
            patterns.push(pattern);
        }
        downward.push(patterns);
    }

    // upward incidence: for each entity, the entities of every higher dimension containing it
    let incidence: Vec<Vec<SparsityPattern>> = (0..=DIM)
        .map(|lower| {
            ((lower + 1)..=DIM)
                .map(|upper| downward[upper][lower].transpose())
                .collect()
        })
        .collect();

    //
    // neighbors
    //

    // two entities are neighbors if they share a sub-entity one dimension down.
    // nodes have no such sub-entities and get empty neighbor lists
    let mut neighbors: Vec<SparsityPattern> = Vec::with_capacity(DIM + 1);
    neighbors.push(
        SparsityPattern::try_from_offsets_and_indices(
            entity_counts[0],
            entity_counts[0],
            vec![0; entity_counts[0] + 1],
            Vec::new(),
        )
        .expect("Error in neighbor pattern construction. This is a bug in kernelmesh"),
    );
    for dim in 1..=DIM {
        let down = &downward[dim][dim - 1];
        // incidence of the (dim-1)-entities into dimension `dim` is the first upward map
        let up = &incidence[dim - 1][0];
        let mut offsets = Vec::with_capacity(entity_counts[dim] + 1);
        offsets.push(0);
        let mut indices = Vec::new();
        for entity_idx in 0..entity_counts[dim] {
            let start = indices.len();
            for &shared in down.lane(entity_idx) {
                indices.extend(up.lane(shared).iter().filter(|&&e| e != entity_idx));
            }
            sort_dedup_tail(&mut indices, start);
            offsets.push(indices.len());
        }
        neighbors.push(
            SparsityPattern::try_from_offsets_and_indices(
                entity_counts[dim],
                entity_counts[dim],
                offsets,
                indices,
            )
            .expect("Error in neighbor pattern construction. This is a bug in kernelmesh"),
        );
    }

    //
    // identify mesh boundary
    //

    let mut mesh_boundary: Vec<fb::FixedBitSet> = entity_counts
        .iter()
        .map(|&count| fb::FixedBitSet::with_capacity(count))
        .collect();

    // if a face is only on the boundary of one cell,
    // then it is on the boundary of the mesh
    let face_dim = DIM - 1;
    for face_idx in 0..entity_counts[face_dim] {
        if incidence[face_dim][0].lane(face_idx).len() == 1 {
            mesh_boundary[face_dim].insert(face_idx);
        }
    }
    let (lower_sets, upper_sets) = mesh_boundary.split_at_mut(face_dim);
    let (face_set, cell_set) = upper_sets.split_at_mut(1);
    let face_set = &face_set[0];
    // a cell is on the boundary if any of its faces is
    for cell_idx in 0..cell_count {
        if downward[DIM][face_dim]
            .lane(cell_idx)
            .iter()
            .any(|&f| face_set.contains(f))
        {
            cell_set[0].insert(cell_idx);
        }
    }
    // lower-dimensional entities are on the boundary if they lie on a boundary face
    for (dim, set) in lower_sets.iter_mut().enumerate() {
        let to_faces = &incidence[dim][face_dim - dim - 1];
        for entity_idx in 0..entity_counts[dim] {
            if to_faces.lane(entity_idx).iter().any(|&f| face_set.contains(f)) {
                set.insert(entity_idx);
            }
        }
    }

    //
    // lookup structure for cells by node tuple
    //

    let mut cell_keys = cells.clone();
    for key in cell_keys.chunks_exact_mut(cell_size) {
        key.sort_unstable();
    }
    let mut cell_lookup: Vec<usize> = (0..cell_count).collect();
    // stable sort, so duplicated cells resolve to the lowest index
    cell_lookup.sort_by(|&a, &b| {
        cell_keys[a * cell_size..(a + 1) * cell_size]
            .cmp(&cell_keys[b * cell_size..(b + 1) * cell_size])
    });

    log::debug!(
        "built {DIM}-dimensional mesh topology: {} nodes, entity counts {:?}",
        nodes.len(),
        entity_counts,
    );

    let mut tables = tables.into_iter();
    let entities: Vec<EntityCollection> = itertools::izip!(
        0..=DIM,
        cell_entities,
        incidence,
        neighbors,
        mesh_boundary,
    )
    .map(
        |(dim, cell_entities, incidence, neighbors, mesh_boundary)| EntityCollection {
            table: if dim < DIM {
                tables.next().unwrap_or_default()
            } else {
                TupleTable::default()
            },
            count: entity_counts[dim],
            per_cell: cell_combinations[dim].len(),
            cell_entities,
            incidence,
            neighbors,
            mesh_boundary,
        },
    )
    .collect();

    Ok(SimplicialMesh {
        nodes,
        cells,
        cell_keys,
        cell_lookup,
        entities,
    })
}

/// Check that the cell list describes proper simplices over the given nodes.
fn validate_cells(cells: &[usize], cell_size: usize, node_count: usize) -> Result<(), MeshError> {
    if cells.len() % cell_size != 0 {
        return Err(MeshError::CellIndexCount {
            len: cells.len(),
            cell_size,
        });
    }
    for (cell_idx, cell) in cells.chunks_exact(cell_size).enumerate() {
        if let Some(&node) = cell.iter().find(|&&n| n >= node_count) {
            return Err(MeshError::NodeOutOfRange {
                cell: cell_idx,
                node,
                node_count,
            });
        }
        if !cell.iter().all_unique() {
            return Err(MeshError::DegenerateCell { cell: cell_idx });
        }
    }
    Ok(())
}

/// Look up the global indices of the sub-entities of `nodes`
/// spanned by each of the given position combinations,
/// appending them to `out`.
pub(super) fn lookup_combinations(
    nodes: &[usize],
    combinations: &[Vec<usize>],
    table: &TupleTable,
    buf: &mut Vec<usize>,
    out: &mut Vec<usize>,
) {
    for combination in combinations {
        buf.clear();
        buf.extend(combination.iter().map(|&i| nodes[i]));
        buf.sort_unstable();
        let idx = table
            .position(buf)
            .expect("Sub-entity missing from its entity table. This is a bug in kernelmesh");
        out.push(idx);
    }
}

/// Sort and deduplicate the part of `v` starting at `start`.
fn sort_dedup_tail(v: &mut Vec<usize>, start: usize) {
    v[start..].sort_unstable();
    let mut write = start;
    for read in start..v.len() {
        if write == start || v[read] != v[write - 1] {
            v[write] = v[read];
            write += 1;
        }
    }
    v.truncate(write);
}

//
// tests
//

type Vec2 = na::SVector<f64, 2>;
type Vec3 = na::SVector<f64, 3>;

/// A small hexagon-shaped 2D mesh for testing basic functionality.
/// Shaped somewhat like this:
///    ____
///   /\  /\
///  /__\/__\
///  \  /\  /
///   \/__\/
///
/// with nodes and triangles ordered left to right, top to bottom.
///
/// This is public for visibility in doctests, which frequently need an instance of a mesh.
/// It is not meant to be used by users and thus hidden from docs.
#[doc(hidden)]
pub fn tiny_mesh_2d() -> SimplicialMesh<2, 2> {
    let nodes = vec![
        Vec2::new(-0.5, 1.0),
        Vec2::new(0.5, 1.0),
        Vec2::new(-1.0, 0.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(-0.5, -1.0),
        Vec2::new(0.5, -1.0),
    ];
    #[rustfmt::skip]
    let cells = vec![
        0, 2, 3,
        0, 1, 3,
        1, 3, 4,
        2, 3, 5,
        3, 5, 6,
        3, 4, 6,
    ];
    SimplicialMesh::new(nodes, cells)
}

/// Nodes and cells of the unit cube split into five tetrahedra:
/// four corner tetrahedra followed by the middle one,
/// which shares one face with each corner.
///
/// Node `i` sits at `(i & 1, (i >> 1) & 1, (i >> 2) & 1)`.
#[doc(hidden)]
pub fn unit_cube_5_tets_data() -> (Vec<Vec3>, Vec<usize>) {
    let nodes = (0..8)
        .map(|i| Vec3::new((i & 1) as f64, ((i >> 1) & 1) as f64, ((i >> 2) & 1) as f64))
        .collect();
    #[rustfmt::skip]
    let cells = vec![
        1, 0, 3, 5,
        2, 0, 3, 6,
        4, 0, 5, 6,
        7, 3, 5, 6,
        0, 3, 5, 6,
    ];
    (nodes, cells)
}

/// The unit cube split into five tetrahedra, see [`unit_cube_5_tets_data`].
#[doc(hidden)]
pub fn unit_cube_5_tets() -> SimplicialMesh<3, 3> {
    let (nodes, cells) = unit_cube_5_tets_data();
    SimplicialMesh::new(nodes, cells)
}
