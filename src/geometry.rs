//! Geometric quantities of mesh entities.
//!
//! Topology and scheduling never look at coordinates;
//! this is a separate layer for kernels that need volumes or normals.
//! Volumes are computed lazily per dimension and kept for the lifetime of the [`Geometry`].

use std::sync::OnceLock;

use itertools::iproduct;
use nalgebra as na;

use crate::mesh::{Entity, EntityKind, SimplicialMesh};

/// Geometric queries over a mesh, with memoized volume tables.
///
/// The cache is filled on first use and can be shared between threads.
#[derive(Debug)]
pub struct Geometry<'a, const DIM: usize, const WORLD_DIM: usize> {
    mesh: &'a SimplicialMesh<DIM, WORLD_DIM>,
    volumes: Vec<OnceLock<Vec<f64>>>,
}

impl<'a, const DIM: usize, const WORLD_DIM: usize> Geometry<'a, DIM, WORLD_DIM> {
    /// Create geometry queries for a mesh. Nothing is computed yet.
    pub fn new(mesh: &'a SimplicialMesh<DIM, WORLD_DIM>) -> Self {
        Self {
            mesh,
            volumes: (0..=DIM).map(|_| OnceLock::new()).collect(),
        }
    }

    /// The mesh these queries are about.
    #[inline]
    pub fn mesh(&self) -> &'a SimplicialMesh<DIM, WORLD_DIM> {
        self.mesh
    }

    /// Get the unsigned volumes of all `D`-dimensional entities,
    /// indexed by global entity index.
    ///
    /// Nodes have a volume of 1.
    pub fn volumes<const D: usize>(&self) -> &[f64]
    where
        na::Const<DIM>: na::DimNameSub<na::Const<D>>,
    {
        self.volumes_dyn(D)
    }

    fn volumes_dyn(&self, dim: usize) -> &[f64] {
        self.volumes[dim].get_or_init(|| {
            log::trace!("computing volumes of {dim}-entities");
            let mut points = Vec::with_capacity(dim + 1);
            self.mesh
                .entities_dyn(dim, 0..self.mesh.num_entities_dyn(dim))
                .map(|e| {
                    points.clear();
                    points.extend(e.node_coords());
                    simplex_volume(&points)
                })
                .collect()
        })
    }

    /// Get the unsigned volume of an entity.
    #[inline]
    pub fn volume(&self, entity: Entity<'_, DIM, WORLD_DIM>) -> f64 {
        debug_assert!(std::ptr::eq(entity.mesh(), self.mesh));
        self.volumes_dyn(entity.dim())[entity.index()]
    }

    /// Get the barycenter of an entity.
    pub fn barycenter(&self, entity: Entity<'_, DIM, WORLD_DIM>) -> na::SVector<f64, WORLD_DIM> {
        let sum: na::SVector<f64, WORLD_DIM> = entity.node_coords().sum();
        sum / entity.nodes().len() as f64
    }

    /// Get the axis-aligned bounding box of all nodes in the mesh
    /// as a pair `(min, max)`, or None if the mesh has no nodes.
    pub fn bounds(
        &self,
    ) -> Option<(na::SVector<f64, WORLD_DIM>, na::SVector<f64, WORLD_DIM>)> {
        let (first, rest) = self.mesh.nodes().split_first()?;
        Some(rest.iter().fold((*first, *first), |(min, max), n| {
            (min.inf(n), max.sup(n))
        }))
    }

    /// Get the outward unit normal of a face reached through the cell it bounds,
    /// i.e. a `DIM - 1`-dimensional entity yielded by [`Entity::sub_entities`] on a cell.
    ///
    /// Returns None for any other entity,
    /// as the direction of a face's normal depends on which cell it's seen from.
    /// Also returns None if the cell is degenerate.
    pub fn outward_normal(
        &self,
        face: Entity<'_, DIM, WORLD_DIM>,
    ) -> Option<na::SVector<f64, WORLD_DIM>> {
        if face.kind() != EntityKind::CellSubEntity || face.dim() + 1 != DIM {
            return None;
        }
        let cell = self.mesh.cell(face.containing_cell()?);
        let cell_nodes = cell.nodes();
        let opposite = cell_nodes
            .iter()
            .position(|n| !face.nodes().contains(n))?;

        // barycentric coordinate gradients: with J the matrix of edge vectors
        // from node 0 to the others, grad(l_k) for k >= 1 is column k - 1 of J (J^T J)^-1
        // and grad(l_0) is minus the sum of the others
        let coords = self.mesh.nodes();
        let origin = coords[cell_nodes[0]];
        let jacobian = na::DMatrix::from_fn(WORLD_DIM, DIM, |row, col| {
            coords[cell_nodes[col + 1]][row] - origin[row]
        });
        let gram = jacobian.transpose() * &jacobian;
        let grads = jacobian * gram.try_inverse()?;

        let grad: na::DVector<f64> = if opposite == 0 {
            -grads.column_sum()
        } else {
            grads.column(opposite - 1).into_owned()
        };
        let normal = -na::SVector::<f64, WORLD_DIM>::from_iterator(grad.iter().copied());
        normal.try_normalize(f64::EPSILON)
    }
}

/// Compute the unsigned volume of the simplex spanned by the given points.
///
/// vol = sqrt(det(V^T V)) / p!
/// where V has the edge vectors from the first point as columns
/// (see the PyDEC paper section 10.1).
pub fn simplex_volume<const WORLD_DIM: usize>(points: &[na::SVector<f64, WORLD_DIM>]) -> f64 {
    let edge_count = points.len().saturating_sub(1);
    match edge_count {
        0 => 1.0,
        1 => (points[1] - points[0]).magnitude(),
        _ => {
            let edges: Vec<na::SVector<f64, WORLD_DIM>> =
                points[1..].iter().map(|p| p - points[0]).collect();
            let mut det_mat = na::DMatrix::zeros(edge_count, edge_count);
            for (row, col) in iproduct!(0..edge_count, 0..edge_count) {
                det_mat[(row, col)] = edges[row].dot(&edges[col]);
            }
            let edge_count_factorial: usize = (1..=edge_count).product();
            // roundoff can make the determinant of a flat simplex slightly negative
            f64::sqrt(det_mat.determinant().max(0.0)) / edge_count_factorial as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{tiny_mesh_2d, unit_cube_5_tets};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn volumes() {
        let mesh = tiny_mesh_2d();
        let geom = Geometry::new(&mesh);
        for &area in geom.volumes::<2>() {
            assert_relative_eq!(area, 0.5, epsilon = 1e-12);
        }
        assert_relative_eq!(geom.volume(mesh.entity::<1>(0)), 1.0, epsilon = 1e-12);
        assert!(geom.volumes::<0>().iter().all(|&v| v == 1.0));

        let mesh = unit_cube_5_tets();
        let geom = Geometry::new(&mesh);
        let vols = geom.volumes::<3>();
        for &corner in &vols[..4] {
            assert_relative_eq!(corner, 1.0 / 6.0, epsilon = 1e-12);
        }
        assert_relative_eq!(vols[4], 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(vols.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

        // boundary faces tile the cube's surface
        let surface: f64 = mesh
            .entities_in_subset(&mesh.boundary::<2>())
            .map(|f| geom.volume(f))
            .sum();
        assert_relative_eq!(surface, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn barycenters_and_bounds() {
        let mesh = unit_cube_5_tets();
        let geom = Geometry::new(&mesh);
        let (min, max) = geom.bounds().unwrap();
        assert_eq!(min, na::Vector3::zeros());
        assert_eq!(max, na::Vector3::repeat(1.0));

        let middle = geom.barycenter(mesh.cell(4));
        assert_relative_eq!(middle, na::Vector3::repeat(0.5));
    }

    #[test]
    fn outward_normals() {
        let mesh = unit_cube_5_tets();
        let geom = Geometry::new(&mesh);
        let center = na::Vector3::repeat(0.5);
        for cell in mesh.entities::<3>() {
            let cell_center = geom.barycenter(cell);
            for face in cell.sub_entities(2) {
                let normal = geom.outward_normal(face).unwrap();
                assert_relative_eq!(normal.magnitude(), 1.0, epsilon = 1e-12);
                let face_center = geom.barycenter(face);
                assert!(normal.dot(&(face_center - cell_center)) > 0.0);
                for edge in face.sub_entities(1) {
                    let nodes = edge.nodes();
                    let dir = mesh.nodes()[nodes[1]] - mesh.nodes()[nodes[0]];
                    assert_abs_diff_eq!(normal.dot(&dir), 0.0, epsilon = 1e-12);
                }
                if face.is_boundary() {
                    // cube faces are axis-aligned
                    assert_relative_eq!(normal.abs().max(), 1.0, epsilon = 1e-12);
                    assert!(normal.dot(&(face_center - center)) > 0.0);
                }
            }
        }

        // normals are only defined for faces seen from a cell
        assert_eq!(geom.outward_normal(mesh.entity::<2>(0)), None);
        assert_eq!(geom.outward_normal(mesh.cell(0)), None);
        let edge = mesh.cell(0).sub_entities(1).next().unwrap();
        assert_eq!(geom.outward_normal(edge), None);
    }

    #[test]
    fn normals_in_2d() {
        let mesh = tiny_mesh_2d();
        let geom = Geometry::new(&mesh);
        // the top edge of the second triangle faces up
        let top = mesh
            .cell(1)
            .sub_entities(1)
            .find(|e| e.nodes() == [0, 1])
            .unwrap();
        assert_relative_eq!(
            geom.outward_normal(top).unwrap(),
            na::Vector2::new(0.0, 1.0),
            epsilon = 1e-12
        );
    }
}
