use nalgebra::{Matrix3, Point3, Unit, Vector3};
use std::f64::consts::PI;

/// A rigid placement operator mapping a local frame onto Cartesian space.
///
/// A point `p` in local coordinates is placed at `rotation * p + origin`. The columns of
/// `rotation` are the local x, y and z axes expressed in the global frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub rotation: Matrix3<f64>,
    pub origin: Point3<f64>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::identity()
    }
}

impl Frame {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            origin: Point3::origin(),
        }
    }

    /// Builds the frame whose origin is `a`, whose x axis points to `b` and whose xy-plane
    /// contains `c` (with `c` on the positive y side).
    pub fn from_three_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let x = Unit::try_new(b - a, 1e-8)?;
        let z = Unit::try_new(x.cross(&(c - a)), 1e-8)?;
        let y = z.cross(&x);
        Some(Self {
            rotation: Matrix3::from_columns(&[x.into_inner(), y, z.into_inner()]),
            origin: *a,
        })
    }

    /// Backbone frame centred on CA with x along the N-CA-C bisector.
    pub fn bisect(n: &Point3<f64>, ca: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let ca_n = Unit::try_new(n - ca, 1e-8)?;
        let ca_c = Unit::try_new(c - ca, 1e-8)?;
        let x = Unit::try_new(ca_n.into_inner() + ca_c.into_inner(), 1e-8)?;
        let z = Unit::try_new(ca_n.cross(&ca_c), 1e-8)?;
        let y = z.cross(&x);
        Some(Self {
            rotation: Matrix3::from_columns(&[x.into_inner(), y, z.into_inner()]),
            origin: *ca,
        })
    }

    /// Backbone frame centred on CA with x along CA->C and N in the xy-plane.
    pub fn backbone(n: &Point3<f64>, ca: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        Self::from_three_points(ca, c, n)
    }

    #[inline]
    pub fn to_global(&self, local: &Point3<f64>) -> Point3<f64> {
        self.origin + self.rotation * local.coords
    }

    #[inline]
    pub fn to_local(&self, global: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.transpose() * (global - self.origin))
    }

    /// Returns the operator equal to applying `self` and then `outer`.
    pub fn then(&self, outer: &Frame) -> Frame {
        Frame {
            rotation: outer.rotation * self.rotation,
            origin: outer.to_global(&self.origin),
        }
    }

    /// Rigid transform that moves everything expressed relative to `from` onto `to`.
    pub fn superposition(from: &Frame, to: &Frame) -> Frame {
        let rotation = to.rotation * from.rotation.transpose();
        Frame {
            rotation,
            origin: to.origin - rotation * from.origin.coords,
        }
    }
}

/// Places an atom from its three reference atoms using the natural extension reference frame.
///
/// `l`, `k` and `j` are the dihedral, angle and bond reference atoms; `bond`, `angle` and
/// `dihedral` are the internal coordinates of the new atom (angles in radians).
#[inline]
pub fn nerf_place(
    l: &Point3<f64>,
    k: &Point3<f64>,
    j: &Point3<f64>,
    bond: f64,
    angle: f64,
    dihedral: f64,
) -> Point3<f64> {
    let bc = (j - k).normalize();
    let n = (k - l).cross(&bc).normalize();
    let m = n.cross(&bc);
    let d2 = Vector3::new(
        -bond * angle.cos(),
        bond * angle.sin() * dihedral.cos(),
        bond * angle.sin() * dihedral.sin(),
    );
    j + bc * d2.x + m * d2.y + n * d2.z
}

/// Places the third seed atom of a segment in the local xy-plane.
#[inline]
pub fn seed_place(j: &Point3<f64>, k: &Point3<f64>, bond: f64, angle: f64) -> Point3<f64> {
    let u = (j - k).normalize();
    j + (-angle.cos() * u + angle.sin() * Vector3::y()) * bond
}

pub fn distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (a - b).norm()
}

/// Bond angle at `b` in radians.
pub fn angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let v1 = a - b;
    let v2 = c - b;
    let cos = v1.dot(&v2) / (v1.norm() * v2.norm());
    cos.clamp(-1.0, 1.0).acos()
}

/// Signed dihedral angle about the `b`-`c` bond in radians, in (-pi, pi].
pub fn dihedral(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    let b0 = a - b;
    let b1 = (c - b).normalize();
    let b2 = d - c;

    let v = b0 - b1 * b0.dot(&b1);
    let w = b2 - b1 * b2.dot(&b1);

    let x = v.dot(&w);
    let y = b1.cross(&v).dot(&w);
    y.atan2(x)
}

/// Wraps an angle into [-pi, pi).
#[inline]
pub fn wrap_angle(theta: f64) -> f64 {
    (theta + PI).rem_euclid(2.0 * PI) - PI
}

pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / points.len() as f64))
}

/// Weighted mean position. `None` when the inputs are empty, differ in length or the
/// weights do not sum to a positive value.
pub fn weighted_centroid(points: &[Point3<f64>], weights: &[f64]) -> Option<Point3<f64>> {
    if points.is_empty() || points.len() != weights.len() {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    let sum = points
        .iter()
        .zip(weights)
        .fold(Vector3::zeros(), |acc, (p, w)| acc + p.coords * *w);
    Some(Point3::from(sum / total))
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-4;

    fn assert_point_approx(actual: &Point3<f64>, expected: &Point3<f64>) {
        assert!(
            (actual - expected).norm() < TOLERANCE,
            "expected {:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn nerf_places_trans_atom_at_known_position() {
        let theta = 109.5f64.to_radians();
        let p0 = Point3::origin();
        let p1 = Point3::new(1.5, 0.0, 0.0);
        let p2 = seed_place(&p1, &p0, 1.5, theta);
        assert_point_approx(&p2, &Point3::new(2.00071, 1.41396, 0.0));

        let p3 = nerf_place(&p0, &p1, &p2, 1.5, theta, PI);
        assert_point_approx(&p3, &Point3::new(3.50071, 1.41396, 0.0));
    }

    #[test]
    fn nerf_reproduces_requested_internal_coordinates() {
        let l = Point3::new(0.3, -1.2, 0.4);
        let k = Point3::new(1.1, 0.2, -0.3);
        let j = Point3::new(2.4, 0.1, 0.5);
        let target = -62.0f64.to_radians();

        let p = nerf_place(&l, &k, &j, 1.53, 1.95, target);

        assert!((distance(&j, &p) - 1.53).abs() < 1e-9);
        assert!((angle(&k, &j, &p) - 1.95).abs() < 1e-9);
        assert!((dihedral(&l, &k, &j, &p) - target).abs() < 1e-9);
    }

    #[test]
    fn dihedral_of_planar_cis_and_trans_arrangements() {
        let a = Point3::new(1.0, 1.0, 0.0);
        let b = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(1.0, 0.0, 0.0);
        let cis = Point3::new(0.0, 1.0, 0.0);
        let trans = Point3::new(2.0, -1.0, 0.0);

        assert!(dihedral(&a, &b, &c, &cis).abs() < 1e-9);
        assert!((dihedral(&a, &b, &c, &trans).abs() - PI).abs() < 1e-9);
    }

    #[test]
    fn wrap_angle_maps_into_half_open_interval() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(0.25) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn frame_round_trips_between_local_and_global() {
        let frame = Frame::from_three_points(
            &Point3::new(1.0, 2.0, 3.0),
            &Point3::new(2.0, 2.5, 3.0),
            &Point3::new(0.5, 3.0, 4.0),
        )
        .unwrap();
        let p = Point3::new(-0.7, 4.2, 1.9);
        assert_point_approx(&frame.to_global(&frame.to_local(&p)), &p);
        assert!((frame.rotation.determinant() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn superposition_maps_source_frame_onto_target_frame() {
        let source = Frame::bisect(
            &Point3::new(-1.0, 1.2, 0.0),
            &Point3::origin(),
            &Point3::new(-1.2, -0.9, 0.0),
        )
        .unwrap();
        let target = Frame::bisect(
            &Point3::new(4.0, 6.0, 1.0),
            &Point3::new(5.0, 5.0, 1.5),
            &Point3::new(4.1, 4.0, 2.0),
        )
        .unwrap();
        let op = Frame::superposition(&source, &target);
        let moved = op.then(&Frame::identity()).to_global(&source.origin);
        assert_point_approx(&moved, &target.origin);

        let point = source.to_global(&Point3::new(0.3, 0.2, -0.5));
        assert_point_approx(
            &op.to_global(&point),
            &target.to_global(&Point3::new(0.3, 0.2, -0.5)),
        );
    }

    #[test]
    fn degenerate_frame_is_rejected() {
        let p = Point3::new(1.0, 1.0, 1.0);
        assert!(Frame::from_three_points(&p, &p, &Point3::origin()).is_none());
    }

    #[test]
    fn weighted_centroid_follows_weights() {
        let points = [Point3::origin(), Point3::new(4.0, 0.0, 0.0)];
        let center = weighted_centroid(&points, &[3.0, 1.0]).unwrap();
        assert!((center - Point3::new(1.0, 0.0, 0.0)).norm() < TOLERANCE);
        assert!(weighted_centroid(&points, &[0.0, 0.0]).is_none());
        assert!(weighted_centroid(&points, &[1.0]).is_none());
    }
}
