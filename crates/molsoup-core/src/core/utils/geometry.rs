use nalgebra::Vector3;

/// Vectors shorter than this are treated as degenerate.
pub const DEGENERATE_LENGTH: f32 = 1e-3;

pub fn try_normalize(v: &Vector3<f32>, min_length: f32) -> Option<Vector3<f32>> {
    let length = v.norm();
    (length.is_finite() && length > min_length).then(|| v / length)
}

/// Angle in radians between two bond vectors, or `None` if either is degenerate.
pub fn angle_between(a: &Vector3<f32>, b: &Vector3<f32>) -> Option<f32> {
    let a = try_normalize(a, DEGENERATE_LENGTH)?;
    let b = try_normalize(b, DEGENERATE_LENGTH)?;
    Some(a.dot(&b).clamp(-1.0, 1.0).acos())
}

pub fn clamp_norm(v: Vector3<f32>, max: f32) -> Vector3<f32> {
    let length = v.norm();
    if length > max && length > 0.0 {
        v * (max / length)
    } else {
        v
    }
}

/// Unit normals of the two half-planes of the torsion `a-b-c-d` and the cosine between
/// them, oriented so that a cosine of `-1` is anti-periplanar and `+1` is eclipsed.
/// `None` when the central bond or either normal is too short to define a plane.
pub fn torsion_normals(
    a: &Vector3<f32>,
    b: &Vector3<f32>,
    c: &Vector3<f32>,
    d: &Vector3<f32>,
    min_normal: f32,
) -> Option<(Vector3<f32>, Vector3<f32>, f32)> {
    let bc = c - b;
    if bc.norm() <= 0.1 {
        return None;
    }
    let n1 = try_normalize(&(b - a).cross(&bc), min_normal)?;
    let n2 = try_normalize(&bc.cross(&(d - c)), min_normal)?;
    Some((n1, n2, n1.dot(&n2).clamp(-1.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn f32_approx_equal(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn angle_between_orthogonal_and_opposite_vectors() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        let y = Vector3::new(0.0, 2.0, 0.0);
        assert!(f32_approx_equal(angle_between(&x, &y).unwrap(), FRAC_PI_2));
        assert!(f32_approx_equal(angle_between(&x, &-x).unwrap(), PI));
    }

    #[test]
    fn angle_between_rejects_zero_vectors() {
        assert!(angle_between(&Vector3::zeros(), &Vector3::x()).is_none());
    }

    #[test]
    fn clamp_norm_only_shrinks_long_vectors() {
        let long = clamp_norm(Vector3::new(30.0, 40.0, 0.0), 10.0);
        assert!(f32_approx_equal(long.norm(), 10.0));
        let short = clamp_norm(Vector3::new(3.0, 4.0, 0.0), 10.0);
        assert_eq!(short, Vector3::new(3.0, 4.0, 0.0));
    }

    #[test]
    fn torsion_of_planar_zigzag_is_anti_periplanar() {
        let a = Vector3::new(0.0, 1.0, 0.0);
        let b = Vector3::new(1.0, 0.0, 0.0);
        let c = Vector3::new(2.0, 0.0, 0.0);
        let d = Vector3::new(3.0, -1.0, 0.0);
        let (_, _, cos) = torsion_normals(&a, &b, &c, &d, 0.01).unwrap();
        assert!(f32_approx_equal(cos, -1.0));
    }

    #[test]
    fn torsion_of_u_shape_is_syn_periplanar() {
        let a = Vector3::new(0.0, 1.0, 0.0);
        let b = Vector3::new(1.0, 0.0, 0.0);
        let c = Vector3::new(2.0, 0.0, 0.0);
        let d = Vector3::new(3.0, 1.0, 0.0);
        let (_, _, cos) = torsion_normals(&a, &b, &c, &d, 0.01).unwrap();
        assert!(f32_approx_equal(cos, 1.0));
    }

    #[test]
    fn torsion_with_collinear_arm_is_degenerate() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(1.0, 0.0, 0.0);
        let c = Vector3::new(2.0, 0.0, 0.0);
        let d = Vector3::new(3.0, 1.0, 0.0);
        assert!(torsion_normals(&a, &b, &c, &d, 0.01).is_none());
    }
}
