// attitude_core/src/frames/rotation.rs

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Below this norm a quaternion is considered to have collapsed numerically.
pub const MIN_QUATERNION_NORM: f64 = 1.0e-3;

/// Roll, pitch, yaw (ZYX convention) of a body-to-NED rotation, in degrees.
pub fn rpy_degrees(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (roll, pitch, yaw) = q.euler_angles();
    Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
}

/// Inverse of [`rpy_degrees`].
pub fn quaternion_from_rpy_degrees(rpy: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(rpy.x.to_radians(), rpy.y.to_radians(), rpy.z.to_radians())
}

/// Flips the sign of all four components if the scalar part is negative.
/// `q` and `-q` are the same rotation; this keeps the published one unique.
pub fn canonicalize(q: Quaternion<f64>) -> Quaternion<f64> {
    if q.w < 0.0 {
        -q
    } else {
        q
    }
}

/// Normalizes `q`, or falls back to identity when the norm has collapsed or
/// is not finite. The flag reports whether the fallback was taken.
pub fn normalize_or_identity(q: Quaternion<f64>) -> (UnitQuaternion<f64>, bool) {
    let norm = q.norm();
    if !norm.is_finite() || norm < MIN_QUATERNION_NORM {
        return (UnitQuaternion::identity(), true);
    }
    (UnitQuaternion::new_unchecked(q / norm), false)
}

/// First-order quaternion kinematics: `q + ½ · q ⊗ (0, ω) · dt`.
/// The result is not renormalized.
pub fn integrate_body_rate(q: &Quaternion<f64>, rate: &Vector3<f64>, dt: f64) -> Quaternion<f64> {
    let omega = Quaternion::from_imag(*rate);
    let q_dot = (q * omega) * 0.5;
    q + q_dot * dt
}
