// attitude_core/src/models/estimation/dynamics/integrated_imu.rs

use crate::frames::layout::{
    ACCEL_BIAS_IDX, GYRO_BIAS_IDX, QUATERNION_IDX, STANDARD_INS_STATE_DIM, VELOCITY_IDX,
};
use crate::models::estimation::dynamics::EstimationDynamics;
use crate::types::{Control, State};
use nalgebra::{DVector, Quaternion, UnitQuaternion, Vector3};

/// Standard gravity, m/s².
pub const GRAVITY: f64 = 9.81;

/// A dynamics model that integrates raw IMU measurements (as control inputs)
/// to propagate the 16-state INS vector in the NED frame.
///
/// The control input `u` is `[ax, ay, az, wx, wy, wz]`: body specific force
/// in m/s² and body rate in rad/s, both uncorrected. The bias states are
/// subtracted here. Biases are modeled as constant; their drift is covered by
/// process noise.
#[derive(Debug, Clone)]
pub struct IntegratedImuModel {
    /// Gravity along NED down.
    pub gravity_magnitude: f64,
}

impl Default for IntegratedImuModel {
    fn default() -> Self {
        Self {
            gravity_magnitude: GRAVITY,
        }
    }
}

impl IntegratedImuModel {
    /// Packs one accelerometer and one gyro reading into a control vector.
    pub fn control(accel: &Vector3<f64>, gyro: &Vector3<f64>) -> Control {
        DVector::from_row_slice(&[accel.x, accel.y, accel.z, gyro.x, gyro.y, gyro.z])
    }
}

impl EstimationDynamics for IntegratedImuModel {
    fn get_control_dim(&self) -> usize {
        6
    }

    fn get_derivatives(&self, x: &State, u: &Control, _t: f64) -> State {
        let mut x_dot = DVector::zeros(STANDARD_INS_STATE_DIM);

        // --- 1. Extract state variables and inputs ---
        let velocity_ned = x.fixed_rows::<3>(VELOCITY_IDX);
        let q_raw = Quaternion::new(
            x[QUATERNION_IDX],
            x[QUATERNION_IDX + 1],
            x[QUATERNION_IDX + 2],
            x[QUATERNION_IDX + 3],
        );
        let gyro_bias = x.fixed_rows::<3>(GYRO_BIAS_IDX);
        let accel_bias = x.fixed_rows::<3>(ACCEL_BIAS_IDX);

        let corrected_accel_body = u.fixed_rows::<3>(0) - accel_bias;
        let corrected_gyro_body = u.fixed_rows::<3>(3) - gyro_bias;

        // --- 2. Position and velocity ---
        x_dot.fixed_rows_mut::<3>(0).copy_from(&velocity_ned);
        let rotation = UnitQuaternion::new_normalize(q_raw);
        let accel_ned = rotation * corrected_accel_body;
        let gravity_ned = Vector3::new(0.0, 0.0, self.gravity_magnitude);
        x_dot
            .fixed_rows_mut::<3>(VELOCITY_IDX)
            .copy_from(&(accel_ned + gravity_ned));

        // --- 3. Orientation: q_dot = ½ q ⊗ (0, ω) ---
        // Uses the raw block so the Jacobian sees the true kinematics.
        let omega = Quaternion::from_imag(corrected_gyro_body);
        let q_dot = (q_raw * omega) * 0.5;
        x_dot[QUATERNION_IDX] = q_dot.w;
        x_dot[QUATERNION_IDX + 1] = q_dot.i;
        x_dot[QUATERNION_IDX + 2] = q_dot.j;
        x_dot[QUATERNION_IDX + 3] = q_dot.k;

        x_dot
    }
}
