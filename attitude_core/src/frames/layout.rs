// attitude_core/src/frames/layout.rs
use crate::frames::StateVariable;

/// The standard dimension of the 16-state INS state vector.
pub const STANDARD_INS_STATE_DIM: usize = 16;

/// Start of each block inside the standard layout.
pub const POSITION_IDX: usize = 0;
pub const VELOCITY_IDX: usize = 3;
pub const QUATERNION_IDX: usize = 6;
pub const GYRO_BIAS_IDX: usize = 10;
pub const ACCEL_BIAS_IDX: usize = 13;

/// Returns the standard 16-dimensional state vector layout used by the fusion
/// estimator.
///
/// The state is composed of:
/// - Position (3) in NED
/// - Velocity (3) in NED
/// - Orientation (4, quaternion, scalar first) from body to NED
/// - Gyroscope Bias (3) in body frame
/// - Accelerometer Bias (3) in body frame
pub fn standard_ins_state_layout() -> Vec<StateVariable> {
    vec![
        // --- Position (NED) --- indices 0-2
        StateVariable::Pn,
        StateVariable::Pe,
        StateVariable::Pd,
        // --- Velocity (NED) --- indices 3-5
        StateVariable::Vn,
        StateVariable::Ve,
        StateVariable::Vd,
        // --- Orientation (Quaternion, body to NED) --- indices 6-9
        StateVariable::Q0,
        StateVariable::Q1,
        StateVariable::Q2,
        StateVariable::Q3,
        // --- Gyroscope Bias (Body Frame) --- indices 10-12
        StateVariable::GyroBiasX,
        StateVariable::GyroBiasY,
        StateVariable::GyroBiasZ,
        // --- Accelerometer Bias (Body Frame) --- indices 13-15
        StateVariable::AccelBiasX,
        StateVariable::AccelBiasY,
        StateVariable::AccelBiasZ,
    ]
}

/// Initial covariance diagonal applied when the fusion estimator (re)starts.
pub const INITIAL_COVARIANCE_DIAGONAL: [f64; STANDARD_INS_STATE_DIM] = [
    25.0, 25.0, 25.0, // position, m²
    5.0, 5.0, 5.0, // velocity, (m/s)²
    1e-5, 1e-5, 1e-5, 1e-5, // quaternion
    1e-5, 1e-5, 1e-5, // gyro bias, (rad/s)²
    1e-4, 1e-4, 1e-4, // accel bias, (m/s²)²
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_offsets_match_layout() {
        let layout = standard_ins_state_layout();
        assert_eq!(layout.len(), STANDARD_INS_STATE_DIM);
        assert_eq!(layout[POSITION_IDX], StateVariable::Pn);
        assert_eq!(layout[VELOCITY_IDX], StateVariable::Vn);
        assert_eq!(layout[QUATERNION_IDX], StateVariable::Q0);
        assert_eq!(layout[GYRO_BIAS_IDX], StateVariable::GyroBiasX);
        assert_eq!(layout[ACCEL_BIAS_IDX], StateVariable::AccelBiasX);
    }
}
