// attitude_core/src/frames.rs

use nalgebra::{DMatrix, DVector, Quaternion, UnitQuaternion, Vector3};
use std::hash::Hash;

pub mod layout;
pub mod ned;
pub mod rotation;

use layout::{GYRO_BIAS_IDX, POSITION_IDX, QUATERNION_IDX, VELOCITY_IDX};

/// An enum that defines every variable that can exist in the filter state.
/// Navigation quantities are in NED, biases in the body frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVariable {
    // --- Position ---
    Pn,
    Pe,
    Pd,
    // --- Velocity ---
    Vn,
    Ve,
    Vd,
    // --- Orientation (quaternion, scalar first, body to NED) ---
    Q0,
    Q1,
    Q2,
    Q3,
    // --- Gyro Bias ---
    GyroBiasX,
    GyroBiasY,
    GyroBiasZ,
    // --- Accelerometer Bias ---
    AccelBiasX,
    AccelBiasY,
    AccelBiasZ,
}

/// The state object used by the filters. It bundles the state vector
/// with its schema (the layout), covariance, and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// The ordered "schema" of the state vector.
    pub layout: Vec<StateVariable>,
    /// The actual numerical data vector `x`.
    pub vector: DVector<f64>,
    /// The covariance matrix `P`.
    pub covariance: DMatrix<f64>,
    /// Filter time of the last prediction, in seconds.
    pub last_update_timestamp: f64,
}

impl FilterState {
    /// Creates a new state with a given layout, initializing the vector to zero
    /// (with a valid identity quaternion) and the covariance to a diagonal.
    pub fn new(layout: Vec<StateVariable>, covariance_diagonal: &[f64]) -> Self {
        let dim = layout.len();
        assert_eq!(dim, covariance_diagonal.len());
        let mut vector = DVector::zeros(dim);

        // A zero quaternion is not a rotation; start from identity.
        if let Some(i) = layout.iter().position(|v| *v == StateVariable::Q0) {
            vector[i] = 1.0;
        }

        Self {
            layout,
            vector,
            covariance: DMatrix::from_diagonal(&DVector::from_row_slice(covariance_diagonal)),
            last_update_timestamp: 0.0,
        }
    }

    /// Returns the dimension (number of rows) of the state vector.
    pub fn dim(&self) -> usize {
        self.layout.len()
    }

    /// Finds the index of a specific `StateVariable` in the layout.
    pub fn find_idx(&self, var: &StateVariable) -> Option<usize> {
        self.layout.iter().position(|v| v == var)
    }

    // --- Typed accessors for the standard INS layout ---

    pub fn position(&self) -> Vector3<f64> {
        self.vector.fixed_rows::<3>(POSITION_IDX).into_owned()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.vector.fixed_rows::<3>(VELOCITY_IDX).into_owned()
    }

    pub fn gyro_bias(&self) -> Vector3<f64> {
        self.vector.fixed_rows::<3>(GYRO_BIAS_IDX).into_owned()
    }

    /// Orientation as stored, without renormalizing.
    pub fn raw_quaternion(&self) -> Quaternion<f64> {
        let q = &self.vector;
        Quaternion::new(
            q[QUATERNION_IDX],
            q[QUATERNION_IDX + 1],
            q[QUATERNION_IDX + 2],
            q[QUATERNION_IDX + 3],
        )
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::new_normalize(self.raw_quaternion())
    }

    pub fn set_position(&mut self, position: &Vector3<f64>) {
        self.vector.fixed_rows_mut::<3>(POSITION_IDX).copy_from(position);
    }

    pub fn set_velocity(&mut self, velocity: &Vector3<f64>) {
        self.vector.fixed_rows_mut::<3>(VELOCITY_IDX).copy_from(velocity);
    }

    pub fn set_gyro_bias(&mut self, bias: &Vector3<f64>) {
        self.vector.fixed_rows_mut::<3>(GYRO_BIAS_IDX).copy_from(bias);
    }

    pub fn set_orientation(&mut self, q: &UnitQuaternion<f64>) {
        let q = q.quaternion();
        self.vector[QUATERNION_IDX] = q.w;
        self.vector[QUATERNION_IDX + 1] = q.i;
        self.vector[QUATERNION_IDX + 2] = q.j;
        self.vector[QUATERNION_IDX + 3] = q.k;
    }

    /// Re-projects the quaternion block onto the unit sphere. Additive
    /// prediction and correction steps drift it off slightly.
    /// Returns `false` if the block had collapsed and was reset to identity.
    pub fn normalize_quaternion(&mut self) -> bool {
        let (q, healed) = rotation::normalize_or_identity(self.raw_quaternion());
        self.set_orientation(&q);
        !healed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn standard() -> FilterState {
        FilterState::new(
            layout::standard_ins_state_layout(),
            &layout::INITIAL_COVARIANCE_DIAGONAL,
        )
    }

    #[test]
    fn new_state_starts_at_identity() {
        let state = standard();
        assert_eq!(state.orientation(), UnitQuaternion::identity());
        assert_eq!(state.position(), Vector3::zeros());
        assert_eq!(state.covariance[(0, 0)], 25.0);
        assert_eq!(state.covariance[(15, 15)], 1e-4);
        assert_eq!(state.covariance[(0, 1)], 0.0);
    }

    #[test]
    fn typed_setters_write_their_block() {
        let mut state = standard();
        state.set_velocity(&Vector3::new(1.0, 2.0, 3.0));
        state.set_gyro_bias(&Vector3::new(0.01, 0.02, 0.03));
        assert_eq!(state.vector[3], 1.0);
        assert_eq!(state.vector[5], 3.0);
        assert_eq!(state.vector[10], 0.01);
        assert_eq!(state.vector[12], 0.03);
        assert_eq!(state.find_idx(&StateVariable::GyroBiasZ), Some(12));
    }

    #[test]
    fn quaternion_block_renormalizes() {
        let mut state = standard();
        state.vector[QUATERNION_IDX] = 2.0;
        assert!(state.normalize_quaternion());
        assert_abs_diff_eq!(state.raw_quaternion().norm(), 1.0, epsilon = 1e-12);

        state.vector.fixed_rows_mut::<4>(QUATERNION_IDX).fill(0.0);
        assert!(!state.normalize_quaternion());
        assert_eq!(state.orientation(), UnitQuaternion::identity());
    }
}
