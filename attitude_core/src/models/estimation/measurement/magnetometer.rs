// attitude_core/src/models/estimation/measurement/magnetometer.rs

use crate::frames::FilterState;
use crate::models::estimation::measurement::Measurement;
use nalgebra::{DMatrix, DVector, Vector3};

/// Direction of the Earth field as seen in the body frame.
///
/// Both the measurement and the prediction are unit vectors, so only the
/// attitude is observed, not the field strength.
#[derive(Debug, Clone)]
pub struct MagnetometerModel {
    /// The 3x3 measurement noise covariance matrix, R.
    pub r_matrix: DMatrix<f64>,
    /// Unit Earth field in NED.
    pub field_ned: Vector3<f64>,
}

impl MagnetometerModel {
    pub fn new(field_ned: &Vector3<f64>, variance: &Vector3<f64>) -> Self {
        Self {
            r_matrix: DMatrix::from_diagonal(&DVector::from_row_slice(variance.as_slice())),
            field_ned: field_ned.try_normalize(1e-9).unwrap_or_else(Vector3::zeros),
        }
    }

    /// Normalizes a raw reading; `None` if it carries no direction.
    pub fn measurement(field: &Vector3<f64>) -> Option<DVector<f64>> {
        field
            .try_normalize(1e-9)
            .map(|unit| DVector::from_row_slice(unit.as_slice()))
    }
}

impl Measurement for MagnetometerModel {
    fn dim(&self) -> usize {
        3
    }

    fn get_r(&self) -> &DMatrix<f64> {
        &self.r_matrix
    }

    fn predict_measurement(&self, filter_state: &FilterState) -> DVector<f64> {
        let predicted_body = filter_state.orientation().inverse() * self.field_ned;
        DVector::from_row_slice(predicted_body.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::layout::{INITIAL_COVARIANCE_DIAGONAL, QUATERNION_IDX, standard_ins_state_layout};
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn yawed_vehicle_sees_field_rotated_back() {
        let mut state = FilterState::new(standard_ins_state_layout(), &INITIAL_COVARIANCE_DIAGONAL);
        state.set_orientation(&UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2));
        let model = MagnetometerModel::new(&Vector3::new(200.0, 0.0, 400.0), &Vector3::repeat(5e-3));

        let z = model.predict_measurement(&state);
        let expected = Vector3::new(0.0, -200.0, 400.0).normalize();
        assert_abs_diff_eq!(z[0], expected.x, epsilon = 1e-12);
        assert_abs_diff_eq!(z[1], expected.y, epsilon = 1e-12);
        assert_abs_diff_eq!(z[2], expected.z, epsilon = 1e-12);
    }

    #[test]
    fn jacobian_only_touches_the_quaternion() {
        let state = FilterState::new(standard_ins_state_layout(), &INITIAL_COVARIANCE_DIAGONAL);
        let model = MagnetometerModel::new(&Vector3::new(1.0, 0.0, 0.0), &Vector3::repeat(5e-3));
        let h = model.calculate_jacobian(&state);
        assert_eq!(h.shape(), (3, 16));
        for j in (0..16).filter(|j| !(QUATERNION_IDX..QUATERNION_IDX + 4).contains(j)) {
            assert_eq!(h.column(j).norm(), 0.0);
        }
        assert!(h.columns(QUATERNION_IDX, 4).norm() > 0.1);
    }

    #[test]
    fn zero_reading_has_no_direction() {
        assert!(MagnetometerModel::measurement(&Vector3::zeros()).is_none());
    }
}
