// attitude_core/src/models/estimation/measurement/gps.rs

use crate::frames::{FilterState, StateVariable};
use crate::models::estimation::measurement::Measurement;
use nalgebra::{DMatrix, DVector};

/// Direct observation of NED north/east position and velocity.
///
/// Serves both the GPS fix and the synthetic indoor anchor; only `R` differs.
#[derive(Debug, Clone)]
pub struct HorizontalModel {
    pub noise_covariance: DMatrix<f64>,
}

impl HorizontalModel {
    pub fn new(position_var: f64, velocity_var: f64) -> Self {
        Self {
            noise_covariance: DMatrix::from_diagonal(&DVector::from_row_slice(&[
                position_var,
                position_var,
                velocity_var,
                velocity_var,
            ])),
        }
    }

    /// Order of the measurement rows.
    pub fn get_measurement_layout(&self) -> [StateVariable; 4] {
        [
            StateVariable::Pn,
            StateVariable::Pe,
            StateVariable::Vn,
            StateVariable::Ve,
        ]
    }
}

impl Measurement for HorizontalModel {
    fn dim(&self) -> usize {
        4
    }

    fn get_r(&self) -> &DMatrix<f64> {
        &self.noise_covariance
    }

    fn predict_measurement(&self, filter_state: &FilterState) -> DVector<f64> {
        let p = filter_state.position();
        let v = filter_state.velocity();
        DVector::from_row_slice(&[p.x, p.y, v.x, v.y])
    }

    fn calculate_jacobian(&self, filter_state: &FilterState) -> DMatrix<f64> {
        let mut h_jac = DMatrix::zeros(4, filter_state.dim());
        for (row, var) in self.get_measurement_layout().iter().enumerate() {
            if let Some(idx) = filter_state.find_idx(var) {
                h_jac[(row, idx)] = 1.0;
            }
        }
        h_jac
    }
}
