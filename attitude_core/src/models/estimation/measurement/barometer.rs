// attitude_core/src/models/estimation/measurement/barometer.rs

use crate::frames::{FilterState, StateVariable};
use crate::models::estimation::measurement::Measurement;
use nalgebra::{DMatrix, DVector};

/// Barometric altitude, `h(x) = -pd`.
#[derive(Debug, Clone)]
pub struct BarometerModel {
    pub r_matrix: DMatrix<f64>,
}

impl BarometerModel {
    pub fn new(variance: f64) -> Self {
        Self {
            r_matrix: DMatrix::from_element(1, 1, variance),
        }
    }
}

impl Measurement for BarometerModel {
    fn dim(&self) -> usize {
        1
    }

    fn get_r(&self) -> &DMatrix<f64> {
        &self.r_matrix
    }

    fn predict_measurement(&self, filter_state: &FilterState) -> DVector<f64> {
        DVector::from_element(1, -filter_state.position().z)
    }

    fn calculate_jacobian(&self, filter_state: &FilterState) -> DMatrix<f64> {
        let mut h_jac = DMatrix::zeros(1, filter_state.dim());
        if let Some(idx) = filter_state.find_idx(&StateVariable::Pd) {
            h_jac[(0, idx)] = -1.0;
        }
        h_jac
    }
}
