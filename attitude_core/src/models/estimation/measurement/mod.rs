// attitude_core/src/models/estimation/measurement/mod.rs

use crate::frames::layout::QUATERNION_IDX;
use crate::frames::FilterState;
use dyn_clone::DynClone;
use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;

/// Perturbation used for finite-difference measurement Jacobians.
pub const JACOBIAN_EPSILON: f64 = 1e-8;

/// Identifies which measurement model a correction row block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementSource {
    Magnetometer,
    Barometer,
    /// GPS horizontal position and velocity.
    Gps,
    /// Synthetic zero horizontal position/velocity used without GPS.
    IndoorAnchor,
}

// --- MEASUREMENT MODEL TRAIT ---
// Represents the mathematical model of a sensor. `z = h(x) + v`
pub trait Measurement: DynClone + Debug + Send + Sync {
    /// Number of rows in the measurement vector `z`.
    fn dim(&self) -> usize;

    /// Returns the measurement noise covariance matrix `R`.
    fn get_r(&self) -> &DMatrix<f64>;

    /// Predicts the ideal measurement `z_pred = h(x)` from the filter's state.
    fn predict_measurement(&self, filter_state: &FilterState) -> DVector<f64>;

    /// Calculates the measurement Jacobian `H = ∂h/∂x`.
    ///
    /// The default is a forward difference. Perturbations of the quaternion
    /// block are renormalized so `h` is only evaluated on valid rotations.
    fn calculate_jacobian(&self, filter_state: &FilterState) -> DMatrix<f64> {
        let state_dim = filter_state.dim();
        let mut h_jac = DMatrix::zeros(self.dim(), state_dim);
        let z_base = self.predict_measurement(filter_state);

        for j in 0..state_dim {
            let mut perturbed_state = filter_state.clone();
            perturbed_state.vector[j] += JACOBIAN_EPSILON;

            if (QUATERNION_IDX..QUATERNION_IDX + 4).contains(&j) {
                let mut quat_part = perturbed_state.vector.fixed_rows_mut::<4>(QUATERNION_IDX);
                let norm = quat_part.norm();
                if norm > 1e-9 {
                    quat_part /= norm;
                }
            }

            let z_perturbed = self.predict_measurement(&perturbed_state);
            let derivative_column = (z_perturbed - &z_base) / JACOBIAN_EPSILON;
            h_jac.column_mut(j).copy_from(&derivative_column);
        }

        h_jac
    }
}

// This macro automatically generates the implementation of `Clone` for `Box<dyn Measurement>`.
dyn_clone::clone_trait_object!(Measurement);

pub mod barometer;
pub mod gps;
pub mod magnetometer;
