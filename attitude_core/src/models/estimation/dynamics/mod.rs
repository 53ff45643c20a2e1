// attitude_core/src/models/estimation/dynamics/mod.rs

use crate::types::{Control, State};
use crate::utils::integrators::Integrator;
use nalgebra::DMatrix;
use std::fmt::Debug;
use tracing::warn;

/// Perturbation used for finite-difference Jacobians.
pub const JACOBIAN_EPSILON: f64 = 1e-7;

/// A trait for dynamics models used within state estimators.
///
/// This model's primary responsibilities are to propagate a state vector forward
/// in time (`get_derivatives`) and to provide the Jacobians needed to
/// linearize the system for covariance propagation.
pub trait EstimationDynamics: Debug + Send + Sync {
    /// Returns the number of dimensions in the control input vector `u`.
    fn get_control_dim(&self) -> usize;

    /// Computes the time derivative of the state vector: `x_dot = f(x, u, t)`.
    fn get_derivatives(&self, x: &State, u: &Control, t: f64) -> State;

    /// Jacobians `A = ∂f/∂x` and `B = ∂f/∂u` at `(x, u, t)`.
    ///
    /// The default implementation uses forward finite differences. Models with
    /// a cheap analytic form should override it.
    fn calculate_jacobian(&self, x: &State, u: &Control, t: f64) -> (DMatrix<f64>, DMatrix<f64>) {
        let state_dim = x.nrows();
        let control_dim = u.nrows();
        let mut a_jac = DMatrix::zeros(state_dim, state_dim);
        let mut b_jac = DMatrix::zeros(state_dim, control_dim);

        let x_dot_base = self.get_derivatives(x, u, t);

        for j in 0..state_dim {
            let mut x_perturbed = x.clone();
            x_perturbed[j] += JACOBIAN_EPSILON;
            let column = (self.get_derivatives(&x_perturbed, u, t) - &x_dot_base) / JACOBIAN_EPSILON;
            a_jac.column_mut(j).copy_from(&column);
        }

        for j in 0..control_dim {
            let mut u_perturbed = u.clone();
            u_perturbed[j] += JACOBIAN_EPSILON;
            let column = (self.get_derivatives(x, &u_perturbed, t) - &x_dot_base) / JACOBIAN_EPSILON;
            b_jac.column_mut(j).copy_from(&column);
        }

        (a_jac, b_jac)
    }

    /// Propagates the state forward by `dt` with `u` held constant.
    ///
    /// A control vector of the wrong size is replaced by zeros rather than
    /// allowed to panic inside the derivative function.
    fn propagate(
        &self,
        x: &State,
        u: &Control,
        t: f64,
        dt: f64,
        integrator: &dyn Integrator<f64>,
    ) -> State {
        if dt <= 0.0 {
            return x.clone();
        }

        let zeros;
        let u_actual = if u.nrows() == self.get_control_dim() {
            u
        } else {
            warn!(
                expected = self.get_control_dim(),
                got = u.nrows(),
                "control dimension mismatch, propagating with zero input"
            );
            zeros = Control::zeros(self.get_control_dim());
            &zeros
        };

        let func = |func_x: &State, func_t: f64| -> State {
            self.get_derivatives(func_x, u_actual, func_t)
        };

        integrator.step(&func, x, t, t + dt)
    }
}

pub mod integrated_imu;
