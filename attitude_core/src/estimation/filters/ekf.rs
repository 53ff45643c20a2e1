// attitude_core/src/estimation/filters/ekf.rs

use std::collections::HashMap;

use crate::frames::FilterState;
use crate::models::estimation::dynamics::EstimationDynamics;
use crate::models::estimation::measurement::{Measurement, MeasurementSource};
use crate::types::Control;
use crate::utils::integrators::RK4;
use nalgebra::{DMatrix, DVector};
use tracing::{trace, warn};

/// An Extended Kalman Filter over a [`FilterState`].
///
/// Prediction integrates the dynamics with RK4 and propagates the covariance
/// through the linearized model. Correction fuses any subset of the registered
/// measurement models in one stacked update.
pub struct ExtendedKalmanFilter {
    /// The current state of the filter (x, P, t).
    state: FilterState,
    dynamics: Box<dyn EstimationDynamics>,
    /// Covariance of the control input `u` (per sample).
    control_noise: DMatrix<f64>,
    /// Continuous-time random walk added to states the input does not drive.
    random_walk: DMatrix<f64>,
    measurement_models: HashMap<MeasurementSource, Box<dyn Measurement>>,
}

impl std::fmt::Debug for ExtendedKalmanFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedKalmanFilter")
            .field("state", &self.state)
            .field("dynamics", &self.dynamics)
            .field("models", &self.measurement_models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExtendedKalmanFilter {
    pub fn new(
        initial_state: FilterState,
        dynamics: Box<dyn EstimationDynamics>,
        control_noise: DMatrix<f64>,
        random_walk: DMatrix<f64>,
        measurement_models: HashMap<MeasurementSource, Box<dyn Measurement>>,
    ) -> Self {
        assert_eq!(initial_state.dim(), random_walk.nrows());
        assert_eq!(initial_state.dim(), random_walk.ncols());
        assert_eq!(dynamics.get_control_dim(), control_noise.nrows());

        Self {
            state: initial_state,
            dynamics,
            control_noise,
            random_walk,
            measurement_models,
        }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut FilterState {
        &mut self.state
    }

    /// Replaces (or registers) the model used for `source`.
    pub fn set_measurement_model(&mut self, source: MeasurementSource, model: Box<dyn Measurement>) {
        self.measurement_models.insert(source, model);
    }

    pub fn set_control_noise(&mut self, control_noise: DMatrix<f64>) {
        if control_noise.shape() == self.control_noise.shape() {
            self.control_noise = control_noise;
        } else {
            warn!(
                shape = ?control_noise.shape(),
                "ignoring control noise of the wrong shape"
            );
        }
    }

    /// Advances the state by `dt` seconds with `u` held constant.
    ///
    /// `P ← F P Fᵀ + Q`, with `F = I + A·dt` and
    /// `Q = (B·dt) Σu (B·dt)ᵀ + W·dt`.
    pub fn predict(&mut self, u: &Control, dt: f64) {
        if dt <= 0.0 {
            return;
        }

        let x = &self.state.vector;
        let p = &self.state.covariance;
        let t = self.state.last_update_timestamp;
        let n = self.state.dim();

        // 1. Predict the state vector using the dynamics model and an integrator.
        let x_pred = self.dynamics.propagate(x, u, t, dt, &RK4);

        // 2. Linearize around the pre-step state.
        let (a_jac, b_jac) = self.dynamics.calculate_jacobian(x, u, t);
        let f_jac = DMatrix::<f64>::identity(n, n) + a_jac * dt;
        let g_jac = b_jac * dt;

        // 3. Propagate the covariance.
        let q = &g_jac * &self.control_noise * g_jac.transpose() + &self.random_walk * dt;
        let p_pred = &f_jac * p * f_jac.transpose() + q;

        self.state.vector = x_pred;
        self.state.covariance = symmetrize(p_pred);
        self.state.last_update_timestamp += dt;
        self.renormalize();
    }

    /// Fuses all `measurements` at once. Each entry names the model that
    /// explains it. Returns `false` if nothing was fused.
    pub fn correct(&mut self, measurements: &[(MeasurementSource, DVector<f64>)]) -> bool {
        let active: Vec<(&dyn Measurement, &DVector<f64>)> = measurements
            .iter()
            .filter_map(|(source, z)| match self.measurement_models.get(source) {
                Some(model) if model.dim() == z.nrows() => Some((model.as_ref(), z)),
                Some(_) => {
                    warn!(?source, "measurement has the wrong dimension, skipped");
                    None
                }
                None => {
                    trace!(?source, "no model registered, skipped");
                    None
                }
            })
            .collect();

        let m: usize = active.iter().map(|(model, _)| model.dim()).sum();
        if m == 0 {
            return false;
        }
        let n = self.state.dim();

        // --- Stack z, h(x), H and a block-diagonal R ---
        let mut z = DVector::<f64>::zeros(m);
        let mut z_pred = DVector::<f64>::zeros(m);
        let mut h_jac = DMatrix::<f64>::zeros(m, n);
        let mut r_mat = DMatrix::<f64>::zeros(m, m);
        let mut row = 0;
        for (model, measured) in &active {
            let k = model.dim();
            z.rows_mut(row, k).copy_from(*measured);
            z_pred
                .rows_mut(row, k)
                .copy_from(&model.predict_measurement(&self.state));
            h_jac
                .rows_mut(row, k)
                .copy_from(&model.calculate_jacobian(&self.state));
            r_mat.view_mut((row, row), (k, k)).copy_from(model.get_r());
            row += k;
        }

        // --- Standard EKF Update Equations ---
        let p = &self.state.covariance;
        let y = z - z_pred;
        let s = &h_jac * p * h_jac.transpose() + &r_mat;

        let Some(s_inv) = s.try_inverse() else {
            warn!(rows = m, "innovation covariance is singular, correction skipped");
            return false;
        };

        let k_gain = p * h_jac.transpose() * s_inv;
        self.state.vector += &k_gain * y;

        // Joseph form keeps P symmetric positive semi-definite.
        let i_kh = DMatrix::<f64>::identity(n, n) - &k_gain * &h_jac;
        let p_new = &i_kh * p * i_kh.transpose() + &k_gain * r_mat * k_gain.transpose();
        self.state.covariance = symmetrize(p_new);
        self.renormalize();
        true
    }

    fn renormalize(&mut self) {
        if !self.state.normalize_quaternion() {
            warn!("filter quaternion collapsed, reset to identity");
        }
    }
}

fn symmetrize(p: DMatrix<f64>) -> DMatrix<f64> {
    (&p + p.transpose()) * 0.5
}
