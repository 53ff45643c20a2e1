// attitude_core/src/utils/integrators.rs

use nalgebra::{DVector, Scalar};
use num_traits::Float;

/// A fixed-step ODE integrator for `x' = f(x, t)`.
pub trait Integrator<T> {
    fn step(
        &self,
        func: &dyn Fn(&DVector<T>, T) -> DVector<T>,
        x0: &DVector<T>,
        t0: T,
        tf: T,
    ) -> DVector<T>;
}

/// Forward Euler.
#[derive(Debug, Default, Clone, Copy)]
pub struct RK1;

impl<T> Integrator<T> for RK1
where
    T: Scalar + Float + std::ops::MulAssign + std::ops::AddAssign,
{
    fn step(
        &self,
        func: &dyn Fn(&DVector<T>, T) -> DVector<T>,
        x0: &DVector<T>,
        t0: T,
        tf: T,
    ) -> DVector<T> {
        let dt = tf - t0;
        x0 + func(x0, t0) * dt
    }
}

/// Classic fourth-order Runge-Kutta.
#[derive(Debug, Default, Clone, Copy)]
pub struct RK4;

impl<T> Integrator<T> for RK4
where
    T: Scalar + Float + std::ops::MulAssign + std::ops::AddAssign,
{
    fn step(
        &self,
        func: &dyn Fn(&DVector<T>, T) -> DVector<T>,
        x0: &DVector<T>,
        t0: T,
        tf: T,
    ) -> DVector<T> {
        let dt = tf - t0;
        let two = T::one() + T::one();
        let half_dt = dt / two;
        let sixth_dt = dt / (two + two + two);

        let k1 = func(x0, t0);
        let k2 = func(&(x0 + &k1 * half_dt), t0 + half_dt);
        let k3 = func(&(x0 + &k2 * half_dt), t0 + half_dt);
        let k4 = func(&(x0 + &k3 * dt), tf);

        x0 + (k1 + (k2 + k3) * two + k4) * sixth_dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // x' = -x, x(0) = 1  =>  x(t) = e^-t
    fn decay(x: &DVector<f64>, _t: f64) -> DVector<f64> {
        -x
    }

    #[test]
    fn rk4_tracks_exponential_decay() {
        let mut x = DVector::from_element(1, 1.0);
        let dt = 0.01;
        for i in 0..100 {
            let t = i as f64 * dt;
            x = RK4.step(&decay, &x, t, t + dt);
        }
        assert_relative_eq!(x[0], (-1.0_f64).exp(), max_relative = 1e-8);
    }

    #[test]
    fn rk4_beats_euler_on_the_same_step() {
        let x0 = DVector::from_element(1, 1.0);
        let exact = (-0.1_f64).exp();
        let euler = RK1.step(&decay, &x0, 0.0, 0.1)[0];
        let rk4 = RK4.step(&decay, &x0, 0.0, 0.1)[0];
        assert!((rk4 - exact).abs() < (euler - exact).abs());
    }
}
