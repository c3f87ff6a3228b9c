//! L4 Atomic Layer: Damped harmonic oscillator step
//!
//! ```text
//! a = (k * (target - position) - c * v) / m
//! v = clamp(v + a * dt, -v_max, v_max)
//! x = x + v * dt
//! ```
//!
//! The force equation is the product's feel. Do not replace it with an
//! easing curve or an analytical solution.

use crate::config::EngineConfig;

/// Physical constants of the spring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringParams {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: f64,
    pub max_velocity: f64,
}

impl From<&EngineConfig> for SpringParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            stiffness: config.stiffness,
            damping: config.damping,
            mass: config.mass,
            max_velocity: config.max_velocity,
        }
    }
}

impl Default for SpringParams {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl SpringParams {
    /// Advance `position`/`velocity` towards `target` by `dt` seconds
    ///
    /// Returns the displacement `target - position` measured before the step.
    #[inline]
    pub fn step(&self, position: &mut f64, velocity: &mut f64, target: f64, dt: f64) -> f64 {
        let displacement = target - *position;
        let spring_force = self.stiffness * displacement;
        let damping_force = -self.damping * *velocity;
        let acceleration = (spring_force + damping_force) / self.mass;

        *velocity = (*velocity + acceleration * dt).clamp(-self.max_velocity, self.max_velocity);
        *position += *velocity * dt;

        displacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_matches_force_equation() {
        let params = SpringParams {
            stiffness: 80.0,
            damping: 12.0,
            mass: 2.0,
            max_velocity: 3000.0,
        };
        let mut position = 1.0;
        let mut velocity = 5.0;
        let dt = 0.01;

        let displacement = params.step(&mut position, &mut velocity, 11.0, dt);

        // a = (80 * 10 - 12 * 5) / 2 = 370
        assert_eq!(displacement, 10.0);
        assert!((velocity - 8.7).abs() < 1e-12);
        assert!((position - 1.087).abs() < 1e-12);
    }

    #[test]
    fn test_step_zero_dt_is_noop() {
        let params = SpringParams::default();
        let mut position = 3.0;
        let mut velocity = -4.0;
        params.step(&mut position, &mut velocity, 100.0, 0.0);
        assert_eq!(position, 3.0);
        assert_eq!(velocity, -4.0);
    }

    #[test]
    fn test_step_clamps_velocity() {
        let params = SpringParams::default();
        for target in [1e12, -1e12, f64::MAX / 1e3] {
            let mut position = 0.0;
            let mut velocity = 0.0;
            params.step(&mut position, &mut velocity, target, 1.0 / 60.0);
            assert!(velocity.abs() <= params.max_velocity);
            assert!(position.is_finite());
        }
    }
}
