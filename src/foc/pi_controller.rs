// PI (Proportional-Integral) controller with back-calculation anti-windup

use crate::config::PiGains;

/// PI controller with back-calculation anti-windup and output limiting
///
/// Discrete form, evaluated once per loop period (gains are per-sample):
///
/// ```text
/// u   = sum + kp * err
/// out = clamp(u, min, max)
/// sum = sum + ki * err - kc * (u - out)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PiController {
    /// Proportional gain
    kp: f32,
    /// Integral gain
    ki: f32,
    /// Anti-windup (back-calculation) gain
    kc: f32,
    /// Integral accumulator
    integral: f32,
    /// Minimum output limit
    output_min: f32,
    /// Maximum output limit
    output_max: f32,
    /// Last calculated output
    last_output: f32,
}

impl PiController {
    /// Create a new PI controller
    ///
    /// # Arguments
    /// * `kp` - Proportional gain
    /// * `ki` - Integral gain
    /// * `kc` - Anti-windup gain
    /// * `output_min` - Minimum output limit
    /// * `output_max` - Maximum output limit
    pub const fn new(kp: f32, ki: f32, kc: f32, output_min: f32, output_max: f32) -> Self {
        Self {
            kp,
            ki,
            kc,
            integral: 0.0,
            output_min,
            output_max,
            last_output: 0.0,
        }
    }

    /// Create a symmetric PI controller (output range: -out_max to +out_max)
    pub const fn from_gains(gains: &PiGains) -> Self {
        Self::new(gains.kp, gains.ki, gains.kc, -gains.out_max, gains.out_max)
    }

    /// Update the PI controller
    ///
    /// # Arguments
    /// * `setpoint` - Desired value
    /// * `measured` - Actual measured value
    ///
    /// # Returns
    /// Controller output (limited to output_min..output_max)
    pub fn update(&mut self, setpoint: f32, measured: f32) -> f32 {
        let error = setpoint - measured;

        let unclamped = self.integral + self.kp * error;
        let output = unclamped.clamp(self.output_min, self.output_max);

        // Saturation excess bleeds the integrator back toward the limit
        let excess = unclamped - output;
        self.integral += self.ki * error - self.kc * excess;

        self.last_output = output;
        output
    }

    /// Reset the integral term to zero
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_output = 0.0;
    }

    /// Get the current output
    pub fn get_output(&self) -> f32 {
        self.last_output
    }

    /// Get the current integral term
    pub fn get_integral(&self) -> f32 {
        self.integral
    }

    /// Check if output is currently saturated
    pub fn is_saturated(&self) -> bool {
        self.last_output <= self.output_min || self.last_output >= self.output_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_only() {
        let mut pi = PiController::new(1.0, 0.0, 0.0, -10.0, 10.0);
        let output = pi.update(5.0, 0.0);
        assert_eq!(output, 5.0); // P term only
    }

    #[test]
    fn test_output_limiting() {
        let mut pi = PiController::new(1.0, 0.0, 0.0, -10.0, 10.0);
        let output = pi.update(20.0, 0.0);
        assert_eq!(output, 10.0); // Limited to max
        assert!(pi.is_saturated());
    }

    #[test]
    fn test_integral_accumulation() {
        let mut pi = PiController::new(0.0, 0.5, 0.0, -100.0, 100.0);
        // Error = 10, ki = 0.5, so integral should accumulate by 5.0 each step
        pi.update(10.0, 0.0);
        assert_eq!(pi.get_integral(), 5.0);
        pi.update(10.0, 0.0);
        assert_eq!(pi.get_integral(), 10.0);
        // Output lags the integral by one sample
        assert_eq!(pi.get_output(), 5.0);
    }

    #[test]
    fn test_back_calculation_limits_windup() {
        let mut free = PiController::new(1.0, 0.5, 0.0, -1.0, 1.0);
        let mut bounded = PiController::new(1.0, 0.5, 0.5, -1.0, 1.0);
        for _ in 0..100 {
            free.update(10.0, 0.0);
            bounded.update(10.0, 0.0);
        }
        assert_eq!(bounded.get_output(), 1.0);
        assert!(bounded.get_integral() < free.get_integral());
        // Equilibrium: ki*err = kc*(sum + kp*err - max) -> sum = 1.0
        assert!((bounded.get_integral() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_reset() {
        let mut pi = PiController::from_gains(&PiGains {
            kp: 1.0,
            ki: 0.1,
            kc: 0.5,
            out_max: 2.0,
        });
        pi.update(1.0, 0.0);
        assert!(pi.get_integral() != 0.0);
        pi.reset();
        assert_eq!(pi.get_integral(), 0.0);
        assert_eq!(pi.get_output(), 0.0);
    }
}
