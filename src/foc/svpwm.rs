// Space Vector PWM (SVPWM) generation
//
// Min/max zero-sequence injection: the three sinusoidal phase references are
// shifted by -(max + min) / 2 so the active vectors are centred in the period.
// This is equivalent to the sector-based SVPWM but needs no sector lookup.

use libm::roundf;

use super::transforms::inverse_clarke;

/// Calculate Space Vector PWM duty cycles
///
/// # Arguments
/// * `v_alpha` - Alpha-axis voltage command (volts)
/// * `v_beta` - Beta-axis voltage command (volts)
/// * `v_dc` - DC bus voltage (volts)
/// * `max_duty` - Duty value corresponding to 100 %
///
/// # Returns
/// Tuple of (duty_u, duty_v, duty_w) as u16 values
///
/// Linear up to |v| = v_dc / √3; beyond that the duties saturate at 0 / max_duty.
pub fn calculate_svpwm(v_alpha: f32, v_beta: f32, v_dc: f32, max_duty: u16) -> (u16, u16, u16) {
    // Prevent division by zero
    if v_dc <= 0.0 {
        return (max_duty / 2, max_duty / 2, max_duty / 2);
    }

    let (v_u, v_v, v_w) = inverse_clarke(v_alpha, v_beta);

    // Zero-sequence offset
    let v_max = v_u.max(v_v).max(v_w);
    let v_min = v_u.min(v_v).min(v_w);
    let offset = -(v_max + v_min) * 0.5;

    let to_duty = |v: f32| -> u16 {
        let ratio = 0.5 + (v + offset) / v_dc;
        roundf(ratio * max_duty as f32).clamp(0.0, max_duty as f32) as u16
    };

    (to_duty(v_u), to_duty(v_v), to_duty(v_w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_svpwm_zero_voltage() {
        let (du, dv, dw) = calculate_svpwm(0.0, 0.0, 12.0, 100);
        // Zero voltage should result in 50% duty cycle
        assert_eq!((du, dv, dw), (50, 50, 50));
    }

    #[test]
    fn test_svpwm_sector1() {
        // Voltage vector in sector 1 (0-60 degrees)
        let (du, dv, dw) = calculate_svpwm(6.0, 0.0, 12.0, 100);
        // U phase should have highest duty cycle in sector 1
        assert!(du > dv && du > dw);
        assert_eq!(dv, dw);
    }

    #[test]
    fn test_svpwm_linear_limit() {
        // |v| = Vdc/√3 on the alpha axis: u-v line voltage equals √3·|v| = Vdc·0.866...
        let v_dc = 24.0;
        let (du, dv, dw) = calculate_svpwm(v_dc / 1.732_050_8, 0.0, v_dc, 1000);
        assert_eq!(du, 933);
        assert_eq!(dv, 67);
        assert_eq!(dw, 67);
    }

    #[test]
    fn test_svpwm_saturates() {
        let (du, dv, dw) = calculate_svpwm(100.0, 0.0, 12.0, 100);
        assert_eq!(du, 100);
        assert_eq!(dv, 0);
        assert_eq!(dw, 0);
    }

    #[test]
    fn test_svpwm_zero_bus() {
        assert_eq!(calculate_svpwm(1.0, 1.0, 0.0, 100), (50, 50, 50));
    }
}
