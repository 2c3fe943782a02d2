// Coordinate transformations for FOC (Field Oriented Control)
// Clarke, Park and inverse Park transforms plus the shared sin/cos evaluation

use libm::sqrtf;

const ONE_DIV_SQRT3: f32 = 0.577_350_26; // 1 / sqrt(3)

/// Clarke transformation (abc → αβ), amplitude invariant
///
/// Only two phase currents are measured; the third follows from ia + ib + ic = 0.
///
/// # Returns
/// Tuple of (i_alpha, i_beta)
pub fn clarke(ia: f32, ib: f32) -> (f32, f32) {
    let i_alpha = ia;
    let i_beta = (ia + 2.0 * ib) * ONE_DIV_SQRT3;
    (i_alpha, i_beta)
}

/// Park transformation (αβ → dq)
///
/// # Arguments
/// * `alpha`, `beta` - Stationary frame components
/// * `sin_cos` - (sin θ, cos θ) of the electrical angle
pub fn park(alpha: f32, beta: f32, sin_cos: (f32, f32)) -> (f32, f32) {
    let (sin_theta, cos_theta) = sin_cos;
    let d = alpha * cos_theta + beta * sin_theta;
    let q = -alpha * sin_theta + beta * cos_theta;
    (d, q)
}

/// Inverse Park transformation (dq → αβ)
///
/// Transforms from the rotating dq reference frame to the stationary αβ frame
///
/// # Arguments
/// * `vd` - d-axis voltage (aligned with rotor flux)
/// * `vq` - q-axis voltage (perpendicular to rotor flux, produces torque)
/// * `sin_cos` - (sin θ, cos θ) of the electrical angle
///
/// # Returns
/// Tuple of (v_alpha, v_beta) in the stationary frame
pub fn inverse_park(vd: f32, vq: f32, sin_cos: (f32, f32)) -> (f32, f32) {
    let (sin_theta, cos_theta) = sin_cos;
    let v_alpha = vd * cos_theta - vq * sin_theta;
    let v_beta = vd * sin_theta + vq * cos_theta;
    (v_alpha, v_beta)
}

/// Inverse Clarke transformation (αβ → abc/uvw)
///
/// # Returns
/// Tuple of (v_u, v_v, v_w) three-phase voltages
pub fn inverse_clarke(v_alpha: f32, v_beta: f32) -> (f32, f32, f32) {
    const SQRT3_DIV_2: f32 = 0.866_025_4; // sqrt(3) / 2

    let v_u = v_alpha;
    let v_v = -0.5 * v_alpha + SQRT3_DIV_2 * v_beta;
    let v_w = -0.5 * v_alpha - SQRT3_DIV_2 * v_beta;

    (v_u, v_v, v_w)
}

/// Sine and cosine of an electrical angle
///
/// # Arguments
/// * `theta` - Electrical angle in radians, [0, 2π)
///
/// # Returns
/// Tuple of (sin θ, cos θ)
///
/// # Implementation
/// Uses idsp::cossin() (~40 cycles on Cortex-M) instead of libm::sinf/cosf.
/// The angle is mapped onto idsp's i32 phase where the full i32 range covers one turn.
pub fn sin_cos(theta: f32) -> (f32, f32) {
    use core::f32::consts::{PI, TAU};

    // [0, 2π) -> [-π, π)
    let normalized_theta = if theta >= PI { theta - TAU } else { theta };

    // phase = θ * (2^31 / π)
    const SCALE: f32 = 2147483648.0 / PI;
    let phase: i32 = (normalized_theta * SCALE) as i32;

    let (cos_i32, sin_i32) = idsp::cossin(phase);

    const I32_TO_F32: f32 = 1.0 / 2147483648.0; // 1 / 2^31
    (sin_i32 as f32 * I32_TO_F32, cos_i32 as f32 * I32_TO_F32)
}

/// Limit voltage vector to maximum magnitude
///
/// Circular limit; the magnitude is frame independent so this works on either dq or αβ pairs.
///
/// # Returns
/// Tuple of (x_limited, y_limited)
pub fn limit_voltage(x: f32, y: f32, max_voltage: f32) -> (f32, f32) {
    let magnitude = sqrtf(x * x + y * y);

    if magnitude > max_voltage {
        // Scale down both components proportionally
        let scale = max_voltage / magnitude;
        (x * scale, y * scale)
    } else {
        (x, y)
    }
}
