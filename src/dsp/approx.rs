//! Fast approximations of transcendental functions and mapping helpers

use crate::simd::Float4;

/// Padé 5/4 approximation of `sin(2πx)` on [0, 1), expanded around 0.5.
///
/// Accuracy is best mid-cycle and degrades to about 4e-3 at the wrap point.
#[inline]
pub fn sin2pi_pade_05_5_4(phase: f32) -> f32 {
    let x = phase - 0.5;
    let x2 = x * x;
    let x3 = x2 * x;
    let x4 = x2 * x2;
    let x5 = x4 * x;
    (-6.283_185_3 * x + 33.198_64 * x3 - 32.441_914 * x5) / (1.0 + 1.296_008_7 * x2 + 0.702_807_3 * x4)
}

/// `2^x` through a fifth-order polynomial on the fractional part
#[inline]
pub fn exp2_taylor5(x: f32) -> f32 {
    let xi = x.floor();
    let xf = x - xi;
    let p = 1.0
        + xf * (0.693_147_2
            + xf * (0.240_226_5 + xf * (0.055_504_1 + xf * (0.009_618_1 + xf * 0.001_333_4))));
    let exponent = (xi as i32).clamp(-126, 127);
    p * f32::from_bits(((exponent + 127) as u32) << 23)
}

/// Saturating rational clip used by the noise outputs.
///
/// Input is clamped to ±24 first.
#[inline]
pub fn softclip(x: f32) -> f32 {
    let x = x.clamp(-24.0, 24.0);
    let x2 = x * x;
    x * (3888.0 + x2) / (3888.0 + 9.0 * x2)
}

/// Padé approximation of `tanh`, input clamped to ±3 where it reaches ±1
#[inline]
pub fn tanh_pade(x: f32) -> f32 {
    let x = x.clamp(-3.0, 3.0);
    let x2 = x * x;
    x * (27.0 + x2) / (27.0 + 9.0 * x2)
}

#[inline]
pub fn tanh_pade_simd(x: Float4) -> Float4 {
    x.map(tanh_pade)
}

/// Linear interpolation from `a` (p = 0) to `b` (p = 1)
#[inline]
pub fn crossfade(a: f32, b: f32, p: f32) -> f32 {
    a + (b - a) * p
}

/// Maps `x` from [x_min, x_max] to [y_min, y_max] without clamping
#[inline]
pub fn rescale(x: f32, x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> f32 {
    y_min + (x - x_min) / (x_max - x_min) * (y_max - y_min)
}

/// Euclidean modulo: result has the sign of the divisor
#[inline]
pub fn eucmod(a: i32, b: i32) -> i32 {
    a.rem_euclid(b)
}

/// Floor division paired with [`eucmod`]
#[inline]
pub fn eucdiv(a: i32, b: i32) -> i32 {
    a.div_euclid(b)
}

/// Wrap a phase into [0, 1)
#[inline]
pub fn wrap_phase(phase: f32) -> f32 {
    let wrapped = phase - phase.floor();
    // floor of a tiny negative value can round back up to 1.0
    if wrapped >= 1.0 {
        0.0
    } else {
        wrapped
    }
}
