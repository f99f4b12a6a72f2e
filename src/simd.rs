//! Four-Lane Vector Types
//!
//! Polyphonic modules process channels in groups of four. [`Float4`] is a
//! plain `[f32; 4]` wrapper whose element-wise operators are written as
//! fixed-length loops, which the compiler lowers to SSE/NEON registers without
//! needing nightly `std::simd`.
//!
//! Conditional logic uses [`Mask4`] and [`Float4::select`] instead of
//! per-lane branches, so lanes that are beyond a port's channel count are
//! computed and simply ignored by the caller.

use core::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

/// Number of lanes in a vector group
pub const LANES: usize = 4;

/// Number of vector groups needed to cover the maximum channel count
pub const GROUPS: usize = crate::port::PORT_MAX_CHANNELS / LANES;

/// Four `f32` lanes processed together
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C, align(16))]
pub struct Float4(pub [f32; LANES]);

/// Per-lane boolean result of a comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mask4(pub [bool; LANES]);

impl Float4 {
    pub const ZERO: Float4 = Float4([0.0; LANES]);

    #[inline]
    pub const fn splat(v: f32) -> Self {
        Float4([v; LANES])
    }

    #[inline]
    pub fn from_slice(values: &[f32]) -> Self {
        let mut out = [0.0; LANES];
        for (o, v) in out.iter_mut().zip(values) {
            *o = *v;
        }
        Float4(out)
    }

    #[inline]
    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        let mut out = self.0;
        for v in &mut out {
            *v = f(*v);
        }
        Float4(out)
    }

    #[inline]
    pub fn zip_map(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        let mut out = self.0;
        for i in 0..LANES {
            out[i] = f(out[i], other.0[i]);
        }
        Float4(out)
    }

    #[inline]
    pub fn clamp(self, lo: f32, hi: f32) -> Self {
        self.map(|v| v.clamp(lo, hi))
    }

    #[inline]
    pub fn min(self, other: Self) -> Self {
        self.zip_map(other, f32::min)
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        self.zip_map(other, f32::max)
    }

    #[inline]
    pub fn abs(self) -> Self {
        self.map(f32::abs)
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        self.map(f32::sqrt)
    }

    #[inline]
    pub fn trunc(self) -> Self {
        self.map(f32::trunc)
    }

    #[inline]
    pub fn round(self) -> Self {
        self.map(f32::round)
    }

    #[inline]
    pub fn exp2(self) -> Self {
        self.map(f32::exp2)
    }

    /// `base` raised to each lane
    #[inline]
    pub fn pow_base(base: f32, exponent: Self) -> Self {
        exponent.map(|e| base.powf(e))
    }

    /// Sum of all lanes
    #[inline]
    pub fn sum(self) -> f32 {
        self.0.iter().sum()
    }

    #[inline]
    pub fn ge(self, rhs: f32) -> Mask4 {
        self.cmp(|v| v >= rhs)
    }

    #[inline]
    pub fn gt(self, rhs: f32) -> Mask4 {
        self.cmp(|v| v > rhs)
    }

    #[inline]
    pub fn le(self, rhs: f32) -> Mask4 {
        self.cmp(|v| v <= rhs)
    }

    #[inline]
    pub fn lt(self, rhs: f32) -> Mask4 {
        self.cmp(|v| v < rhs)
    }

    /// Lane-wise `self < rhs`
    #[inline]
    pub fn lt_lanes(self, rhs: Self) -> Mask4 {
        let mut out = [false; LANES];
        for i in 0..LANES {
            out[i] = self.0[i] < rhs.0[i];
        }
        Mask4(out)
    }

    /// Lane-wise `self >= rhs`
    #[inline]
    pub fn ge_lanes(self, rhs: Self) -> Mask4 {
        self.lt_lanes(rhs).not()
    }

    #[inline]
    fn cmp(self, f: impl Fn(f32) -> bool) -> Mask4 {
        let mut out = [false; LANES];
        for i in 0..LANES {
            out[i] = f(self.0[i]);
        }
        Mask4(out)
    }

    /// Lane-wise `if mask { a } else { b }`
    #[inline]
    pub fn select(mask: Mask4, a: Self, b: Self) -> Self {
        let mut out = b.0;
        for i in 0..LANES {
            if mask.0[i] {
                out[i] = a.0[i];
            }
        }
        Float4(out)
    }

    /// Lanes as 0.0 or 1.0
    #[inline]
    pub fn from_mask(mask: Mask4) -> Self {
        Self::select(mask, Float4::splat(1.0), Float4::ZERO)
    }
}

impl Mask4 {
    pub const NONE: Mask4 = Mask4([false; LANES]);
    pub const ALL: Mask4 = Mask4([true; LANES]);

    #[inline]
    pub fn and(self, other: Self) -> Self {
        let mut out = self.0;
        for i in 0..LANES {
            out[i] &= other.0[i];
        }
        Mask4(out)
    }

    #[inline]
    pub fn or(self, other: Self) -> Self {
        let mut out = self.0;
        for i in 0..LANES {
            out[i] |= other.0[i];
        }
        Mask4(out)
    }

    #[inline]
    pub fn not(self) -> Self {
        let mut out = self.0;
        for v in &mut out {
            *v = !*v;
        }
        Mask4(out)
    }

    #[inline]
    pub fn any(self) -> bool {
        self.0.iter().any(|&b| b)
    }
}

impl Index<usize> for Float4 {
    type Output = f32;
    #[inline]
    fn index(&self, i: usize) -> &f32 {
        &self.0[i]
    }
}

impl IndexMut<usize> for Float4 {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.0[i]
    }
}

impl From<f32> for Float4 {
    #[inline]
    fn from(v: f32) -> Self {
        Float4::splat(v)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $op:tt) => {
        impl $trait for Float4 {
            type Output = Float4;
            #[inline]
            fn $method(self, rhs: Float4) -> Float4 {
                let mut out = self.0;
                for i in 0..LANES {
                    out[i] = out[i] $op rhs.0[i];
                }
                Float4(out)
            }
        }

        impl $trait<f32> for Float4 {
            type Output = Float4;
            #[inline]
            fn $method(self, rhs: f32) -> Float4 {
                self $op Float4::splat(rhs)
            }
        }

        impl $trait<Float4> for f32 {
            type Output = Float4;
            #[inline]
            fn $method(self, rhs: Float4) -> Float4 {
                Float4::splat(self) $op rhs
            }
        }

        impl $assign_trait for Float4 {
            #[inline]
            fn $assign_method(&mut self, rhs: Float4) {
                *self = *self $op rhs;
            }
        }

        impl $assign_trait<f32> for Float4 {
            #[inline]
            fn $assign_method(&mut self, rhs: f32) {
                *self = *self $op Float4::splat(rhs);
            }
        }
    };
}

impl_binary_op!(Add, add, AddAssign, add_assign, +);
impl_binary_op!(Sub, sub, SubAssign, sub_assign, -);
impl_binary_op!(Mul, mul, MulAssign, mul_assign, *);
impl_binary_op!(Div, div, DivAssign, div_assign, /);

impl Neg for Float4 {
    type Output = Float4;
    #[inline]
    fn neg(self) -> Float4 {
        self.map(|v| -v)
    }
}

/// Iterate over the starting channel of each group covering `channels`
#[inline]
pub fn group_starts(channels: usize) -> impl Iterator<Item = usize> {
    (0..channels).step_by(LANES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_with_scalars() {
        let a = Float4([1.0, 2.0, 3.0, 4.0]);
        let b = a * 2.0 + 1.0;
        assert_eq!(b, Float4([3.0, 5.0, 7.0, 9.0]));
        let c = 10.0 - a;
        assert_eq!(c, Float4([9.0, 8.0, 7.0, 6.0]));
    }

    #[test]
    fn test_select_is_lane_wise() {
        let a = Float4([0.5, 1.5, -1.0, 2.0]);
        let mask = a.ge(1.0);
        assert_eq!(mask, Mask4([false, true, false, true]));
        let picked = Float4::select(mask, Float4::splat(10.0), a);
        assert_eq!(picked, Float4([0.5, 10.0, -1.0, 10.0]));
    }

    #[test]
    fn test_mask_logic() {
        let a = Mask4([true, false, true, false]);
        let b = Mask4([true, true, false, false]);
        assert_eq!(a.and(b), Mask4([true, false, false, false]));
        assert_eq!(a.or(b), Mask4([true, true, true, false]));
        assert_eq!(a.not(), Mask4([false, true, false, true]));
        assert!(a.any());
        assert!(!Mask4::NONE.any());
    }

    #[test]
    fn test_group_starts() {
        let starts: Vec<usize> = group_starts(9).collect();
        assert_eq!(starts, vec![0, 4, 8]);
        assert_eq!(group_starts(0).count(), 0);
    }

    #[test]
    fn test_from_slice_pads_with_zero() {
        let v = Float4::from_slice(&[1.0, 2.0]);
        assert_eq!(v, Float4([1.0, 2.0, 0.0, 0.0]));
    }
}
