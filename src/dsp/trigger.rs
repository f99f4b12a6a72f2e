//! Edge detection and timing primitives

use crate::simd::{Float4, Mask4};

/// Hysteresis edge detector.
///
/// Goes high when the input reaches the high threshold and low when it falls
/// to the low threshold. [`process`](Self::process) reports only the low to
/// high transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchmittTrigger {
    state: bool,
}

impl SchmittTrigger {
    pub const fn new() -> Self {
        Self { state: false }
    }

    /// Thresholds 0 and 1
    #[inline]
    pub fn process(&mut self, input: f32) -> bool {
        self.process_with(input, 0.0, 1.0)
    }

    #[inline]
    pub fn process_with(&mut self, input: f32, low: f32, high: f32) -> bool {
        if self.state {
            if input <= low {
                self.state = false;
            }
            false
        } else if input >= high {
            self.state = true;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn is_high(&self) -> bool {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = false;
    }

    /// Starts a new wait in the high state, so an input that is already high
    /// must fall to the low threshold before the next edge can fire
    pub fn rearm(&mut self) {
        self.state = true;
    }
}

/// Four independent Schmitt triggers processed as one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchmittTrigger4 {
    state: Mask4,
}

impl SchmittTrigger4 {
    /// Returns the lanes that went high on this call
    #[inline]
    pub fn process(&mut self, input: Float4) -> Mask4 {
        self.process_with(input, 0.0, 1.0)
    }

    #[inline]
    pub fn process_with(&mut self, input: Float4, low: f32, high: f32) -> Mask4 {
        let on = input.ge(high);
        let off = input.le(low);
        let triggered = on.and(self.state.not());
        self.state = on.or(self.state.and(off.not()));
        triggered
    }

    #[inline]
    pub fn is_high(&self) -> Mask4 {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = Mask4::NONE;
    }
}

/// Reports false to true transitions of a boolean
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BooleanTrigger {
    state: bool,
}

impl BooleanTrigger {
    #[inline]
    pub fn process(&mut self, state: bool) -> bool {
        let triggered = state && !self.state;
        self.state = state;
        triggered
    }

    pub fn reset(&mut self) {
        self.state = false;
    }
}

/// Fixed-length pulse timer.
///
/// Re-triggering while a pulse is active extends it to the longer of the two
/// remaining times; pulses never stack.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PulseGenerator {
    remaining: f32,
}

impl PulseGenerator {
    /// Default pulse length used for trigger outputs
    pub const TRIGGER_DURATION: f32 = 1e-3;

    pub fn trigger(&mut self, duration: f32) {
        if duration > self.remaining {
            self.remaining = duration;
        }
    }

    /// Returns true while the pulse is active
    #[inline]
    pub fn process(&mut self, delta_time: f32) -> bool {
        if self.remaining > 0.0 {
            self.remaining -= delta_time;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}

/// Fires once every `division` calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDivider {
    clock: u32,
    division: u32,
}

impl Default for ClockDivider {
    fn default() -> Self {
        Self::new(1)
    }
}

impl ClockDivider {
    pub const fn new(division: u32) -> Self {
        Self {
            clock: 0,
            division: if division == 0 { 1 } else { division },
        }
    }

    pub fn set_division(&mut self, division: u32) {
        self.division = division.max(1);
    }

    pub fn division(&self) -> u32 {
        self.division
    }

    pub fn clock(&self) -> u32 {
        self.clock
    }

    pub fn reset(&mut self) {
        self.clock = 0;
    }

    #[inline]
    pub fn process(&mut self) -> bool {
        self.clock += 1;
        if self.clock >= self.division {
            self.clock = 0;
            true
        } else {
            false
        }
    }
}

/// Elapsed-time accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    time: f32,
}

impl Timer {
    #[inline]
    pub fn process(&mut self, delta_time: f32) -> f32 {
        self.time += delta_time;
        self.time
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schmitt_hysteresis() {
        let mut t = SchmittTrigger::new();
        assert!(!t.process(0.5));
        assert!(t.process(1.0));
        assert!(!t.process(2.0));
        // Between thresholds stays high
        assert!(!t.process(0.5));
        assert!(t.is_high());
        // Low threshold is 0 V
        assert!(!t.process(0.05));
        assert!(t.is_high());
        assert!(!t.process(0.0));
        assert!(!t.is_high());
        assert!(t.process(1.0));
    }

    #[test]
    fn test_schmitt_rearm_ignores_held_input() {
        let mut t = SchmittTrigger::new();
        t.rearm();
        assert!(!t.process(5.0));
        assert!(!t.process(0.0));
        assert!(t.process(5.0));

        t.reset();
        assert!(t.process(5.0));
    }

    #[test]
    fn test_schmitt_custom_thresholds() {
        let mut t = SchmittTrigger::new();
        assert!(!t.process_with(1.5, 0.1, 2.0));
        assert!(t.process_with(2.0, 0.1, 2.0));
        assert!(!t.process_with(0.2, 0.1, 2.0));
        assert!(!t.process_with(0.1, 0.1, 2.0));
        assert!(t.process_with(5.0, 0.1, 2.0));
        t.reset();
        assert!(!t.is_high());
    }

    #[test]
    fn test_schmitt4_lanes_independent() {
        let mut t = SchmittTrigger4::default();
        let fired = t.process(Float4([1.0, 0.5, 0.0, 3.0]));
        assert_eq!(fired, Mask4([true, false, false, true]));
        let fired = t.process(Float4([1.0, 1.0, 0.0, 0.5]));
        assert_eq!(fired, Mask4([false, true, false, false]));
        assert_eq!(t.is_high(), Mask4([true, true, false, true]));
        t.process(Float4::ZERO);
        assert_eq!(t.is_high(), Mask4::NONE);
    }

    #[test]
    fn test_boolean_trigger() {
        let mut t = BooleanTrigger::default();
        assert!(t.process(true));
        assert!(!t.process(true));
        assert!(!t.process(false));
        assert!(t.process(true));
    }

    #[test]
    fn test_pulse_does_not_stack() {
        let dt = 1.0 / 1000.0;
        let mut p = PulseGenerator::default();
        p.trigger(3e-3);
        assert!(p.process(dt));
        p.trigger(3e-3);
        let mut count = 1;
        while p.process(dt) {
            count += 1;
        }
        // One restart of a 3 ms window after 1 ms, not 6 ms of pulse
        assert!(count <= 5, "pulse lasted {} steps", count);
        assert!(!p.process(dt));
    }

    #[test]
    fn test_clock_divider_fires_every_n() {
        let mut d = ClockDivider::new(4);
        let fired: Vec<bool> = (0..8).map(|_| d.process()).collect();
        assert_eq!(
            fired,
            vec![false, false, false, true, false, false, false, true]
        );
        d.set_division(0);
        assert_eq!(d.division(), 1);
        assert!(d.process());
    }

    #[test]
    fn test_timer_accumulates() {
        let mut t = Timer::default();
        t.process(0.25);
        assert!((t.process(0.5) - 0.75).abs() < 1e-6);
        t.reset();
        assert_eq!(t.time(), 0.0);
    }
}
