//! Fixed-timestep accumulator for driving the simulation from a variable frame rate.

use std::time::Duration;

// time snapping technique from Tyler Glaiel's blog post
// https://medium.com/@tglaiel/how-to-make-your-game-run-at-60fps-24c61210fe75
const SNAP_THRESHOLD: u128 = 200_000;

/// Accumulated time is capped at this many steps to prevent a spiral of death
/// where simulating takes longer than the time it simulates.
const MAX_ACC_STEPS: u128 = 8;

fn should_snap(dt: u128, target: u128) -> bool {
    if dt < target {
        target - dt < SNAP_THRESHOLD
    } else {
        dt - target < SNAP_THRESHOLD
    }
}

/// Turns measured frame times into a whole number of fixed steps.
#[derive(Clone, Debug)]
pub struct FixedTimestep {
    nanos_per_step: u128,
    acc: u128,
}

impl FixedTimestep {
    /// Create an accumulator for steps of `timestep` seconds.
    pub fn new(timestep: f64) -> Self {
        FixedTimestep {
            nanos_per_step: (Duration::from_secs_f64(timestep).as_nanos()).max(1),
            acc: 0,
        }
    }

    /// Length of one step in seconds.
    #[inline]
    pub fn dt(&self) -> f64 {
        Duration::from_nanos(self.nanos_per_step as u64).as_secs_f64()
    }

    /// Account for `elapsed` wall-clock time, returning how many steps to run now.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        let mut dt_nanos = elapsed.as_nanos();
        // frame times that are almost exactly one step are treated as exactly one,
        // otherwise vsync jitter makes us occasionally run zero or two steps
        if should_snap(dt_nanos, self.nanos_per_step) {
            dt_nanos = self.nanos_per_step;
        }

        self.acc = (self.acc + dt_nanos).min(self.nanos_per_step * MAX_ACC_STEPS);
        let steps = self.acc / self.nanos_per_step;
        self.acc -= steps * self.nanos_per_step;
        steps as usize
    }

    /// How far the accumulator is into the next step, in the range [0, 1).
    pub fn alpha(&self) -> f64 {
        self.acc as f64 / self.nanos_per_step as f64
    }

    pub fn reset(&mut self) {
        self.acc = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_partial_frames() {
        let mut ts = FixedTimestep::new(0.01);
        assert_eq!(ts.advance(Duration::from_millis(4)), 0);
        assert_eq!(ts.advance(Duration::from_millis(4)), 0);
        assert_eq!(ts.advance(Duration::from_millis(4)), 1);
        assert!((ts.alpha() - 0.2).abs() < 1e-9);
        assert_eq!(ts.advance(Duration::from_millis(25)), 2);
    }

    #[test]
    fn snaps_near_exact_frames() {
        let mut ts = FixedTimestep::new(0.01);
        let slightly_short = Duration::from_nanos(10_000_000 - 100_000);
        for _ in 0..10 {
            assert_eq!(ts.advance(slightly_short), 1);
        }
        assert_eq!(ts.alpha(), 0.0);
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut ts = FixedTimestep::new(0.01);
        assert_eq!(ts.advance(Duration::from_secs(5)), MAX_ACC_STEPS as usize);
        assert_eq!(ts.alpha(), 0.0);
        assert_eq!(ts.dt(), 0.01);
    }
}
