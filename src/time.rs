//! Content-clock timestamps.
//!
//! All decoded output is expressed on a single corrected time axis measured
//! in ticks of a fixed internal rate.  The tick rate divides evenly into the
//! common audio sample rates and into whole-frame durations at 24/25/30 fps,
//! so frame-boundary rounding is exact for the rates that matter.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// A signed timestamp on the content's own clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentTime(i64);

impl ContentTime {
    /// Internal ticks per second.
    pub const HZ: i64 = 96_000;

    /// Zero on the content clock.
    pub const ZERO: ContentTime = ContentTime(0);

    /// Sentinel for "unset / earlier than anything real".
    pub const MIN: ContentTime = ContentTime(i64::MIN);

    pub const fn new(ticks: i64) -> Self {
        ContentTime(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn from_seconds(seconds: f64) -> Self {
        ContentTime((seconds * Self::HZ as f64).round() as i64)
    }

    pub fn seconds(self) -> f64 {
        self.0 as f64 / Self::HZ as f64
    }

    /// Time of `frames` whole frames at `rate` frames (or samples) per second.
    pub fn from_frames(frames: i64, rate: f64) -> Self {
        debug_assert!(rate > 0.0);
        ContentTime((frames as f64 * Self::HZ as f64 / rate) as i64)
    }

    /// Nearest whole frame count at `rate`.
    pub fn frames_round(self, rate: f64) -> i64 {
        (self.0 as f64 * rate / Self::HZ as f64).round() as i64
    }

    /// Whole frames fully elapsed at `rate`.
    pub fn frames_floor(self, rate: f64) -> i64 {
        (self.0 as f64 * rate / Self::HZ as f64).floor() as i64
    }

    /// Round up to the next frame boundary at `rate`.
    ///
    /// The frame duration in ticks is rounded to the nearest integer, so
    /// non-integer rates (29.97 and friends) align to the closest
    /// representable boundary.
    pub fn round_up(self, rate: f64) -> Self {
        let n = (Self::HZ as f64 / rate).round() as i64;
        let r = self.0.rem_euclid(n);
        if r == 0 {
            self
        } else {
            ContentTime(self.0 + n - r)
        }
    }

    /// Round down to the previous frame boundary at `rate`.
    pub fn round_down(self, rate: f64) -> Self {
        let n = (Self::HZ as f64 / rate).round() as i64;
        ContentTime(self.0 - self.0.rem_euclid(n))
    }
}

impl Add for ContentTime {
    type Output = ContentTime;

    fn add(self, other: ContentTime) -> ContentTime {
        ContentTime(self.0 + other.0)
    }
}

impl AddAssign for ContentTime {
    fn add_assign(&mut self, other: ContentTime) {
        self.0 += other.0;
    }
}

impl Sub for ContentTime {
    type Output = ContentTime;

    fn sub(self, other: ContentTime) -> ContentTime {
        ContentTime(self.0 - other.0)
    }
}

impl SubAssign for ContentTime {
    fn sub_assign(&mut self, other: ContentTime) {
        self.0 -= other.0;
    }
}

impl Neg for ContentTime {
    type Output = ContentTime;

    fn neg(self) -> ContentTime {
        ContentTime(-self.0)
    }
}

impl fmt::Display for ContentTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.seconds())
    }
}

/// A half-open `[from, to)` interval of content time.
///
/// Equal periods have identical bounds; this is the atomic unit of subtitle
/// emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentTimePeriod {
    pub from: ContentTime,
    pub to: ContentTime,
}

impl ContentTimePeriod {
    pub fn new(from: ContentTime, to: ContentTime) -> Self {
        ContentTimePeriod { from, to }
    }

    pub fn duration(&self) -> ContentTime {
        self.to - self.from
    }

    pub fn contains(&self, t: ContentTime) -> bool {
        self.from <= t && t < self.to
    }

    pub fn overlaps(&self, other: &ContentTimePeriod) -> bool {
        self.from < other.to && other.from < self.to
    }
}

impl fmt::Display for ContentTimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_round_trip() {
        let t = ContentTime::from_seconds(1.5);
        assert_eq!(t.ticks(), 144_000);
        assert!((t.seconds() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_frames_exact_rates() {
        assert_eq!(ContentTime::from_frames(25, 25.0).ticks(), ContentTime::HZ);
        assert_eq!(
            ContentTime::from_frames(48_000, 48_000.0).ticks(),
            ContentTime::HZ
        );
        assert_eq!(ContentTime::from_frames(1, 24.0).ticks(), 4_000);
    }

    #[test]
    fn test_frames_round() {
        let t = ContentTime::from_seconds(2.0);
        assert_eq!(t.frames_round(25.0), 50);
        assert_eq!(t.frames_round(48_000.0), 96_000);
    }

    #[test]
    fn test_round_up_to_frame_boundary() {
        // One tick past a boundary rounds to the next boundary.
        let t = ContentTime::new(3841);
        assert_eq!(t.round_up(25.0).ticks(), 7680);

        // Exactly on a boundary stays put.
        let t = ContentTime::new(7680);
        assert_eq!(t.round_up(25.0).ticks(), 7680);

        assert_eq!(ContentTime::ZERO.round_up(25.0), ContentTime::ZERO);
    }

    #[test]
    fn test_round_down_to_frame_boundary() {
        let t = ContentTime::new(3841);
        assert_eq!(t.round_down(25.0).ticks(), 3840);

        let t = ContentTime::new(3840);
        assert_eq!(t.round_down(25.0).ticks(), 3840);
    }

    #[test]
    fn test_rounding_negative_times() {
        // -1s is exactly on a 25fps boundary.
        let t = ContentTime::new(-96_000);
        assert_eq!(t.round_up(25.0).ticks(), -96_000);
        assert_eq!(t.round_down(25.0).ticks(), -96_000);

        // One tick later rounds towards the enclosing boundaries.
        let t = ContentTime::new(-95_999);
        assert_eq!(t.round_up(25.0).ticks(), -92_160);
        assert_eq!(t.round_down(25.0).ticks(), -96_000);
    }

    #[test]
    fn test_round_up_fractional_rate() {
        // 29.97: frame duration rounds to 3203 ticks.
        let t = ContentTime::new(1);
        assert_eq!(t.round_up(30_000.0 / 1001.0).ticks(), 3203);
    }

    #[test]
    fn test_arithmetic() {
        let a = ContentTime::from_seconds(1.0);
        let b = ContentTime::from_seconds(0.25);
        assert_eq!((a + b).seconds(), 1.25);
        assert_eq!((a - b).seconds(), 0.75);
        assert_eq!((-a).ticks(), -ContentTime::HZ);
        assert!(b < a);
    }

    #[test]
    fn test_min_sentinel_is_smallest() {
        assert!(ContentTime::MIN < ContentTime::from_seconds(-1e9));
        assert!(ContentTime::MIN < ContentTime::ZERO);
    }

    #[test]
    fn test_period_equality_is_bounds_equality() {
        let p = ContentTimePeriod::new(
            ContentTime::from_seconds(1.0),
            ContentTime::from_seconds(2.0),
        );
        let q = ContentTimePeriod::new(
            ContentTime::from_seconds(1.0),
            ContentTime::from_seconds(2.0),
        );
        let r = ContentTimePeriod::new(
            ContentTime::from_seconds(1.0),
            ContentTime::from_seconds(3.0),
        );
        assert_eq!(p, q);
        assert_ne!(p, r);
    }

    #[test]
    fn test_period_half_open() {
        let p = ContentTimePeriod::new(
            ContentTime::from_seconds(1.0),
            ContentTime::from_seconds(2.0),
        );
        assert!(p.contains(ContentTime::from_seconds(1.0)));
        assert!(p.contains(ContentTime::from_seconds(1.999)));
        assert!(!p.contains(ContentTime::from_seconds(2.0)));
    }
}
