//! Timing utilities: effective durations and frame/time conversion.
//!
//! Frame math tolerates floating-point noise: a time that is within
//! [`TIME_EPSILON`] seconds-worth of a frame boundary is treated as lying on
//! it, so `0.1s * 30fps` is exactly frame 3 rather than "just past" it.

use std::ops::Range;

/// Tolerance used for time comparisons (seconds) and frame rounding.
pub const TIME_EPSILON: f64 = 1e-9;

/// Duration left after trimming, never negative.
pub fn effective_duration(duration: f64, trim_start: f64, trim_end: f64) -> f64 {
    (duration - trim_start - trim_end).max(0.0)
}

/// Whether a trim pair is acceptable for an element of `duration`.
pub fn is_valid_trim(duration: f64, trim_start: f64, trim_end: f64) -> bool {
    trim_start.is_finite()
        && trim_end.is_finite()
        && trim_start >= 0.0
        && trim_end >= 0.0
        && trim_start + trim_end <= duration + TIME_EPSILON
}

/// Frame index containing time `secs` (floor).
pub fn time_to_frame(secs: f64, fps: u32) -> u64 {
    if fps == 0 || secs <= 0.0 {
        return 0;
    }
    (secs * fps as f64 + TIME_EPSILON).floor() as u64
}

/// Start time of frame `frame`.
pub fn frame_to_time(frame: u64, fps: u32) -> f64 {
    if fps == 0 {
        return 0.0;
    }
    frame as f64 / fps as f64
}

/// Snap a time to the nearest frame boundary.
pub fn snap_time_to_frame(secs: f64, fps: u32) -> f64 {
    if fps == 0 {
        return secs;
    }
    ((secs * fps as f64).round() / fps as f64).max(0.0)
}

/// Number of frames needed to cover `duration_secs` (ceil).
pub fn frame_count(duration_secs: f64, fps: u32) -> u64 {
    if fps == 0 || duration_secs <= 0.0 {
        return 0;
    }
    (duration_secs * fps as f64 - TIME_EPSILON).ceil().max(0.0) as u64
}

/// Output frames during which a span `[start, start + effective)` is
/// visible: `[floor(start * fps), ceil((start + effective) * fps))`.
pub fn active_frame_range(start_secs: f64, effective_secs: f64, fps: u32) -> Range<u64> {
    if fps == 0 || effective_secs <= 0.0 {
        let f = time_to_frame(start_secs, fps);
        return f..f;
    }
    let first = time_to_frame(start_secs, fps);
    let end = frame_count(start_secs + effective_secs, fps);
    first..end.max(first)
}

/// Approximate equality for times.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_effective_duration_clamps_to_zero() {
        assert_eq!(effective_duration(10.0, 2.0, 3.0), 5.0);
        assert_eq!(effective_duration(10.0, 6.0, 6.0), 0.0);
    }

    #[test]
    fn test_trim_validation() {
        assert!(is_valid_trim(10.0, 0.0, 0.0));
        assert!(is_valid_trim(10.0, 4.0, 6.0));
        assert!(!is_valid_trim(10.0, 6.0, 6.0));
        assert!(!is_valid_trim(10.0, -1.0, 0.0));
        assert!(!is_valid_trim(10.0, f64::NAN, 0.0));
    }

    #[test]
    fn test_frame_conversion_tolerates_float_noise() {
        assert_eq!(time_to_frame(0.1, 30), 3);
        assert_eq!(frame_count(0.1, 30), 3);
        assert_eq!(frame_count(15.0, 30), 450);
        assert_eq!(frame_count(0.0, 30), 0);
        assert_eq!(frame_to_time(45, 30), 1.5);
    }

    #[test]
    fn test_snap_time_to_frame() {
        assert!(approx_eq(snap_time_to_frame(1.01, 30), 1.0));
        assert!(approx_eq(snap_time_to_frame(1.02, 30), 1.0 + 1.0 / 30.0));
        assert_eq!(snap_time_to_frame(1.234, 0), 1.234);
    }

    #[test]
    fn test_active_frame_range() {
        assert_eq!(active_frame_range(5.0, 10.0, 30), 150..450);
        assert_eq!(active_frame_range(0.5, 0.25, 10), 5..8);
        assert!(active_frame_range(2.0, 0.0, 30).is_empty());
    }

    proptest! {
        #[test]
        fn effective_duration_is_never_negative(
            duration in 0.0f64..1000.0,
            trim_start in 0.0f64..1000.0,
            trim_end in 0.0f64..1000.0,
        ) {
            let eff = effective_duration(duration, trim_start, trim_end);
            prop_assert!(eff >= 0.0);
            prop_assert!(eff <= duration);
            if trim_start + trim_end <= duration {
                prop_assert!((eff - (duration - trim_start - trim_end)).abs() < 1e-9);
            }
        }

        #[test]
        fn active_range_covers_span(start in 0.0f64..100.0, eff in 0.01f64..100.0, fps in 1u32..120) {
            let range = active_frame_range(start, eff, fps);
            prop_assert!(!range.is_empty());
            prop_assert!(frame_to_time(range.start, fps) <= start + 1e-6);
            prop_assert!(frame_to_time(range.end, fps) + 1e-6 >= start + eff);
        }
    }
}
