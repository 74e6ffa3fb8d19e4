//! Conversion between continuous time and discrete sample frames.
//!
//! Times are seconds (`f64`), frames are sample indices at a fixed sampling
//! rate. Lower bounds round down and upper bounds round up, so a closed time
//! range never loses the frames sitting on its edges. Windows are half-open:
//! `start` inclusive, `end` exclusive.

use crate::util::{Error, Result};

/// Discrete sample index.
pub type Frame = i64;

/// Continuous time in seconds.
pub type Seconds = f64;

/// Products within this many ULPs of an integer are snapped onto it before
/// rounding, so `0.3 * 10.0` is frame 3 under both policies. The tolerance
/// only absorbs floating-point noise; real fractions of a frame are kept.
pub const FRAME_SNAP_ULPS: f64 = 4.0;

/// Rounding policy for a time-to-frame conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameRounding {
    /// Round down. Used for lower bounds and event times.
    #[default]
    Floor,
    /// Round up. Used for upper bounds.
    Ceil,
}

/// Convert a time to a frame index at `sampling_rate` Hz.
pub fn to_frame(time: Seconds, sampling_rate: f64, rounding: FrameRounding) -> Frame {
    let exact = time * sampling_rate;
    let nearest = exact.round();
    if (exact - nearest).abs() <= FRAME_SNAP_ULPS * f64::EPSILON * exact.abs().max(1.0) {
        return nearest as Frame;
    }
    match rounding {
        FrameRounding::Floor => exact.floor() as Frame,
        FrameRounding::Ceil => exact.ceil() as Frame,
    }
}

/// Convert a frame index back to seconds.
#[inline]
pub fn to_seconds(frame: Frame, sampling_rate: f64) -> Seconds {
    frame as f64 / sampling_rate
}

/// Requested frame range; `None` on either side means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameWindow {
    pub start: Option<Frame>,
    pub end: Option<Frame>,
}

impl FrameWindow {
    /// The unbounded window.
    pub const ALL: Self = Self { start: None, end: None };

    pub fn new(start: Option<Frame>, end: Option<Frame>) -> Self {
        Self { start, end }
    }

    /// Window `[start, end)`.
    pub fn between(start: Frame, end: Frame) -> Self {
        Self { start: Some(start), end: Some(end) }
    }

    /// Check if neither side is bounded.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Keep the frames inside this window, with unbounded sides open.
    pub fn select(&self, frames: &[Frame]) -> Vec<Frame> {
        frames
            .iter()
            .copied()
            .filter(|&f| self.start.map_or(true, |s| f >= s) && self.end.map_or(true, |e| f < e))
            .collect()
    }

    /// Clamp this window to a unit's own bounds and keep the frames inside.
    ///
    /// When the requested end was omitted or clamped, frames equal to
    /// `max_frame` are kept: the bound is already a ceiling.
    pub fn select_clamped(&self, frames: &[Frame], min_frame: Frame, max_frame: Frame) -> Result<Vec<Frame>> {
        let (start, end) = clamp_window(self.start, self.end, min_frame, max_frame)?;
        let open_end = self.end.map_or(true, |e| e > max_frame);
        Ok(frames
            .iter()
            .copied()
            .filter(|&f| f >= start && (f < end || (open_end && f <= end)))
            .collect())
    }
}

/// Clamp a requested window to `[min_frame, max_frame]`.
///
/// A missing or out-of-range side is replaced by the bound. Fails with
/// [`Error::InvalidWindow`] when nothing of the request overlaps the bounds.
pub fn clamp_window(
    requested_start: Option<Frame>,
    requested_end: Option<Frame>,
    min_frame: Frame,
    max_frame: Frame,
) -> Result<(Frame, Frame)> {
    let start = match requested_start {
        Some(s) if s >= min_frame => s,
        _ => min_frame,
    };
    let end = match requested_end {
        Some(e) if e <= max_frame => e,
        _ => max_frame,
    };
    if start > max_frame || end < min_frame {
        return Err(Error::InvalidWindow {
            start: requested_start,
            end: requested_end,
            min: min_frame,
            max: max_frame,
        });
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_policy() {
        assert_eq!(to_frame(0.25, 10.0, FrameRounding::Floor), 2);
        assert_eq!(to_frame(0.25, 10.0, FrameRounding::Ceil), 3);
        assert_eq!(to_frame(0.3, 10.0, FrameRounding::Floor), 3);
        assert_eq!(to_frame(0.3, 10.0, FrameRounding::Ceil), 3);
        assert_eq!(to_frame(1.0, 30000.0, FrameRounding::Ceil), 30000);
        assert_eq!(to_frame(12345.0 / 30000.0, 30000.0, FrameRounding::Floor), 12345);
    }

    #[test]
    fn test_long_recordings_keep_floor_and_ceil() {
        // Non-integer products hours into a 30 kHz recording
        let t = 20000.0000233;
        assert_eq!(to_frame(t, 30000.0, FrameRounding::Floor), 600_000_000);
        assert_eq!(to_frame(t, 30000.0, FrameRounding::Ceil), 600_000_001);
        let t = (1e8 + 0.95) / 30000.0;
        assert_eq!(to_frame(t, 30000.0, FrameRounding::Floor), 100_000_000);
        assert_eq!(to_frame(t, 30000.0, FrameRounding::Ceil), 100_000_001);
        let t = (3e8 + 0.25) / 30000.0;
        assert_eq!(to_frame(t, 30000.0, FrameRounding::Floor), 300_000_000);

        // Exact frames still survive the seconds round trip
        for frame in [100_000_000_i64, 300_000_007, 599_999_999, 600_000_001] {
            let t = to_seconds(frame, 30000.0);
            assert_eq!(to_frame(t, 30000.0, FrameRounding::Floor), frame);
            assert_eq!(to_frame(t, 30000.0, FrameRounding::Ceil), frame);
        }
    }

    #[test]
    fn test_clamp_open() {
        assert_eq!(clamp_window(None, None, 10, 90).unwrap(), (10, 90));
    }

    #[test]
    fn test_clamp_overhanging() {
        assert_eq!(clamp_window(Some(5), Some(95), 10, 90).unwrap(), (10, 90));
        assert_eq!(clamp_window(Some(20), Some(30), 10, 90).unwrap(), (20, 30));
    }

    #[test]
    fn test_clamp_outside() {
        let err = clamp_window(Some(100), Some(200), 10, 90).unwrap_err();
        assert!(matches!(err, Error::InvalidWindow { min: 10, max: 90, .. }));
        assert!(clamp_window(Some(0), Some(5), 10, 90).is_err());
    }

    #[test]
    fn test_select_clamped_keeps_last_frame() {
        let frames = [10, 20, 30];
        let w = FrameWindow::ALL;
        assert_eq!(w.select_clamped(&frames, 10, 30).unwrap(), vec![10, 20, 30]);

        let w = FrameWindow::new(Some(15), Some(30));
        assert_eq!(w.select_clamped(&frames, 10, 30).unwrap(), vec![20]);

        let w = FrameWindow::new(Some(15), Some(1000));
        assert_eq!(w.select_clamped(&frames, 10, 30).unwrap(), vec![20, 30]);
    }

    #[test]
    fn test_select_half_open() {
        let frames = [0, 5, 10, 15];
        assert_eq!(FrameWindow::between(5, 15).select(&frames), vec![5, 10]);
        assert_eq!(FrameWindow::new(Some(10), None).select(&frames), vec![10, 15]);
        assert_eq!(FrameWindow::ALL.select(&frames), frames.to_vec());
    }
}
