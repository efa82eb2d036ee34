//! Pitch tracking for checking what a shift actually did.
//!
//! A YIN-style period search over short frames, reduced to one median
//! frequency per clip. Comparing the medians of an original and its
//! rendering gives the interval the transform produced.

/// Search band for the fundamental.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    min_hz: f64,
    max_hz: f64,
}

impl FrequencyRange {
    /// Sung and hummed melody, with room for an octave either way.
    pub const VOICE: FrequencyRange = FrequencyRange {
        min_hz: 80.0,
        max_hz: 1000.0,
    };

    /// `None` unless `0 < min_hz < max_hz` and both are finite.
    pub fn new(min_hz: f64, max_hz: f64) -> Option<Self> {
        if min_hz.is_finite() && max_hz.is_finite() && min_hz > 0.0 && min_hz < max_hz {
            Some(FrequencyRange { min_hz, max_hz })
        } else {
            None
        }
    }

    pub fn min_hz(&self) -> f64 {
        self.min_hz
    }

    pub fn max_hz(&self) -> f64 {
        self.max_hz
    }
}

/// Reusable detector bound to one sample rate and range. The difference
/// buffers are allocated once.
pub struct PitchTracker {
    sample_rate: f64,
    shortest: usize,
    longest: usize,
    threshold: f64,
    difference: Vec<f64>,
    normalized: Vec<f64>,
}

impl PitchTracker {
    pub fn new(sample_rate: u32, range: FrequencyRange) -> Self {
        let sample_rate = f64::from(sample_rate.max(1));
        let shortest = ((sample_rate / range.max_hz).ceil() as usize).max(2);
        let longest = ((sample_rate / range.min_hz).floor() as usize).max(shortest + 2);
        PitchTracker {
            sample_rate,
            shortest,
            longest,
            threshold: 0.1,
            difference: vec![0.0; longest + 1],
            normalized: vec![0.0; longest + 1],
        }
    }

    /// Samples one analysis frame needs: two of the longest periods.
    pub fn frame_len(&self) -> usize {
        self.longest * 2
    }

    /// Fundamental of one frame, or `None` if the frame is too short,
    /// silent or not periodic enough.
    pub fn frequency(&mut self, frame: &[f32]) -> Option<f64> {
        if frame.len() < self.frame_len() {
            return None;
        }
        let span = self.longest;

        for lag in 1..=span {
            self.difference[lag] = frame[..span]
                .iter()
                .zip(&frame[lag..lag + span])
                .map(|(&a, &b)| {
                    let d = f64::from(a - b);
                    d * d
                })
                .sum();
        }

        // Cumulative mean normalisation keeps short lags from winning
        self.normalized[0] = 1.0;
        let mut total = 0.0;
        for lag in 1..=span {
            total += self.difference[lag];
            self.normalized[lag] = if total > 0.0 {
                self.difference[lag] * lag as f64 / total
            } else {
                1.0
            };
        }

        let mut lag = (self.shortest..span).find(|&l| self.normalized[l] < self.threshold)?;
        while lag + 1 < span && self.normalized[lag + 1] < self.normalized[lag] {
            lag += 1;
        }

        Some(self.sample_rate / self.refine(lag))
    }

    /// Vertex of the parabola through the dip and its neighbours.
    fn refine(&self, lag: usize) -> f64 {
        let (a, b, c) = (
            self.normalized[lag - 1],
            self.normalized[lag],
            self.normalized[lag + 1],
        );
        let curvature = a - 2.0 * b + c;
        if curvature.abs() < f64::EPSILON {
            lag as f64
        } else {
            lag as f64 + 0.5 * (a - c) / curvature
        }
    }

    /// Median fundamental over back-to-back frames from the middle half of
    /// `samples`, away from onsets and render edges.
    pub fn median_frequency(&mut self, samples: &[f32]) -> Option<f64> {
        let frame_len = self.frame_len();
        if samples.len() < frame_len {
            return None;
        }

        let mut start = samples.len() / 4;
        let end = (samples.len() * 3 / 4).max(start + frame_len).min(samples.len());
        if end - start < frame_len {
            start = end - frame_len;
        }

        let mut found: Vec<f64> = samples[start..end]
            .chunks_exact(frame_len)
            .filter_map(|frame| self.frequency(frame))
            .collect();
        if found.is_empty() {
            return None;
        }
        found.sort_by(f64::total_cmp);
        Some(found[found.len() / 2])
    }
}

/// Interval from `from_hz` to `to_hz` in cents.
pub fn cents_between(from_hz: f64, to_hz: f64) -> f64 {
    1200.0 * (to_hz / from_hz).log2()
}

/// Interval from `original` to `rendered` in cents, both at `sample_rate`.
/// `None` if either has no clear pitch in `range`.
pub fn measure_interval(
    original: &[f32],
    rendered: &[f32],
    sample_rate: u32,
    range: FrequencyRange,
) -> Option<f64> {
    let mut tracker = PitchTracker::new(sample_rate, range);
    let from = tracker.median_frequency(original)?;
    let to = tracker.median_frequency(rendered)?;
    Some(cents_between(from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq: f64, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (0.5 * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin()) as f32)
            .collect()
    }

    #[test]
    fn range_rejects_degenerate_bounds() {
        assert!(FrequencyRange::new(0.0, 1000.0).is_none());
        assert!(FrequencyRange::new(-50.0, 1000.0).is_none());
        assert!(FrequencyRange::new(f64::NAN, 1000.0).is_none());
        assert!(FrequencyRange::new(100.0, f64::INFINITY).is_none());
        assert!(FrequencyRange::new(500.0, 200.0).is_none());
        assert!(FrequencyRange::new(80.0, 1000.0).is_some());
    }

    #[test]
    fn single_frame_finds_fundamental() {
        let mut tracker = PitchTracker::new(44100, FrequencyRange::VOICE);
        let frame = tone(440.0, 44100, tracker.frame_len());
        let hz = tracker.frequency(&frame).unwrap();
        assert!((hz - 440.0).abs() < 1.0, "got {hz}");
    }

    #[test]
    fn median_over_clip() {
        let mut tracker = PitchTracker::new(16000, FrequencyRange::VOICE);
        let hz = tracker.median_frequency(&tone(196.0, 16000, 16000)).unwrap();
        assert!((hz - 196.0).abs() < 1.0, "got {hz}");
    }

    #[test]
    fn silence_and_short_input_have_no_pitch() {
        let mut tracker = PitchTracker::new(16000, FrequencyRange::VOICE);
        assert_eq!(tracker.median_frequency(&vec![0.0; 8000]), None);
        assert_eq!(tracker.median_frequency(&tone(440.0, 16000, 100)), None);
        assert_eq!(tracker.frequency(&[]), None);
    }

    #[test]
    fn clip_just_one_frame_long() {
        let mut tracker = PitchTracker::new(8000, FrequencyRange::VOICE);
        let clip = tone(250.0, 8000, tracker.frame_len());
        let hz = tracker.median_frequency(&clip).unwrap();
        assert!((hz - 250.0).abs() < 2.0, "got {hz}");
    }

    #[test]
    fn cents_of_common_intervals() {
        assert!((cents_between(220.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((cents_between(440.0, 220.0) + 1200.0).abs() < 1e-9);
        assert!(cents_between(300.0, 300.0).abs() < 1e-9);
    }

    #[test]
    fn fifth_between_two_clips() {
        let cents = measure_interval(
            &tone(300.0, 16000, 8000),
            &tone(450.0, 16000, 8000),
            16000,
            FrequencyRange::VOICE,
        )
        .unwrap();
        assert!((cents - 701.955).abs() < 5.0, "got {cents}");
    }
}
