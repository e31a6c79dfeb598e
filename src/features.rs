//! Derived feature computation
//!
//! Reduces the drained capture buffers to a fixed-shape vector of statistics.
//! Pure and deterministic: no I/O, and every statistic over an empty input is
//! 0 rather than NaN.

use crate::types::{FocusEvent, KeyClass, KeyEvent, KeyEventType, PointerSample, PointerSnapshot};
use serde::{Deserialize, Serialize};

/// Dwell times at or above this bound (ms) are discarded as noise
const MAX_DWELL_MS: i64 = 5_000;

/// Floor for the elapsed time between pointer samples (ms)
const MIN_POINTER_DT_MS: i64 = 1;

/// Per-session statistics sent alongside (or instead of) the raw events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    /// Mean key hold duration (ms)
    pub mean_dwell: f64,
    pub std_dwell: f64,
    /// Mean keydown-to-keydown interval (ms)
    pub mean_flight: f64,
    pub std_flight: f64,
    /// std(flight) / mean(flight), with a mean of 0 replaced by 1
    pub burstiness: f64,
    /// Backspace keydowns per keydown
    pub backspace_rate: f64,
    /// Standard deviation of pointer velocity (px/ms).
    ///
    /// Despite the name this is a spread measure of the velocity series, not a
    /// frequency-domain jitter estimate.
    pub mouse_jitter_score: f64,
    /// Mean pointer velocity (px/ms)
    pub mouse_mean_velocity: f64,
    pub focus_changes: u64,
    pub typing_event_count: u64,
    pub mouse_event_count: u64,
    pub click_count: u64,
}

/// Compute the derived features of one session
pub fn compute_derived_features(
    typing_events: &[KeyEvent],
    pointer: &PointerSnapshot,
    focus_events: &[FocusEvent],
) -> DerivedFeatures {
    let keydowns: Vec<&KeyEvent> = typing_events
        .iter()
        .filter(|e| e.event_type == KeyEventType::Keydown)
        .collect();
    let keyups: Vec<&KeyEvent> = typing_events
        .iter()
        .filter(|e| e.event_type == KeyEventType::Keyup)
        .collect();

    let dwells = dwell_times(&keydowns, &keyups);
    let flights = flight_times(&keydowns);
    let velocities = pointer_velocities(&pointer.samples);

    let mean_flight = mean(&flights);
    let std_flight = std_dev(&flights);

    let backspace_downs = keydowns
        .iter()
        .filter(|e| e.key_class == KeyClass::Backspace)
        .count();

    DerivedFeatures {
        mean_dwell: mean(&dwells),
        std_dwell: std_dev(&dwells),
        mean_flight,
        std_flight,
        burstiness: compute_burstiness(std_flight, mean_flight),
        backspace_rate: backspace_downs as f64 / keydowns.len().max(1) as f64,
        mouse_jitter_score: std_dev(&velocities),
        mouse_mean_velocity: mean(&velocities),
        focus_changes: focus_events.len() as u64,
        typing_event_count: typing_events.len() as u64,
        mouse_event_count: pointer.samples.len() as u64,
        click_count: pointer.clicks.len() as u64,
    }
}

/// Pair keydowns with keyups by a greedy sweep in arrival order.
///
/// A keyup earlier than the current keydown is skipped without consuming the
/// keydown. Pairs outside `[0, MAX_DWELL_MS)` are consumed but not reported.
fn dwell_times(keydowns: &[&KeyEvent], keyups: &[&KeyEvent]) -> Vec<f64> {
    let mut dwells = Vec::new();
    let (mut di, mut ui) = (0, 0);
    while di < keydowns.len() && ui < keyups.len() {
        let down = keydowns[di].t;
        let up = keyups[ui].t;
        if up >= down {
            let dwell = up.saturating_sub(down);
            if (0..MAX_DWELL_MS).contains(&dwell) {
                dwells.push(dwell as f64);
            }
            di += 1;
            ui += 1;
        } else {
            ui += 1;
        }
    }
    dwells
}

/// Interval between each keydown and the one before it
fn flight_times(keydowns: &[&KeyEvent]) -> Vec<f64> {
    keydowns
        .windows(2)
        .map(|pair| pair[1].t.saturating_sub(pair[0].t) as f64)
        .collect()
}

/// Euclidean speed between consecutive samples, px/ms
fn pointer_velocities(samples: &[PointerSample]) -> Vec<f64> {
    samples
        .windows(2)
        .map(|pair| {
            let dx = pair[1].x.saturating_sub(pair[0].x) as f64;
            let dy = pair[1].y.saturating_sub(pair[0].y) as f64;
            let dt = pair[1].t.saturating_sub(pair[0].t).max(MIN_POINTER_DT_MS) as f64;
            (dx * dx + dy * dy).sqrt() / dt
        })
        .collect()
}

fn compute_burstiness(std_flight: f64, mean_flight: f64) -> f64 {
    let denominator = if mean_flight == 0.0 { 1.0 } else { mean_flight };
    std_flight / denominator
}

/// Arithmetic mean; 0 for an empty series
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0 for an empty series
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
