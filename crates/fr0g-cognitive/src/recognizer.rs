//! Pattern recognition over labeled data streams.
//!
//! Four detectors run over a bounded window per stream: frequency, sequence
//! (recurring n-grams), anomaly (3-sigma outliers on numeric streams), and
//! trend (linear regression). A detection is published only when its
//! confidence clears the configured threshold, and pattern identity is
//! stable: re-detecting the same shape refreshes `last_seen` and
//! `frequency_count` instead of inserting a duplicate.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::types::{CognitiveConfig, Pattern, PatternKind};

/// Minimum absolute count for a frequency pattern.
const FREQUENCY_MIN_COUNT: usize = 5;
/// Minimum relative frequency for a frequency pattern.
const FREQUENCY_MIN_RATIO: f64 = 0.3;
/// N-gram lengths scanned by the sequence detector.
const SEQUENCE_NGRAM_RANGE: std::ops::RangeInclusive<usize> = 2..=4;
/// Minimum recurrences of one n-gram.
const SEQUENCE_MIN_REPEATS: usize = 3;
/// Sigma multiplier for the anomaly detector.
const ANOMALY_SIGMA: f64 = 3.0;
/// Normalised-slope threshold for the trend detector.
const TREND_MIN_SLOPE: f64 = 0.2;

#[derive(Debug, Clone)]
struct DataPoint {
    label: String,
    repr: String,
    numeric: Option<f64>,
}

struct RecognizerState {
    streams: HashMap<String, VecDeque<DataPoint>>,
    patterns: HashMap<String, Pattern>,
}

/// Thread-safe recognizer shared by the cognitive engine and the workflow
/// engine's analysis steps.
pub struct PatternRecognizer {
    config: CognitiveConfig,
    state: RwLock<RecognizerState>,
}

impl PatternRecognizer {
    pub fn new(config: CognitiveConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RecognizerState {
                streams: HashMap::new(),
                patterns: HashMap::new(),
            }),
        }
    }

    /// Ingest one labeled point and run all detectors over the stream's
    /// window. Returns the ids of patterns emitted or refreshed by this call.
    pub fn add_data_point(
        &self,
        stream: &str,
        label: &str,
        value: Value,
        _metadata: &serde_json::Map<String, Value>,
    ) -> Vec<String> {
        let point = DataPoint {
            label: label.to_string(),
            repr: value_repr(&value),
            numeric: value.as_f64(),
        };

        let mut state = self.state.write().unwrap();
        let window_size = self.config.window_size;
        let window = state.streams.entry(stream.to_string()).or_default();
        window.push_back(point);
        while window.len() > window_size {
            window.pop_front();
        }
        let window: Vec<DataPoint> = window.iter().cloned().collect();

        let mut detections = Vec::new();
        detections.extend(detect_frequency(stream, &window));
        detections.extend(detect_sequences(stream, &window));
        detections.extend(detect_anomaly(stream, &window));
        detections.extend(detect_trend(stream, &window));

        let mut touched = Vec::new();
        for detection in detections {
            // Threshold gate runs before insertion so the public set never
            // holds a below-threshold pattern.
            if detection.confidence < self.config.pattern_confidence_threshold {
                continue;
            }
            touched.push(detection.id.clone());
            let now = Utc::now();
            match state.patterns.get_mut(&detection.id) {
                Some(existing) => {
                    existing.last_seen = now;
                    existing.frequency_count += 1;
                    existing.confidence = detection.confidence;
                }
                None => {
                    debug!(id = %detection.id, kind = %detection.kind, "new pattern");
                    state.patterns.insert(detection.id.clone(), detection);
                }
            }
        }

        // LRU cap: evict the pattern seen longest ago.
        while state.patterns.len() > self.config.max_patterns {
            let victim = state
                .patterns
                .values()
                .min_by_key(|p| p.last_seen)
                .map(|p| p.id.clone());
            match victim {
                Some(id) => {
                    state.patterns.remove(&id);
                }
                None => break,
            }
        }

        touched
    }

    /// Snapshot of the public pattern set.
    pub fn patterns(&self) -> Vec<Pattern> {
        self.state.read().unwrap().patterns.values().cloned().collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.state.read().unwrap().patterns.len()
    }

    /// True when any public pattern has the given kind.
    pub fn has_kind(&self, kind: PatternKind) -> bool {
        self.state
            .read()
            .unwrap()
            .patterns
            .values()
            .any(|p| p.kind == kind)
    }
}

fn value_repr(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn make_pattern(id: String, kind: PatternKind, description: String, confidence: f64, context: &str) -> Pattern {
    let now = Utc::now();
    Pattern {
        id,
        kind,
        description,
        confidence,
        frequency_count: 1,
        context: context.to_string(),
        created_at: now,
        last_seen: now,
    }
}

/// A value covering ≥30 % of the window with ≥5 occurrences.
fn detect_frequency(stream: &str, window: &[DataPoint]) -> Vec<Pattern> {
    if window.is_empty() {
        return Vec::new();
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for point in window {
        *counts.entry(point.repr.as_str()).or_default() += 1;
    }
    let total = window.len() as f64;
    counts
        .into_iter()
        .filter_map(|(repr, count)| {
            let ratio = count as f64 / total;
            if count >= FREQUENCY_MIN_COUNT && ratio >= FREQUENCY_MIN_RATIO {
                Some(make_pattern(
                    format!("frequency:{stream}:{repr}"),
                    PatternKind::Frequency,
                    format!("'{repr}' covers {:.0}% of recent '{stream}' data", ratio * 100.0),
                    (ratio * 2.0).min(1.0),
                    stream,
                ))
            } else {
                None
            }
        })
        .collect()
}

/// An n-gram (length 2..4) of labels recurring at least 3 times.
fn detect_sequences(stream: &str, window: &[DataPoint]) -> Vec<Pattern> {
    let labels: Vec<&str> = window.iter().map(|p| p.label.as_str()).collect();
    let mut out = Vec::new();
    for n in SEQUENCE_NGRAM_RANGE {
        if labels.len() < n {
            continue;
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        for gram in labels.windows(n) {
            *counts.entry(gram.join("→")).or_default() += 1;
        }
        for (gram, count) in counts {
            if count >= SEQUENCE_MIN_REPEATS {
                out.push(make_pattern(
                    format!("sequence:{stream}:{gram}"),
                    PatternKind::Sequence,
                    format!("sequence [{gram}] recurred {count} times on '{stream}'"),
                    (count as f64 * 0.25).min(1.0),
                    stream,
                ));
            }
        }
    }
    out
}

/// The newest numeric point sitting more than 3σ from the window mean.
fn detect_anomaly(stream: &str, window: &[DataPoint]) -> Vec<Pattern> {
    let values: Vec<f64> = window.iter().filter_map(|p| p.numeric).collect();
    if values.len() < 5 {
        return Vec::new();
    }
    let latest = *values.last().unwrap();
    let history = &values[..values.len() - 1];
    let mean = history.iter().sum::<f64>() / history.len() as f64;
    let variance =
        history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / history.len() as f64;
    let sigma = variance.sqrt();
    if sigma <= f64::EPSILON {
        return Vec::new();
    }
    let z = (latest - mean).abs() / sigma;
    if z > ANOMALY_SIGMA {
        vec![make_pattern(
            format!("anomaly:{stream}:{latest}"),
            PatternKind::Anomaly,
            format!("value {latest} deviates {z:.1}σ from mean {mean:.2} on '{stream}'"),
            (z / 4.0).min(1.0),
            stream,
        )]
    } else {
        Vec::new()
    }
}

/// A sustained directional move: |slope| × window / range > 0.2.
fn detect_trend(stream: &str, window: &[DataPoint]) -> Vec<Pattern> {
    let values: Vec<f64> = window.iter().filter_map(|p| p.numeric).collect();
    if values.len() < 5 {
        return Vec::new();
    }
    let (slope, r_squared) = linear_regression(&values);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= f64::EPSILON {
        return Vec::new();
    }
    let normalized = slope.abs() * values.len() as f64 / range;
    if normalized > TREND_MIN_SLOPE {
        let direction = if slope > 0.0 { "rising" } else { "falling" };
        vec![make_pattern(
            format!("trend:{stream}:{direction}"),
            PatternKind::Trend,
            format!("'{stream}' is {direction} (slope {slope:.3}, R² {r_squared:.2})"),
            r_squared,
            stream,
        )]
    } else {
        Vec::new()
    }
}

/// Least-squares fit over indices 0..n. Returns (slope, R²).
fn linear_regression(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        ss_xy += dx * dy;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
    }
    if ss_xx <= f64::EPSILON || ss_yy <= f64::EPSILON {
        return (0.0, 0.0);
    }
    let slope = ss_xy / ss_xx;
    let r_squared = (ss_xy * ss_xy) / (ss_xx * ss_yy);
    (slope, r_squared)
}
