//! Session metric derivation
//!
//! This module derives scalar metrics and path views from a cleaned fixation
//! sequence and the IDE context table:
//! - Size and whitespace incidence
//! - Completion time from IDE timestamp bounds
//! - Positional variance
//! - Gaze and fixation paths, top-N reads

use crate::error::GazeError;
use crate::types::{
    FixationEvent, FixationStep, GazeStep, IdeContextEvent, NormalizedFixations, RankedDuration,
    SessionMetrics,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Microseconds per second; fixation start times are in microseconds, durations in seconds
const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Deriver for per-session scalar metrics
pub struct MetricsDeriver;

impl MetricsDeriver {
    /// Derive metrics for a normalized session.
    ///
    /// Completion time is left empty when the IDE table has no samples; the
    /// caller decides whether to report the gap. A non-positive tick rate is
    /// an error.
    pub fn derive(
        normalized: &NormalizedFixations,
        ide_context: &[IdeContextEvent],
        ide_ticks_per_second: i64,
    ) -> Result<SessionMetrics, GazeError> {
        let position_variance = position_variance(&normalized.events)?;
        let completion_seconds = match completion_seconds(ide_context, ide_ticks_per_second) {
            Ok(seconds) => Some(seconds),
            Err(GazeError::InsufficientData(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(SessionMetrics {
            total_size: normalized.events.len(),
            whitespace_count: normalized.whitespace_count,
            whitespace_ratio: normalized.whitespace_ratio(),
            completion_seconds,
            position_variance,
        })
    }
}

/// Whole seconds between the first and last IDE sample.
///
/// Timestamps are epoch ticks, `ide_ticks_per_second` per second (1000 for
/// the recorder's milliseconds).
pub fn completion_seconds(
    ide_context: &[IdeContextEvent],
    ide_ticks_per_second: i64,
) -> Result<i64, GazeError> {
    if ide_ticks_per_second <= 0 {
        return Err(GazeError::ParseError(format!(
            "ide_ticks_per_second must be positive, got {ide_ticks_per_second}"
        )));
    }

    let min = ide_context.iter().map(|e| e.timestamp).min();
    let max = ide_context.iter().map(|e| e.timestamp).max();

    let (Some(min), Some(max)) = (min, max) else {
        return Err(GazeError::InsufficientData(
            "ide_context table is empty".to_string(),
        ));
    };

    let ticks = i128::from(ide_ticks_per_second);
    let to_datetime = |ts: i64| {
        let millis = (i128::from(ts) * 1000 / ticks) as i64;
        DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            GazeError::InsufficientData(format!("timestamp {ts} is out of range"))
        })
    };

    let elapsed = to_datetime(max)? - to_datetime(min)?;
    Ok(elapsed.num_seconds())
}

/// Population variance of line plus population variance of column
pub fn position_variance(events: &[FixationEvent]) -> Result<f64, GazeError> {
    if events.is_empty() {
        return Err(GazeError::InsufficientData(
            "variance of an empty fixation sequence".to_string(),
        ));
    }

    let lines: Vec<f64> = events.iter().map(|e| e.line as f64).collect();
    let columns: Vec<f64> = events.iter().map(|e| e.column as f64).collect();
    Ok(population_variance(&lines) + population_variance(&columns))
}

fn population_variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// IDE samples in time order with per-step screen deltas
pub fn gaze_path(ide_context: &[IdeContextEvent]) -> Vec<GazeStep> {
    let mut samples = ide_context.to_vec();
    samples.sort_by_key(|e| e.timestamp);

    let mut steps = Vec::with_capacity(samples.len());
    let mut previous: Option<IdeContextEvent> = None;
    for sample in samples {
        let (dx, dy) = match previous {
            Some(prev) => (sample.x - prev.x, sample.y - prev.y),
            None => (0.0, 0.0),
        };
        steps.push(GazeStep {
            timestamp: sample.timestamp,
            x: sample.x,
            y: sample.y,
            dx,
            dy,
        });
        previous = Some(sample);
    }
    steps
}

/// Cleaned fixations in gaze order with deltas and overlap flags
pub fn fixation_path(events: &[FixationEvent]) -> Vec<FixationStep> {
    let mut ordered: Vec<&FixationEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.order_number);

    ordered
        .iter()
        .scan(None::<&FixationEvent>, |previous, event| {
            let step = match previous {
                Some(prev) => {
                    let prev_end = prev.start_time as f64 + prev.duration * MICROS_PER_SECOND;
                    FixationStep {
                        order_number: event.order_number,
                        line: event.line,
                        column: event.column,
                        duration: event.duration,
                        delta_line: event.line - prev.line,
                        delta_column: event.column - prev.column,
                        overlaps_previous: (event.start_time as f64) < prev_end,
                    }
                }
                None => FixationStep {
                    order_number: event.order_number,
                    line: event.line,
                    column: event.column,
                    duration: event.duration,
                    delta_line: 0,
                    delta_column: 0,
                    overlaps_previous: false,
                },
            };
            *previous = Some(*event);
            Some(step)
        })
        .collect()
}

/// Lines with the largest summed duration, ties broken by line number
pub fn top_lines(events: &[FixationEvent], n: usize) -> Vec<RankedDuration> {
    rank(events.iter().map(|e| (e.line, e.duration)), n)
}

/// Tokens with the largest summed duration
pub fn top_tokens(events: &[FixationEvent], n: usize) -> Vec<RankedDuration> {
    rank(events.iter().map(|e| (e.token.clone(), e.duration)), n)
}

/// Sum durations per key and keep the `n` largest, ties broken by key
pub fn rank<K: Ord + ToString>(
    entries: impl IntoIterator<Item = (K, f64)>,
    n: usize,
) -> Vec<RankedDuration> {
    let mut sums: BTreeMap<K, f64> = BTreeMap::new();
    for (key, duration) in entries {
        *sums.entry(key).or_insert(0.0) += duration;
    }

    let mut ranked: Vec<(K, f64)> = sums.into_iter().collect();
    // BTreeMap order is the tie-break; sort_by is stable
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(n)
        .map(|(key, duration)| RankedDuration {
            key: key.to_string(),
            duration,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixation;

    fn ide(timestamp: i64, x: f64, y: f64) -> IdeContextEvent {
        IdeContextEvent { timestamp, x, y }
    }

    fn make_test_normalized() -> NormalizedFixations {
        NormalizedFixations {
            events: vec![
                fixation(0, 1, 1, "int", 1.0),
                fixation(1, 2, 3, "x", 2.0),
                fixation(2, 3, 5, "=", 3.0),
            ],
            raw_count: 4,
            whitespace_count: 1,
        }
    }

    #[test]
    fn test_derive_metrics() {
        let normalized = make_test_normalized();
        let ide_context = vec![ide(1_700_000_000_000, 0.0, 0.0), ide(1_700_000_042_999, 1.0, 1.0)];

        let metrics = MetricsDeriver::derive(&normalized, &ide_context, 1000).unwrap();

        assert_eq!(metrics.total_size, 3);
        assert_eq!(metrics.whitespace_count, 1);
        assert!((metrics.whitespace_ratio - 0.25).abs() < 1e-9);
        // 42.999 s floors to 42
        assert_eq!(metrics.completion_seconds, Some(42));
        // var(1,2,3) = 2/3, var(1,3,5) = 8/3
        assert!((metrics.position_variance - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_completion_without_ide_samples() {
        let result = completion_seconds(&[], 1000);
        assert!(matches!(result, Err(GazeError::InsufficientData(_))));

        let metrics = MetricsDeriver::derive(&make_test_normalized(), &[], 1000).unwrap();
        assert_eq!(metrics.completion_seconds, None);
    }

    #[test]
    fn test_completion_ignores_sample_order() {
        let ide_context = vec![ide(5_000, 0.0, 0.0), ide(1_000, 0.0, 0.0), ide(3_500, 0.0, 0.0)];
        assert_eq!(completion_seconds(&ide_context, 1000).unwrap(), 4);
    }

    #[test]
    fn test_non_positive_tick_rate_is_rejected() {
        let ide_context = vec![ide(0, 0.0, 0.0), ide(5_000, 0.0, 0.0)];

        assert!(matches!(
            completion_seconds(&ide_context, 0),
            Err(GazeError::ParseError(_))
        ));
        assert!(matches!(
            MetricsDeriver::derive(&make_test_normalized(), &ide_context, -1000),
            Err(GazeError::ParseError(_))
        ));
    }

    #[test]
    fn test_variance_single_event_is_zero() {
        let events = vec![fixation(0, 7, 9, "a", 1.0)];
        assert_eq!(position_variance(&events).unwrap(), 0.0);
        assert!(position_variance(&[]).is_err());
    }

    #[test]
    fn test_gaze_path_deltas() {
        let path = gaze_path(&[ide(20, 5.0, 5.0), ide(10, 1.0, 2.0), ide(30, 4.0, 9.0)]);

        assert_eq!(path.len(), 3);
        assert_eq!((path[0].dx, path[0].dy), (0.0, 0.0));
        assert_eq!((path[1].dx, path[1].dy), (4.0, 3.0));
        assert_eq!((path[2].dx, path[2].dy), (-1.0, 4.0));
    }

    #[test]
    fn test_fixation_path_overlap() {
        let mut a = fixation(0, 1, 1, "a", 0.5);
        a.start_time = 0;
        let mut b = fixation(1, 2, 4, "b", 0.5);
        // Starts before a ends at 500_000
        b.start_time = 400_000;
        let mut c = fixation(2, 2, 6, "c", 0.5);
        c.start_time = 1_000_000;

        let path = fixation_path(&[a, b, c]);

        assert!(!path[0].overlaps_previous);
        assert!(path[1].overlaps_previous);
        assert_eq!((path[1].delta_line, path[1].delta_column), (1, 3));
        assert!(!path[2].overlaps_previous);
    }

    #[test]
    fn test_top_lines_and_tokens() {
        let events = vec![
            fixation(0, 1, 1, "a", 1.0),
            fixation(1, 2, 1, "b", 2.5),
            fixation(2, 1, 3, "b", 2.0),
            fixation(3, 3, 1, "c", 0.5),
        ];

        let lines = top_lines(&events, 2);
        assert_eq!(lines[0].key, "1");
        assert!((lines[0].duration - 3.0).abs() < 1e-9);
        assert_eq!(lines[1].key, "2");

        let tokens = top_tokens(&events, 5);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].key, "b");
        assert!((tokens[0].duration - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_top_lines_ties_in_numeric_order() {
        let events = vec![
            fixation(0, 10, 1, "a", 1.0),
            fixation(1, 9, 1, "b", 1.0),
            fixation(2, 100, 1, "c", 1.0),
        ];

        let keys: Vec<String> = top_lines(&events, 3).into_iter().map(|r| r.key).collect();

        assert_eq!(keys, vec!["9", "10", "100"]);
    }

    #[test]
    fn test_rank_ties_by_key() {
        let ranked = rank(
            vec![("z".to_string(), 1.0), ("a".to_string(), 1.0)],
            2,
        );
        assert_eq!(ranked[0].key, "a");
        assert_eq!(ranked[1].key, "z");
    }
}
