//! Whitespace normalization
//!
//! Fixations recorded on whitespace carry real reading time but no token. This
//! module removes them and hands their duration to a neighbouring fixation:
//! - Last event folds into its predecessor, first event into its successor
//! - Interior events compare signed line+column offsets to both neighbours
//! - All folds are decided against the untouched sequence, then removed at once

use crate::error::GazeError;
use crate::types::{FixationEvent, NormalizedFixations};

/// Which neighbour receives a whitespace fixation's duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FoldDirection {
    Previous,
    Next,
}

impl FoldDirection {
    fn opposite(self) -> Self {
        match self {
            FoldDirection::Previous => FoldDirection::Next,
            FoldDirection::Next => FoldDirection::Previous,
        }
    }
}

/// Normalizer removing whitespace fixations while conserving total duration
pub struct WhitespaceNormalizer;

impl WhitespaceNormalizer {
    /// Fold every whitespace fixation into a neighbour and drop it.
    ///
    /// `events` must be ordered by `order_number`. Fails with
    /// `InsufficientData` when no non-whitespace fixation exists, since there
    /// is nowhere to put the whitespace mass.
    pub fn normalize(
        events: Vec<FixationEvent>,
        sentinel: &str,
    ) -> Result<NormalizedFixations, GazeError> {
        let raw_count = events.len();
        let is_whitespace: Vec<bool> = events.iter().map(|e| e.is_token(sentinel)).collect();
        let whitespace_count = is_whitespace.iter().filter(|ws| **ws).count();

        if whitespace_count == raw_count {
            return Err(GazeError::InsufficientData(format!(
                "{raw_count} fixations, none outside whitespace"
            )));
        }

        let mut durations: Vec<f64> = events.iter().map(|e| e.duration).collect();

        for idx in (0..raw_count).filter(|&i| is_whitespace[i]) {
            let direction = fold_direction(&events, idx);
            // At least one survivor exists, so one of the two directions has it
            let target = nearest_survivor(&is_whitespace, idx, direction)
                .or_else(|| nearest_survivor(&is_whitespace, idx, direction.opposite()));

            if let Some(target) = target {
                durations[target] += events[idx].duration;
            }
        }

        let events = events
            .into_iter()
            .zip(durations)
            .zip(is_whitespace)
            .filter(|(_, ws)| !ws)
            .map(|((mut event, duration), _)| {
                event.duration = duration;
                event
            })
            .collect();

        Ok(NormalizedFixations {
            events,
            raw_count,
            whitespace_count,
        })
    }
}

/// Decide the receiving side for the whitespace fixation at `idx`.
///
/// The offsets are signed sums of line and column differences. The next
/// neighbour wins only when the previous offset is strictly larger.
fn fold_direction(events: &[FixationEvent], idx: usize) -> FoldDirection {
    if idx + 1 == events.len() {
        return FoldDirection::Previous;
    }
    if idx == 0 {
        return FoldDirection::Next;
    }

    let cur = &events[idx];
    let next = &events[idx + 1];
    let prev = &events[idx - 1];

    let upper_distance = (next.line - cur.line) + (next.column - cur.column);
    let lower_distance = (prev.line - cur.line) + (prev.column - cur.column);

    if lower_distance > upper_distance {
        FoldDirection::Next
    } else {
        FoldDirection::Previous
    }
}

fn nearest_survivor(is_whitespace: &[bool], idx: usize, direction: FoldDirection) -> Option<usize> {
    match direction {
        FoldDirection::Previous => (0..idx).rev().find(|&i| !is_whitespace[i]),
        FoldDirection::Next => (idx + 1..is_whitespace.len()).find(|&i| !is_whitespace[i]),
    }
}
