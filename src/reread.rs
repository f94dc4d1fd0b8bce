//! Reread detection
//!
//! A reread is a backward saccade: a fixation on an earlier source line than
//! the one fixated just before it. Counts are tallied per region category of
//! the fixation that jumped back.

use crate::types::{JoinedFixation, RereadCounts};

/// Line value lower than any valid source line
const NO_PREVIOUS_LINE: i64 = i64::MIN;

/// Detector for backward gaze jumps over region-joined fixations
pub struct RereadDetector;

impl RereadDetector {
    /// Count rereads per category.
    ///
    /// `joined` is sorted by `order_number` first, so the scan follows gaze
    /// chronology rather than input order. Only strictly earlier lines count;
    /// staying on the same line is not a reread.
    pub fn detect(joined: &[JoinedFixation]) -> RereadCounts {
        let mut ordered: Vec<&JoinedFixation> = joined.iter().collect();
        ordered.sort_by_key(|f| f.order_number);

        let (counts, _) = ordered.into_iter().fold(
            (RereadCounts::new(), NO_PREVIOUS_LINE),
            |(mut counts, last_line), fixation| {
                if fixation.line < last_line {
                    *counts.entry(fixation.category.clone()).or_insert(0) += 1;
                }
                (counts, fixation.line)
            },
        );

        counts
    }

    /// Total rereads across categories
    pub fn total(counts: &RereadCounts) -> u32 {
        counts.values().sum()
    }
}
