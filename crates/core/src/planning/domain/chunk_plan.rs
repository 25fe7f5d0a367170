use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("invalid duration: total={total_duration}s, chunk_length={chunk_length}s")]
    InvalidDuration {
        total_duration: f64,
        chunk_length: f64,
    },
}

/// One `[start, end)` interval of the source timeline, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkSpan {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl ChunkSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Ordered, gap-free decomposition of `[0, total_duration)`.
///
/// `index` is the only ordering key used when merging results; spans are
/// contiguous (`spans[n].end == spans[n + 1].start`) and the last span ends
/// exactly at `total_duration`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkPlan {
    total_duration: f64,
    chunk_length: f64,
    spans: Vec<ChunkSpan>,
}

impl ChunkPlan {
    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChunkSpan> {
        self.spans.get(index)
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn chunk_length(&self) -> f64 {
        self.chunk_length
    }

    /// Offset to add to a chunk's local timestamps to place them on the
    /// source timeline.
    pub fn offset_of(&self, index: usize) -> Option<f64> {
        self.spans.get(index).map(|s| s.start)
    }
}

/// Splits a duration into fixed-length chunks; the last one is truncated.
pub struct ChunkPlanner;

impl ChunkPlanner {
    pub fn plan(total_duration: f64, chunk_length: f64) -> Result<ChunkPlan, PlanError> {
        let invalid = || PlanError::InvalidDuration {
            total_duration,
            chunk_length,
        };
        if !chunk_length.is_finite() || chunk_length <= 0.0 {
            return Err(invalid());
        }
        if !total_duration.is_finite() || total_duration < 0.0 {
            return Err(invalid());
        }

        let count = (total_duration / chunk_length).ceil() as usize;
        let mut spans = Vec::with_capacity(count);
        for index in 0..count {
            let start = index as f64 * chunk_length;
            // Float error in the ceil can leave a zero-length tail.
            if start >= total_duration {
                break;
            }
            let end = if index + 1 == count {
                total_duration
            } else {
                ((index + 1) as f64 * chunk_length).min(total_duration)
            };
            spans.push(ChunkSpan { index, start, end });
        }
        if let Some(last) = spans.last_mut() {
            last.end = total_duration;
        }

        Ok(ChunkPlan {
            total_duration,
            chunk_length,
            spans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case::exact_multiple(1800.0, 120.0, 15)]
    #[case::truncated_tail(1810.0, 120.0, 16)]
    #[case::shorter_than_chunk(45.0, 120.0, 1)]
    #[case::one_exact_chunk(120.0, 120.0, 1)]
    #[case::fractional(10.5, 2.0, 6)]
    fn test_chunk_count_is_ceil(
        #[case] total: f64,
        #[case] chunk: f64,
        #[case] expected: usize,
    ) {
        let plan = ChunkPlanner::plan(total, chunk).unwrap();
        assert_eq!(plan.len(), expected);
    }

    #[test]
    fn test_spans_are_contiguous_and_exact() {
        let plan = ChunkPlanner::plan(1810.0, 120.0).unwrap();
        let spans = plan.spans();
        assert_eq!(spans[0].start, 0.0);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(spans.last().unwrap().end, 1810.0);
    }

    #[test]
    fn test_last_span_truncated_not_padded() {
        let plan = ChunkPlanner::plan(250.0, 120.0).unwrap();
        let last = plan.spans().last().unwrap();
        assert_relative_eq!(last.start, 240.0);
        assert_relative_eq!(last.duration(), 10.0);
    }

    #[test]
    fn test_indices_are_sequential() {
        let plan = ChunkPlanner::plan(1000.0, 90.0).unwrap();
        for (i, span) in plan.spans().iter().enumerate() {
            assert_eq!(span.index, i);
        }
    }

    #[test]
    fn test_zero_duration_yields_empty_plan() {
        let plan = ChunkPlanner::plan(0.0, 120.0).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_awkward_float_division_ends_exactly() {
        let plan = ChunkPlanner::plan(0.7, 0.1).unwrap();
        assert_eq!(plan.len(), 7);
        assert_eq!(plan.spans().last().unwrap().end, 0.7);
    }

    #[test]
    fn test_offset_of_returns_span_start() {
        let plan = ChunkPlanner::plan(600.0, 120.0).unwrap();
        assert_eq!(plan.offset_of(3), Some(360.0));
        assert_eq!(plan.offset_of(5), None);
    }

    #[rstest]
    #[case::zero_chunk(100.0, 0.0)]
    #[case::negative_chunk(100.0, -1.0)]
    #[case::negative_total(-5.0, 10.0)]
    #[case::nan_total(f64::NAN, 10.0)]
    #[case::infinite_chunk(100.0, f64::INFINITY)]
    fn test_invalid_input_rejected(#[case] total: f64, #[case] chunk: f64) {
        let result = ChunkPlanner::plan(total, chunk);
        assert!(matches!(result, Err(PlanError::InvalidDuration { .. })));
    }
}
