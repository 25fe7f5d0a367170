use crate::planning::domain::chunk_plan::ChunkPlan;
use crate::pool::domain::task::ChunkResult;
use crate::transcription::domain::language_vote::majority_language;
use crate::transcription::domain::transcript::Segment;

#[derive(Debug, Clone, PartialEq)]
pub struct MergedTranscript {
    pub language: Option<String>,
    pub segments: Vec<Segment>,
    /// Model time per merged chunk, in chunk order.
    pub chunk_processing_secs: Vec<f64>,
}

/// Stitches per-chunk results back onto the source timeline.
pub struct TranscriptMerger;

impl TranscriptMerger {
    /// Orders results by chunk index, shifts every segment by its chunk's
    /// start offset and votes on the language.
    ///
    /// Arrival order of `results` is irrelevant. Results whose index is not
    /// in `plan` are dropped.
    pub fn merge(plan: &ChunkPlan, mut results: Vec<ChunkResult>) -> MergedTranscript {
        results.sort_by_key(|r| r.chunk_index);
        results.dedup_by_key(|r| r.chunk_index);

        let mut segments = Vec::new();
        let mut languages = Vec::with_capacity(results.len());
        let mut chunk_processing_secs = Vec::with_capacity(results.len());

        for result in &results {
            let Some(span) = plan.get(result.chunk_index) else {
                log::warn!("Dropping result for unplanned chunk {}", result.chunk_index);
                continue;
            };
            let length = span.duration();
            let mut local: Vec<Segment> = result
                .segments
                .iter()
                .map(|s| clamped(s, length))
                .collect();
            local.sort_by(|a, b| a.start.total_cmp(&b.start));
            segments.extend(local.iter().map(|s| s.shifted(span.start)));
            languages.push(result.detected_language.as_deref());
            chunk_processing_secs.push(result.processing_time.as_secs_f64());
        }

        MergedTranscript {
            language: majority_language(&languages),
            segments,
            chunk_processing_secs,
        }
    }
}

/// Keeps a chunk-local segment inside `[0, length]`; models may report
/// times past the end of the audio they were given.
fn clamped(segment: &Segment, length: f64) -> Segment {
    let start = segment.start.clamp(0.0, length);
    let end = segment.end.clamp(start, length);
    Segment::new(segment.text.clone(), start, end)
}
