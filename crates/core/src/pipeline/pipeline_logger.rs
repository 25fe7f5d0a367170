use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for one transcription request.
///
/// Keeps the orchestrator free of output concerns; the CLI logs through the
/// `log` crate, tests and embedders can stay silent.
pub trait PipelineLogger: Send {
    /// Report chunk-level progress.
    fn progress(&mut self, completed: usize, total: usize);

    /// Record how long a named stage took (`extract`, `transcribe`, `merge`...).
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. queue depth, retries).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-request summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _completed: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Forwards events to the `log` crate and keeps per-stage timings for a
/// summary at the end of the request.
///
/// Progress is logged every `throttle_chunks` chunks and on the last one.
pub struct LogPipelineLogger {
    throttle_chunks: usize,
    timings: BTreeMap<String, Vec<f64>>,
    metrics: BTreeMap<String, Vec<f64>>,
    start_time: Instant,
    total_chunks: usize,
    completed_chunks: usize,
}

impl LogPipelineLogger {
    pub fn new(throttle_chunks: usize) -> Self {
        Self {
            throttle_chunks: throttle_chunks.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            total_chunks: 0,
            completed_chunks: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Transcription summary ({}/{} chunks, {elapsed_s:.1}s wall):",
            self.completed_chunks, self.total_chunks
        )];

        for (stage, durations) in &self.timings {
            let total_ms: f64 = durations.iter().sum();
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:12}: n {:3}  total {total_ms:8.0}ms  max {max_ms:7.0}ms",
                durations.len()
            ));
        }

        for (name, values) in &self.metrics {
            let total: f64 = values.iter().sum();
            lines.push(format!("  {name}: {total}"));
        }

        if self.completed_chunks > 0 && elapsed_s > 0.0 {
            let per_minute = self.completed_chunks as f64 / (elapsed_s / 60.0);
            lines.push(format!("  Throughput: {per_minute:.1} chunks/min"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new(5)
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, completed: usize, total: usize) {
        self.total_chunks = total;
        self.completed_chunks = completed;
        if total > 0 && (completed % self.throttle_chunks == 0 || completed == total) {
            let pct = completed as f64 / total as f64 * 100.0;
            log::info!("Transcribed {completed}/{total} chunks ({pct:.0}%)");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
