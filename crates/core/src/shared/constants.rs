pub const WHISPER_MODEL_NAME: &str = "ggml-base.bin";
pub const WHISPER_MODEL_URL: &str =
    "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin";

/// Sample rate whisper models expect; chunks are written at this rate.
pub const TRANSCRIPTION_SAMPLE_RATE: u32 = 16000;

pub const DEFAULT_CHUNK_LENGTH_SECS: f64 = 120.0;
/// Inputs shorter than this are transcribed in one pass without the pool.
pub const DEFAULT_DURATION_THRESHOLD_SECS: f64 = 300.0;
pub const DEFAULT_CHUNK_TIMEOUT_SECS: f64 = 600.0;
pub const DEFAULT_SESSION_TIMEOUT_SECS: f64 = 3600.0;
pub const DEFAULT_CHUNK_RETRIES: u32 = 2;
pub const DEFAULT_MODEL_LOAD_RETRIES: u32 = 2;
pub const DEFAULT_EXTRACT_CONCURRENCY: usize = 4;
/// Sessions older than this are treated as abandoned (~2 hours).
pub const DEFAULT_SESSION_TTL_SECS: f64 = 7200.0;
pub const DEFAULT_SWEEP_INTERVAL_SECS: f64 = 600.0;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: f64 = 30.0;
/// Upper bound for any configured duration (30 days).
pub const MAX_DURATION_SECS: f64 = 30.0 * 24.0 * 3600.0;
