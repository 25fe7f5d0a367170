mod export;

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use longscribe_core::shared::config::{PartialPolicy, TranscriptionConfig};
use longscribe_core::transcription::domain::transcript::Transcription;

use crate::export::OutputFormat;

/// Transcribe long audio or video files, splitting them across a pool of
/// speech model workers.
#[derive(Parser)]
#[command(name = "longscribe")]
struct Cli {
    /// Input audio or video file.
    input: PathBuf,

    /// Output file (stdout if omitted).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format; inferred from the output extension when omitted.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Media duration in seconds (probed from the file if omitted).
    #[arg(long)]
    duration: Option<f64>,

    /// Spoken language (e.g. "en"); detected per chunk if omitted.
    #[arg(long)]
    language: Option<String>,

    /// Path to a whisper.cpp model (downloaded to the cache if omitted).
    #[arg(long)]
    model: Option<PathBuf>,

    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of pool workers, each holding its own model.
    #[arg(long)]
    workers: Option<usize>,

    /// Inference threads per worker.
    #[arg(long, default_value = "2")]
    threads_per_worker: usize,

    /// Chunk length in seconds.
    #[arg(long)]
    chunk_length: Option<f64>,

    /// Inputs shorter than this many seconds skip chunking.
    #[arg(long)]
    threshold: Option<f64>,

    /// Seconds to wait for one chunk before retrying it.
    #[arg(long)]
    chunk_timeout: Option<f64>,

    /// Seconds allowed for the whole request.
    #[arg(long)]
    session_timeout: Option<f64>,

    /// Return a partial transcript instead of failing when the request runs out of time.
    #[arg(long)]
    best_effort: bool,

    /// Directory for per-request working files.
    #[arg(long)]
    session_root: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let format = output_format(&cli)?;
    let config = build_config(&cli)?;

    let transcription = transcribe(&cli, &config)?;
    log::info!(
        "Transcribed {} in {:.1}s ({} mode, {} chunk(s), language {})",
        cli.input.display(),
        transcription.elapsed_secs,
        transcription.mode_used,
        transcription.chunk_count,
        transcription.language.as_deref().unwrap_or("unknown")
    );
    if transcription.partial {
        log::warn!(
            "Transcript is partial; missing chunks: {:?}",
            transcription.missing_chunks
        );
    }

    let rendered = export::render(&transcription, format)?;
    match &cli.output {
        Some(path) => {
            fs::write(path, rendered)?;
            log::info!("Output written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<TranscriptionConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => TranscriptionConfig::load(path)?,
        None => TranscriptionConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
        config.min_healthy_workers = config.min_healthy_workers.map(|m| m.min(workers));
    }
    if let Some(secs) = cli.chunk_length {
        config.chunk_length_secs = secs;
    }
    if let Some(secs) = cli.threshold {
        config.duration_threshold_secs = secs;
    }
    if let Some(secs) = cli.chunk_timeout {
        config.chunk_timeout_secs = secs;
    }
    if let Some(secs) = cli.session_timeout {
        config.session_timeout_secs = secs;
        config.session_ttl_secs = config.session_ttl_secs.max(secs * 2.0);
    }
    if cli.best_effort {
        config.partial_policy = PartialPolicy::BestEffort;
    }
    if let Some(root) = &cli.session_root {
        config.session_root = Some(root.clone());
    }
    config.validate()?;
    Ok(config)
}

fn output_format(cli: &Cli) -> Result<OutputFormat, Box<dyn std::error::Error>> {
    if let Some(format) = cli.format {
        return Ok(format);
    }
    let Some(path) = &cli.output else {
        return Ok(OutputFormat::Text);
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => OutputFormat::from_extension(ext).ok_or_else(|| {
            format!("Cannot infer output format from '.{ext}'; pass --format").into()
        }),
        None => Ok(OutputFormat::Text),
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if let Some(d) = cli.duration {
        if !d.is_finite() || d < 0.0 {
            return Err(format!("Duration must be a non-negative number of seconds, got {d}").into());
        }
    }
    if cli.threads_per_worker == 0 {
        return Err("Threads per worker must be at least 1".into());
    }
    if let Some(model) = &cli.model {
        if !model.exists() {
            return Err(format!("Model file not found: {}", model.display()).into());
        }
    }
    Ok(())
}

#[cfg(feature = "whisper")]
fn transcribe(
    cli: &Cli,
    config: &TranscriptionConfig,
) -> Result<Transcription, Box<dyn std::error::Error>> {
    use std::sync::Arc;

    use longscribe_core::extraction::infrastructure::ffmpeg_audio_decoder::probe_duration;
    use longscribe_core::extraction::infrastructure::ffmpeg_chunk_extractor::FfmpegChunkExtractor;
    use longscribe_core::pipeline::direct_transcriber::DirectTranscriber;
    use longscribe_core::pipeline::pipeline_logger::LogPipelineLogger;
    use longscribe_core::pipeline::transcribe_media_use_case::TranscribeMediaUseCase;
    use longscribe_core::pool::worker_pool::WorkerPool;
    use longscribe_core::session::session_store::SessionStore;
    use longscribe_core::session::session_sweeper::SessionSweeper;
    use longscribe_core::shared::constants::{WHISPER_MODEL_NAME, WHISPER_MODEL_URL};
    use longscribe_core::shared::model_resolver;
    use longscribe_core::transcription::infrastructure::whisper_model::WhisperModelLoader;

    let duration = match cli.duration {
        Some(d) => d,
        None => probe_duration(&cli.input)?,
    };

    let model_path = match &cli.model {
        Some(path) => path.clone(),
        None => {
            log::info!("Resolving model: {WHISPER_MODEL_NAME}");
            let path = model_resolver::resolve(
                WHISPER_MODEL_NAME,
                WHISPER_MODEL_URL,
                Some(Box::new(download_progress)),
            )?;
            eprintln!();
            path
        }
    };
    let loader = Arc::new(WhisperModelLoader::new(&model_path, cli.threads_per_worker)?);

    let store = Arc::new(SessionStore::local(config.session_root()?));
    let mut sweeper = SessionSweeper::spawn(store.clone(), config.sweep_interval(), config.session_ttl());
    let pool = Arc::new(WorkerPool::start(&config.pool_config(), loader.clone())?);

    let use_case = TranscribeMediaUseCase::new(
        pool.clone(),
        store,
        Arc::new(FfmpegChunkExtractor::new()),
        Arc::new(DirectTranscriber::new(loader)),
        config.clone(),
    );
    let mut logger = LogPipelineLogger::default();
    let result = use_case.transcribe_as(
        &requester(),
        &cli.input,
        duration,
        cli.language.as_deref(),
        &mut logger,
    );

    let report = pool.shutdown(config.drain_timeout());
    if !report.drained {
        log::warn!(
            "Pool shut down with {} busy worker(s) abandoned",
            report.abandoned_workers
        );
    }
    sweeper.stop();
    Ok(result?)
}

#[cfg(not(feature = "whisper"))]
fn transcribe(
    _cli: &Cli,
    _config: &TranscriptionConfig,
) -> Result<Transcription, Box<dyn std::error::Error>> {
    Err("longscribe was built without a speech model; rebuild with `--features whisper`".into())
}

#[cfg(feature = "whisper")]
fn requester() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "cli".into())
}

#[cfg(feature = "whisper")]
fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading speech model... {pct}%");
    } else {
        eprint!("\rDownloading speech model... {downloaded} bytes");
    }
}
