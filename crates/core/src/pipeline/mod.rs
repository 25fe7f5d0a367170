pub mod chunk_extraction;
pub mod chunk_file;
pub mod direct_transcriber;
pub mod pipeline_logger;
pub mod transcribe_media_use_case;
pub mod transcript_merger;
