#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_audio_decoder;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_chunk_extractor;
