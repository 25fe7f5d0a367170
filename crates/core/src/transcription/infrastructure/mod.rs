#[cfg(feature = "whisper")]
pub mod whisper_model;
