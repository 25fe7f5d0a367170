pub mod extraction;
pub mod pipeline;
pub mod planning;
pub mod pool;
pub mod session;
pub mod shared;
pub mod transcription;
