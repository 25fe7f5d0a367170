pub mod language_vote;
pub mod speech_model;
pub mod transcript;
