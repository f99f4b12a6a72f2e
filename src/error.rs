//! Error types for operations outside the audio path
//!
//! `process` never fails. File I/O, registry lookups and state decoding do,
//! and report through [`Error`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "wav")]
    #[error("WAV codec error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Wavetable of {samples} samples is not a whole number of {wave_len}-sample waves")]
    InvalidWavetable { samples: usize, wave_len: usize },

    #[error("Wavetable file contains no samples")]
    EmptyWavetable,

    #[error("Unknown module slug: {0}")]
    UnknownModule(String),

    #[error("Module slug already registered: {0}")]
    DuplicateModule(String),

    #[error("Failed to decode module state: {0}")]
    State(#[from] serde_json::Error),

    #[error("Resampler error: {0}")]
    Resampler(String),
}

pub type Result<T> = std::result::Result<T, Error>;
