//! Error types for drainq.

use thiserror::Error;

use crate::dispatch::Phase;

#[derive(Debug, Error)]
pub enum Error {
    /// `register` was asked to add zero units.
    #[error("invalid registration: unit count must be at least 1")]
    InvalidRegistration,

    /// `complete` was called with nothing outstanding.
    #[error("unmatched completion: no outstanding work to complete")]
    UnmatchedComplete,

    #[error("not accepting triggers (phase: {phase})")]
    NotAccepting { phase: Phase },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
