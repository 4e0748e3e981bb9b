pub mod base;
pub mod extended;

use thiserror::Error;

pub use base::{DrumTrackFeatureData, DrumTrackFeatureDataBuilder, TrackHints};
pub use extended::{
    DrumTrackExtendedFeatureData, DrumTrackExtendedFeatureDataBuilder, ExtendedBuildOptions,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("PartTrack is null")]
    MissingPartTrack,
    #[error("BarTrack is null")]
    MissingBarTrack,
    #[error("Base feature data is null")]
    MissingBaseData,
    #[error("Grid resolution {0} is outside 1..=64")]
    InvalidGridResolution(u32),
    #[error("Unknown anchor reference: {0}")]
    UnknownReference(String),
}

/// Outcome of a validated build.
///
/// Fatal problems leave `data` empty; advisories (empty input, degenerate bars,
/// unplaced events) are collected alongside a still-usable container. Any message
/// at all means the build is not a clean success.
#[derive(Debug, Clone)]
pub struct BuildResult<T> {
    pub data: Option<T>,
    pub messages: Vec<String>,
}

impl<T> BuildResult<T> {
    pub fn fatal(error: BuildError) -> Self {
        Self {
            data: None,
            messages: vec![error.to_string()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.messages.is_empty()
    }
}
