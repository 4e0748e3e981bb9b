//! Analyzers over the per-bar fingerprints and per-role matrices of a track.
//!
//! Each analyzer is a pure function of its inputs; results are plain values with an
//! `is_empty` check, and `Default` is the "not computed" result.

pub mod anchors;
pub mod coordination;
pub mod markers;
pub mod repetition;
pub mod sequence;
pub mod similarity;
