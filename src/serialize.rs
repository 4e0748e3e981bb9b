//! JSON text form of the feature containers.
//!
//! Every document carries a top-level `schema_version`, checked before the rest
//! of the document is trusted.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SCHEMA_VERSION;

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("Input text is empty")]
    EmptyInput,
    #[error("Malformed feature document: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Unsupported schema version {0:?} (expected {SCHEMA_VERSION:?})")]
    UnsupportedSchema(String),
}

#[derive(Deserialize)]
struct SchemaProbe {
    schema_version: String,
}

/// Pretty-printed by default; `compact` drops all whitespace.
pub fn serialize<T: Serialize>(data: &T, compact: bool) -> Result<String, SerializeError> {
    let text = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(text)
}

pub fn deserialize<T: DeserializeOwned>(text: &str) -> Result<T, SerializeError> {
    if text.trim().is_empty() {
        return Err(SerializeError::EmptyInput);
    }
    let probe: SchemaProbe = serde_json::from_str(text)?;
    if probe.schema_version != SCHEMA_VERSION {
        return Err(SerializeError::UnsupportedSchema(probe.schema_version));
    }
    Ok(serde_json::from_str(text)?)
}

/// Like [`deserialize`], with the error rendered for display.
pub fn try_deserialize<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    deserialize(text).map_err(|e| e.to_string())
}

/// Read just the schema version of a document without parsing the rest.
pub fn schema_version_of(text: &str) -> Result<String, SerializeError> {
    if text.trim().is_empty() {
        return Err(SerializeError::EmptyInput);
    }
    let probe: SchemaProbe = serde_json::from_str(text)?;
    Ok(probe.schema_version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{
        DrumTrackExtendedFeatureData, DrumTrackExtendedFeatureDataBuilder, DrumTrackFeatureData,
        DrumTrackFeatureDataBuilder, ExtendedBuildOptions, TrackHints,
    };
    use crate::events::{BarTrack, PartTrack, PartTrackNote};
    use crate::patterns::anchors::AnchorReference;

    fn make_base() -> DrumTrackFeatureData {
        let mut notes = Vec::new();
        for bar in 0..4i64 {
            let start = bar * 1920;
            notes.push(PartTrackNote { note_number: 36, absolute_time_ticks: start + 3, duration_ticks: 60, velocity: 104 });
            notes.push(PartTrackNote { note_number: 38, absolute_time_ticks: start + 485, duration_ticks: 60, velocity: 97 });
            notes.push(PartTrackNote { note_number: 38, absolute_time_ticks: start + 1320, duration_ticks: 30, velocity: 31 });
            notes.push(PartTrackNote { note_number: 42, absolute_time_ticks: start + 640, duration_ticks: 30, velocity: 77 });
            if bar == 3 {
                notes.push(PartTrackNote { note_number: 49, absolute_time_ticks: start, duration_ticks: 240, velocity: 120 });
            }
        }
        let hints = TrackHints {
            genre: Some("Rock".into()),
            artist: Some("Test".into()),
            tempo_bpm: Some(118.5),
        };
        DrumTrackFeatureDataBuilder::default().build(
            &PartTrack::new(notes),
            &BarTrack::uniform(4, 480, 4),
            &hints,
        )
    }

    fn make_extended() -> DrumTrackExtendedFeatureData {
        let options = ExtendedBuildOptions {
            anchor_reference: Some(AnchorReference::pop_rock_basic()),
            ..ExtendedBuildOptions::default()
        };
        DrumTrackExtendedFeatureDataBuilder::new().build(make_base(), &options)
    }

    #[test]
    fn test_base_round_trip() {
        let data = make_base();
        let text = serialize(&data, false).unwrap();
        assert!(text.contains("\"schema_version\": \"1.0\""));
        let back: DrumTrackFeatureData = deserialize(&text).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_extended_round_trip() {
        let data = make_extended();
        let text = serialize(&data, true).unwrap();
        let back: DrumTrackExtendedFeatureData = deserialize(&text).unwrap();
        assert_eq!(back, data);
        assert_eq!(back.base.role_matrices, data.base.role_matrices);
    }

    #[test]
    fn test_compact_is_shorter() {
        let data = make_extended();
        let compact = serialize(&data, true).unwrap();
        let pretty = serialize(&data, false).unwrap();
        assert!(compact.len() < pretty.len());
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            deserialize::<DrumTrackFeatureData>(""),
            Err(SerializeError::EmptyInput)
        ));
        assert!(matches!(
            deserialize::<DrumTrackFeatureData>("  \n"),
            Err(SerializeError::EmptyInput)
        ));
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            deserialize::<DrumTrackFeatureData>("{not json"),
            Err(SerializeError::Format(_))
        ));
        // Valid JSON, wrong shape
        assert!(matches!(
            deserialize::<DrumTrackFeatureData>(r#"{"schema_version": "1.0", "total_bars": "four"}"#),
            Err(SerializeError::Format(_))
        ));
    }

    #[test]
    fn test_unsupported_schema() {
        let text = serialize(&make_base(), true)
            .unwrap()
            .replace("\"schema_version\":\"1.0\"", "\"schema_version\":\"2.0\"");
        match deserialize::<DrumTrackFeatureData>(&text) {
            Err(SerializeError::UnsupportedSchema(v)) => assert_eq!(v, "2.0"),
            other => panic!("expected UnsupportedSchema, got {other:?}"),
        }
    }

    #[test]
    fn test_try_deserialize() {
        let text = serialize(&make_base(), true).unwrap();
        assert!(try_deserialize::<DrumTrackFeatureData>(&text).is_ok());
        let err = try_deserialize::<DrumTrackFeatureData>("").unwrap_err();
        assert_eq!(err, "Input text is empty");
    }

    #[test]
    fn test_schema_version_of() {
        let text = serialize(&make_extended(), false).unwrap();
        assert_eq!(schema_version_of(&text).unwrap(), "1.0");
    }
}
