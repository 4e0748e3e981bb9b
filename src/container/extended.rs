use serde::{Deserialize, Serialize};

use super::base::DrumTrackFeatureData;
use super::{BuildError, BuildResult};
use crate::config::{AnalysisConfig, AppConfig};
use crate::patterns::anchors::{self, AnchorCandidateResult, AnchorReference};
use crate::patterns::coordination::{self, CrossRoleCoordinationResult};
use crate::patterns::markers::{self, StructuralMarkerResult};
use crate::patterns::repetition::{self, PatternRepetitionResult};
use crate::patterns::sequence::{self, SequencePatternResult};
use crate::patterns::similarity::{self, PatternSimilarityResult};
use crate::performance::timing::{self, TimingFeelResult};
use crate::performance::velocity::{self, VelocityDynamicsResult};
use crate::SCHEMA_VERSION;

/// Which optional analyses to run, plus the thresholds they use.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedBuildOptions {
    pub include_cross_role: bool,
    pub include_anchors: bool,
    pub include_structural: bool,
    pub include_performance: bool,
    pub anchor_reference: Option<AnchorReference>,
    pub analysis: AnalysisConfig,
}

impl Default for ExtendedBuildOptions {
    fn default() -> Self {
        Self {
            include_cross_role: true,
            include_anchors: true,
            include_structural: true,
            include_performance: true,
            anchor_reference: None,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl ExtendedBuildOptions {
    /// Options from the `[extended]` and `[analysis]` config sections.
    /// An unrecognised reference name is an error.
    pub fn from_config(config: &AppConfig) -> Result<Self, BuildError> {
        let anchor_reference = match &config.extended.reference {
            Some(name) => Some(
                AnchorReference::builtin(name)
                    .ok_or_else(|| BuildError::UnknownReference(name.clone()))?,
            ),
            None => None,
        };
        Ok(Self {
            include_cross_role: config.extended.cross_role,
            include_anchors: config.extended.anchors,
            include_structural: config.extended.structural,
            include_performance: config.extended.performance,
            anchor_reference,
            analysis: config.analysis.clone(),
        })
    }
}

/// Base features plus every pattern and performance analysis.
/// Disabled analyses hold their empty default rather than being absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumTrackExtendedFeatureData {
    pub schema_version: String,
    pub base: DrumTrackFeatureData,
    pub pattern_repetition: PatternRepetitionResult,
    pub pattern_similarity: PatternSimilarityResult,
    pub sequence_patterns: SequencePatternResult,
    pub cross_role_coordination: CrossRoleCoordinationResult,
    pub anchor_candidates: AnchorCandidateResult,
    pub structural_markers: StructuralMarkerResult,
    pub velocity_dynamics: VelocityDynamicsResult,
    pub timing_feel: TimingFeelResult,
}

#[derive(Debug, Clone, Default)]
pub struct DrumTrackExtendedFeatureDataBuilder;

impl DrumTrackExtendedFeatureDataBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        base: DrumTrackFeatureData,
        options: &ExtendedBuildOptions,
    ) -> DrumTrackExtendedFeatureData {
        let analysis = &options.analysis;
        let fingerprints = &base.bar_fingerprints;

        let pattern_repetition = repetition::detect(fingerprints);
        let pattern_similarity = similarity::analyze(fingerprints, analysis.similarity_threshold);
        let sequence_patterns = sequence::detect(fingerprints);
        log::debug!(
            "{}: {} unique patterns, {} families",
            base.track_id,
            pattern_repetition.unique_pattern_count,
            pattern_similarity.pattern_families.len()
        );

        let cross_role_coordination = if options.include_cross_role {
            coordination::extract(&base.role_matrices)
        } else {
            log::debug!("Cross-role coordination disabled");
            CrossRoleCoordinationResult::default()
        };

        let anchor_candidates = if options.include_anchors {
            anchors::extract(
                &base.role_matrices,
                analysis.anchor_threshold,
                options.anchor_reference.as_ref(),
            )
        } else {
            log::debug!("Anchor extraction disabled");
            AnchorCandidateResult::default()
        };

        let structural_markers = if options.include_structural {
            markers::detect(fingerprints, &base.bar_stats, analysis)
        } else {
            log::debug!("Structural markers disabled");
            StructuralMarkerResult::default()
        };

        let (velocity_dynamics, timing_feel) = if options.include_performance {
            (
                velocity::extract(&base.events, analysis),
                timing::extract(&base.events, analysis.feel_threshold_ticks),
            )
        } else {
            log::debug!("Performance analysis disabled");
            (VelocityDynamicsResult::default(), TimingFeelResult::default())
        };

        log::info!(
            "Analyzed {}: {} runs, {} markers, {} anchors",
            base.track_id,
            pattern_repetition.consecutive_runs.len(),
            structural_markers.total_marker_count,
            anchor_candidates.anchor_count()
        );

        DrumTrackExtendedFeatureData {
            schema_version: SCHEMA_VERSION.to_string(),
            base,
            pattern_repetition,
            pattern_similarity,
            sequence_patterns,
            cross_role_coordination,
            anchor_candidates,
            structural_markers,
            velocity_dynamics,
            timing_feel,
        }
    }

    /// A missing base is fatal; a base with no bars still builds, with a warning.
    pub fn build_with_validation(
        &self,
        base: Option<DrumTrackFeatureData>,
        options: &ExtendedBuildOptions,
    ) -> BuildResult<DrumTrackExtendedFeatureData> {
        let Some(base) = base else {
            return BuildResult::fatal(BuildError::MissingBaseData);
        };
        let mut messages = Vec::new();
        if base.total_bars == 0 {
            messages.push("Base feature data has no bars".to_string());
        }
        BuildResult {
            data: Some(self.build(base, options)),
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::base::{DrumTrackFeatureDataBuilder, TrackHints};
    use crate::events::{BarTrack, PartTrack, PartTrackNote};

    const TPQ: i64 = 480;

    fn make_note(note_number: u8, tick: i64, velocity: u8) -> PartTrackNote {
        PartTrackNote {
            note_number,
            absolute_time_ticks: tick,
            duration_ticks: 60,
            velocity,
        }
    }

    /// Kick 1/3, snare 2/4, eighth-note hats, with a crash on the downbeat of bar 1.
    fn make_base(bars: i64) -> DrumTrackFeatureData {
        let mut notes = vec![make_note(49, 0, 120)];
        for bar in 0..bars {
            let start = bar * 4 * TPQ;
            for beat in 0..4 {
                let tick = start + beat * TPQ;
                notes.push(make_note(if beat % 2 == 0 { 36 } else { 38 }, tick, 100));
                notes.push(make_note(42, tick, 80));
                notes.push(make_note(42, tick + TPQ / 2, 80));
            }
        }
        let ruler = BarTrack::uniform(bars as u32, TPQ as u32, 4);
        DrumTrackFeatureDataBuilder::default().build(&PartTrack::new(notes), &ruler, &TrackHints::default())
    }

    #[test]
    fn test_backbeat_repeats_as_one_pattern() {
        let notes: Vec<PartTrackNote> = (0..4)
            .flat_map(|bar| {
                let start = bar * 4 * TPQ;
                vec![
                    make_note(36, start, 100),
                    make_note(38, start + TPQ, 100),
                    make_note(36, start + 2 * TPQ, 100),
                    make_note(38, start + 3 * TPQ, 100),
                ]
            })
            .collect();
        let base = DrumTrackFeatureDataBuilder::default().build(
            &PartTrack::new(notes),
            &BarTrack::uniform(4, TPQ as u32, 4),
            &TrackHints::default(),
        );
        let data = DrumTrackExtendedFeatureDataBuilder::new().build(base, &ExtendedBuildOptions::default());

        let repetition = &data.pattern_repetition;
        assert_eq!(repetition.unique_pattern_count, 1);
        assert_eq!(repetition.consecutive_runs.len(), 1);
        let run = &repetition.consecutive_runs[0];
        assert_eq!((run.start_bar, run.end_bar, run.length), (1, 4, 4));
        assert_eq!(data.schema_version, "1.0");
        assert_eq!(data.sequence_patterns.repeating(2).len(), 1);
    }

    #[test]
    fn test_all_analyses_run_by_default() {
        let data = DrumTrackExtendedFeatureDataBuilder::new()
            .build(make_base(8), &ExtendedBuildOptions::default());

        assert!(data.cross_role_coordination.get("Snare", "ClosedHat").is_some());
        assert!(data.anchor_candidates.is_anchor("Kick", 0));
        assert!(data.anchor_candidates.is_anchor("Snare", 4));
        assert_eq!(data.structural_markers.crash_bars, vec![1]);
        assert!(!data.velocity_dynamics.is_empty());
        assert!(!data.timing_feel.is_empty());
        assert!((data.timing_feel.swing_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_disabled_analyses_are_empty() {
        let options = ExtendedBuildOptions {
            include_cross_role: false,
            include_anchors: false,
            include_structural: false,
            include_performance: false,
            ..ExtendedBuildOptions::default()
        };
        let data = DrumTrackExtendedFeatureDataBuilder::new().build(make_base(4), &options);

        assert!(data.cross_role_coordination.is_empty());
        assert!(data.anchor_candidates.is_empty());
        assert!(data.structural_markers.is_empty());
        assert!(data.velocity_dynamics.is_empty());
        assert!(data.timing_feel.is_empty());
        // Always-on analyses still ran
        assert_eq!(data.pattern_repetition.total_bars, 4);
    }

    #[test]
    fn test_reference_comparison() {
        let options = ExtendedBuildOptions {
            anchor_reference: Some(AnchorReference::pop_rock_basic()),
            ..ExtendedBuildOptions::default()
        };
        let data = DrumTrackExtendedFeatureDataBuilder::new().build(make_base(4), &options);
        let variance = data.anchor_candidates.reference_comparison.as_ref().unwrap();
        assert_eq!(variance.reference_name, "PopRockBasic");
        assert!(variance.missing.is_empty());
        assert!(variance.variance.abs() < 1e-12);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.extended.performance = false;
        config.extended.reference = Some("pop-rock-basic".into());
        let options = ExtendedBuildOptions::from_config(&config).unwrap();
        assert!(!options.include_performance);
        assert!(options.include_cross_role);
        assert_eq!(options.anchor_reference.unwrap().name, "PopRockBasic");

        config.extended.reference = Some("Bossa".into());
        assert_eq!(
            ExtendedBuildOptions::from_config(&config).unwrap_err(),
            BuildError::UnknownReference("Bossa".into())
        );
    }

    #[test]
    fn test_validation_missing_base() {
        let result = DrumTrackExtendedFeatureDataBuilder::new()
            .build_with_validation(None, &ExtendedBuildOptions::default());
        assert!(!result.is_success());
        assert!(result.data.is_none());
        assert!(result.messages.iter().any(|m| m.contains("Base feature data is null")));
    }

    #[test]
    fn test_validation_clean() {
        let result = DrumTrackExtendedFeatureDataBuilder::new()
            .build_with_validation(Some(make_base(2)), &ExtendedBuildOptions::default());
        assert!(result.is_success(), "{:?}", result.messages);
    }
}
