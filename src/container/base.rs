use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BuildError, BuildResult};
use crate::config::AppConfig;
use crate::events::roles::map_note_to_role;
use crate::events::{BarInfo, BarTrack, DrumEvent, PartTrack, PartTrackNote};
use crate::extract::fingerprint::BarPatternFingerprint;
use crate::extract::matrix::{self, BeatPositionMatrix};
use crate::extract::stats::BarOnsetStats;
use crate::extract::{self, DEFAULT_GRID_RESOLUTION, MAX_GRID_RESOLUTION};
use crate::SCHEMA_VERSION;

/// Optional metadata supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackHints {
    pub genre: Option<String>,
    pub artist: Option<String>,
    pub tempo_bpm: Option<f64>,
}

/// Everything extracted from one drum track. Built once; rebuilt rather than mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumTrackFeatureData {
    pub schema_version: String,
    /// `drum_` + 8 hex chars. Unique per build, not reproducible.
    pub track_id: String,
    pub total_bars: u32,
    pub default_beats_per_bar: u32,
    pub grid_resolution: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_estimate_bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist_hint: Option<String>,
    pub events: Vec<DrumEvent>,
    /// One per bar, bar order.
    pub bar_fingerprints: Vec<BarPatternFingerprint>,
    /// One per bar, bar order.
    pub bar_stats: Vec<BarOnsetStats>,
    pub role_matrices: BTreeMap<String, BeatPositionMatrix>,
    pub active_roles: BTreeSet<String>,
}

impl DrumTrackFeatureData {
    pub fn fingerprint(&self, bar_number: u32) -> Option<&BarPatternFingerprint> {
        bar_number
            .checked_sub(1)
            .and_then(|i| self.bar_fingerprints.get(i as usize))
    }

    pub fn stats(&self, bar_number: u32) -> Option<&BarOnsetStats> {
        bar_number
            .checked_sub(1)
            .and_then(|i| self.bar_stats.get(i as usize))
    }

    pub fn matrix(&self, role: &str) -> Option<&BeatPositionMatrix> {
        self.role_matrices.get(role)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

pub fn generate_track_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("drum_{}", &uuid[..8])
}

/// Builds [`DrumTrackFeatureData`] from an event source and a bar ruler.
#[derive(Debug, Clone)]
pub struct DrumTrackFeatureDataBuilder {
    grid_resolution: u32,
}

impl Default for DrumTrackFeatureDataBuilder {
    fn default() -> Self {
        Self {
            grid_resolution: DEFAULT_GRID_RESOLUTION,
        }
    }
}

impl DrumTrackFeatureDataBuilder {
    pub fn new(grid_resolution: u32) -> Self {
        Self { grid_resolution }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.grid_resolution)
    }

    /// Build without validation. Advisories are logged, not returned.
    pub fn build(
        &self,
        part_track: &PartTrack,
        ruler: &BarTrack,
        hints: &TrackHints,
    ) -> DrumTrackFeatureData {
        let (data, advisories) = self.build_inner(part_track, ruler, hints);
        for msg in &advisories {
            log::warn!("{}", msg);
        }
        data
    }

    /// Build with fatal errors as `Err` and advisories logged.
    pub fn try_build(
        &self,
        part_track: Option<&PartTrack>,
        ruler: Option<&BarTrack>,
        hints: &TrackHints,
    ) -> Result<DrumTrackFeatureData, BuildError> {
        let part_track = part_track.ok_or(BuildError::MissingPartTrack)?;
        let ruler = ruler.ok_or(BuildError::MissingBarTrack)?;
        self.check_grid()?;
        Ok(self.build(part_track, ruler, hints))
    }

    /// Build with every problem collected into the result's messages.
    pub fn build_with_validation(
        &self,
        part_track: Option<&PartTrack>,
        ruler: Option<&BarTrack>,
        hints: &TrackHints,
    ) -> BuildResult<DrumTrackFeatureData> {
        let Some(part_track) = part_track else {
            return BuildResult::fatal(BuildError::MissingPartTrack);
        };
        let Some(ruler) = ruler else {
            return BuildResult::fatal(BuildError::MissingBarTrack);
        };
        if let Err(e) = self.check_grid() {
            return BuildResult::fatal(e);
        }

        let mut messages = Vec::new();
        if part_track.is_empty() {
            messages.push("No drum events in PartTrack".to_string());
        }
        let (data, advisories) = self.build_inner(part_track, ruler, hints);
        messages.extend(advisories);

        BuildResult {
            data: Some(data),
            messages,
        }
    }

    /// Build from events that are already placed in bars (role, bar and beat set).
    /// Events whose bar is not on the ruler are left out and reported.
    pub fn build_from_events(
        &self,
        events: Vec<DrumEvent>,
        ruler: &BarTrack,
        hints: &TrackHints,
    ) -> DrumTrackFeatureData {
        let (data, advisories) = self.build_from_events_inner(events, ruler, hints);
        for msg in &advisories {
            log::warn!("{}", msg);
        }
        data
    }

    /// [`build_from_events`](Self::build_from_events) with advisories returned as messages.
    pub fn build_from_events_with_validation(
        &self,
        events: Vec<DrumEvent>,
        ruler: Option<&BarTrack>,
        hints: &TrackHints,
    ) -> BuildResult<DrumTrackFeatureData> {
        let Some(ruler) = ruler else {
            return BuildResult::fatal(BuildError::MissingBarTrack);
        };
        if let Err(e) = self.check_grid() {
            return BuildResult::fatal(e);
        }

        let mut messages = Vec::new();
        if events.is_empty() {
            messages.push("No drum events in PartTrack".to_string());
        }
        let (data, advisories) = self.build_from_events_inner(events, ruler, hints);
        messages.extend(advisories);

        BuildResult {
            data: Some(data),
            messages,
        }
    }

    fn build_from_events_inner(
        &self,
        events: Vec<DrumEvent>,
        ruler: &BarTrack,
        hints: &TrackHints,
    ) -> (DrumTrackFeatureData, Vec<String>) {
        let mut advisories = ruler_advisories(ruler);

        let total_bars = ruler.total_bars();
        let (mut events, unplaced): (Vec<DrumEvent>, Vec<DrumEvent>) = events
            .into_iter()
            .partition(|e| (1..=total_bars).contains(&e.bar_number));
        if !unplaced.is_empty() {
            advisories.push(format!("{} event(s) outside the bar range", unplaced.len()));
        }

        events.sort_by(|a, b| {
            (a.bar_number, a.absolute_time_ticks)
                .cmp(&(b.bar_number, b.absolute_time_ticks))
                .then(a.beat.total_cmp(&b.beat))
                .then(a.role.cmp(&b.role))
        });
        (self.assemble(events, ruler, hints), advisories)
    }

    fn check_grid(&self) -> Result<(), BuildError> {
        if self.grid_resolution == 0 || self.grid_resolution > MAX_GRID_RESOLUTION {
            return Err(BuildError::InvalidGridResolution(self.grid_resolution));
        }
        Ok(())
    }

    fn build_inner(
        &self,
        part_track: &PartTrack,
        ruler: &BarTrack,
        hints: &TrackHints,
    ) -> (DrumTrackFeatureData, Vec<String>) {
        let mut advisories = ruler_advisories(ruler);

        let mut events = Vec::with_capacity(part_track.notes.len());
        let mut unplaced = 0usize;
        for note in &part_track.notes {
            match ruler.bar_at_tick(note.absolute_time_ticks) {
                Some(bar) => events.push(self.place(note, bar)),
                None => unplaced += 1,
            }
        }
        if unplaced > 0 {
            advisories.push(format!("{} event(s) outside the bar range", unplaced));
        }

        (self.assemble(events, ruler, hints), advisories)
    }

    /// Position a raw note inside its bar and measure its offset from the nearest slot.
    fn place(&self, note: &PartTrackNote, bar: &BarInfo) -> DrumEvent {
        let into_bar = (note.absolute_time_ticks - bar.start_tick) as f64;
        let beat = 1.0 + into_bar / bar.ticks_per_beat();

        let grid = extract::clamp_grid_resolution(self.grid_resolution) as f64;
        let slot_ticks = bar.length_ticks as f64 / grid;
        // Same clamp as the grid quantizer, so the offset describes the slot the hit lands in
        let nearest_slot = (into_bar / slot_ticks).round().clamp(0.0, grid - 1.0);
        let offset = (into_bar - nearest_slot * slot_ticks).round() as i32;

        DrumEvent {
            bar_number: bar.bar_number,
            beat,
            role: map_note_to_role(note.note_number),
            note_number: note.note_number,
            velocity: note.velocity,
            duration_ticks: note.duration_ticks,
            absolute_time_ticks: note.absolute_time_ticks,
            timing_offset_ticks: Some(offset),
        }
    }

    fn assemble(
        &self,
        events: Vec<DrumEvent>,
        ruler: &BarTrack,
        hints: &TrackHints,
    ) -> DrumTrackFeatureData {
        let grid_resolution = extract::clamp_grid_resolution(self.grid_resolution);
        let (bar_fingerprints, bar_stats) = extract::extract_bars(&events, ruler, grid_resolution);
        let role_matrices = matrix::build_all(&events, ruler, grid_resolution);
        let active_roles: BTreeSet<String> = role_matrices.keys().cloned().collect();

        let data = DrumTrackFeatureData {
            schema_version: SCHEMA_VERSION.to_string(),
            track_id: generate_track_id(),
            total_bars: ruler.total_bars(),
            default_beats_per_bar: ruler.dominant_beats_per_bar(),
            grid_resolution,
            tempo_estimate_bpm: hints.tempo_bpm,
            genre_hint: hints.genre.clone(),
            artist_hint: hints.artist.clone(),
            events,
            bar_fingerprints,
            bar_stats,
            role_matrices,
            active_roles,
        };

        log::info!(
            "Built {}: {} bars, {} events, {} roles",
            data.track_id,
            data.total_bars,
            data.events.len(),
            data.active_roles.len()
        );
        data
    }
}

fn ruler_advisories(ruler: &BarTrack) -> Vec<String> {
    let mut advisories = Vec::new();
    if ruler.total_bars() == 0 {
        advisories.push("BarTrack has no bars".to_string());
    }
    for bar in ruler.bars().iter().filter(|b| b.is_degenerate()) {
        advisories.push(format!(
            "Bar {} has a degenerate time signature ({} beats, {} ticks)",
            bar.bar_number, bar.beats_per_bar, bar.length_ticks
        ));
    }
    advisories
}
