use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::mean_std;
use crate::config::AnalysisConfig;
use crate::events::DrumEvent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityDistribution {
    pub count: u32,
    pub mean: f64,
    pub std_dev: f64,
    pub min: u8,
    pub max: u8,
}

impl VelocityDistribution {
    pub fn dynamic_range(&self) -> u8 {
        self.max - self.min
    }
}

/// A ghost note or accent, located by (bar, beat, role).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityMarker {
    pub bar_number: u32,
    pub beat: f64,
    pub role: String,
    pub velocity: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityDynamicsResult {
    pub role_distributions: BTreeMap<String, VelocityDistribution>,
    pub ghost_notes: Vec<VelocityMarker>,
    pub accents: Vec<VelocityMarker>,
}

impl VelocityDynamicsResult {
    pub fn is_empty(&self) -> bool {
        self.role_distributions.is_empty()
    }

    pub fn ghost_ratio(&self) -> f64 {
        let total: u32 = self.role_distributions.values().map(|d| d.count).sum();
        if total == 0 {
            0.0
        } else {
            self.ghost_notes.len() as f64 / total as f64
        }
    }
}

/// Per-role velocity distribution plus ghost-note and accent detection.
///
/// Ghost: more than `ghost_std_devs` σ below the role mean, or under
/// `ghost_velocity_floor` when the role normally plays at or above it.
/// Accents mirror this with `accent_std_devs` and `accent_velocity_ceiling`.
pub fn extract(events: &[DrumEvent], config: &AnalysisConfig) -> VelocityDynamicsResult {
    let mut by_role: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for event in events {
        by_role
            .entry(event.role.as_str())
            .or_default()
            .push(event.velocity as f64);
    }

    let role_distributions: BTreeMap<String, VelocityDistribution> = by_role
        .iter()
        .map(|(role, velocities)| {
            let (mean, std_dev) = mean_std(velocities);
            let min = velocities.iter().copied().fold(f64::MAX, f64::min) as u8;
            let max = velocities.iter().copied().fold(f64::MIN, f64::max) as u8;
            let dist = VelocityDistribution {
                count: velocities.len() as u32,
                mean,
                std_dev,
                min,
                max,
            };
            (role.to_string(), dist)
        })
        .collect();

    let mut ghost_notes = Vec::new();
    let mut accents = Vec::new();
    for event in events {
        let Some(dist) = role_distributions.get(&event.role) else {
            continue;
        };
        let v = event.velocity as f64;
        let marker = || VelocityMarker {
            bar_number: event.bar_number,
            beat: event.beat,
            role: event.role.clone(),
            velocity: event.velocity,
        };

        let floor = config.ghost_velocity_floor as f64;
        let ceiling = config.accent_velocity_ceiling as f64;
        let below_norm = dist.std_dev > 0.0 && v < dist.mean - config.ghost_std_devs * dist.std_dev;
        let above_norm = dist.std_dev > 0.0 && v > dist.mean + config.accent_std_devs * dist.std_dev;

        if below_norm || (v < floor && dist.mean >= floor) {
            ghost_notes.push(marker());
        } else if above_norm || (v >= ceiling && dist.mean < ceiling) {
            accents.push(marker());
        }
    }

    log::debug!(
        "Velocity: {} roles, {} ghost notes, {} accents",
        role_distributions.len(),
        ghost_notes.len(),
        accents.len()
    );

    VelocityDynamicsResult {
        role_distributions,
        ghost_notes,
        accents,
    }
}
