use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{calculate_grid_position, clamp_grid_resolution};
use crate::events::DrumEvent;

/// Hash reserved for a bar with no onsets.
pub const EMPTY_PATTERN_HASH: &str = "0000000000000000";

/// Per-bar rhythmic summary: one onset bitmask per role plus a digest of all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarPatternFingerprint {
    pub bar_number: u32,
    pub beats_per_bar: u32,
    pub grid_resolution: u32,
    /// Bit `n` set = the role hits grid slot `n`.
    pub role_onset_bitmasks: BTreeMap<String, u64>,
    /// Velocities in onset (encounter) order.
    pub role_velocities: BTreeMap<String, Vec<u8>>,
    pub role_event_counts: BTreeMap<String, u32>,
    pub pattern_hash: String,
}

impl BarPatternFingerprint {
    pub fn is_empty(&self) -> bool {
        self.role_onset_bitmasks.is_empty()
    }

    pub fn total_events(&self) -> u32 {
        self.role_event_counts.values().sum()
    }

    /// Number of distinct (role, slot) onsets.
    pub fn onset_count(&self) -> u32 {
        self.role_onset_bitmasks.values().map(|m| m.count_ones()).sum()
    }

    pub fn bitmask(&self, role: &str) -> u64 {
        self.role_onset_bitmasks.get(role).copied().unwrap_or(0)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role_onset_bitmasks.contains_key(role)
    }
}

/// Build the fingerprint of one bar from that bar's events.
pub fn extract(
    events: &[&DrumEvent],
    bar_number: u32,
    beats_per_bar: u32,
    grid_resolution: u32,
) -> BarPatternFingerprint {
    let grid_resolution = clamp_grid_resolution(grid_resolution);
    let mut role_onset_bitmasks: BTreeMap<String, u64> = BTreeMap::new();
    let mut role_velocities: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut role_event_counts: BTreeMap<String, u32> = BTreeMap::new();

    for event in events {
        let slot = calculate_grid_position(event.beat, beats_per_bar, grid_resolution);
        *role_onset_bitmasks.entry(event.role.clone()).or_default() |= 1u64 << slot;
        role_velocities
            .entry(event.role.clone())
            .or_default()
            .push(event.velocity);
        *role_event_counts.entry(event.role.clone()).or_default() += 1;
    }

    let pattern_hash = compute_pattern_hash(&role_onset_bitmasks);

    BarPatternFingerprint {
        bar_number,
        beats_per_bar,
        grid_resolution,
        role_onset_bitmasks,
        role_velocities,
        role_event_counts,
        pattern_hash,
    }
}

/// Digest of the (role, bitmask) pairs in role-name order, as 16 lowercase hex chars.
/// BTreeMap iteration is already sorted by role name, so input order never matters.
pub fn compute_pattern_hash(role_onset_bitmasks: &BTreeMap<String, u64>) -> String {
    if role_onset_bitmasks.is_empty() {
        return EMPTY_PATTERN_HASH.to_string();
    }

    let mut hasher = Sha256::new();
    for (role, mask) in role_onset_bitmasks {
        hasher.update(role.as_bytes());
        hasher.update([0u8]);
        hasher.update(mask.to_be_bytes());
    }
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    format!("{:016x}", u64::from_be_bytes(head))
}

/// Jaccard index over the (role, slot) onset sets of two fingerprints.
/// Two empty bars are identical (1.0); an empty bar against a non-empty one scores 0.0.
pub fn calculate_similarity(a: &BarPatternFingerprint, b: &BarPatternFingerprint) -> f64 {
    let mut intersection = 0u32;
    let mut union = 0u32;

    for (role, &mask_a) in &a.role_onset_bitmasks {
        let mask_b = b.bitmask(role);
        intersection += (mask_a & mask_b).count_ones();
        union += (mask_a | mask_b).count_ones();
    }
    for (role, &mask_b) in &b.role_onset_bitmasks {
        if !a.has_role(role) {
            union += mask_b.count_ones();
        }
    }

    if union == 0 {
        return if a.is_empty() && b.is_empty() { 1.0 } else { 0.0 };
    }
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(role: &str, beat: f64, velocity: u8) -> DrumEvent {
        DrumEvent {
            bar_number: 1,
            beat,
            role: role.to_string(),
            note_number: 0,
            velocity,
            duration_ticks: 60,
            absolute_time_ticks: 0,
            timing_offset_ticks: None,
        }
    }

    fn fingerprint(events: &[DrumEvent]) -> BarPatternFingerprint {
        let refs: Vec<&DrumEvent> = events.iter().collect();
        extract(&refs, 1, 4, 16)
    }

    fn backbeat() -> Vec<DrumEvent> {
        vec![
            make_event("Kick", 1.0, 100),
            make_event("Snare", 2.0, 90),
            make_event("Kick", 3.0, 95),
            make_event("Snare", 4.0, 92),
        ]
    }

    #[test]
    fn test_bitmasks_and_counts() {
        let fp = fingerprint(&backbeat());
        assert_eq!(fp.bitmask("Kick"), (1 << 0) | (1 << 8));
        assert_eq!(fp.bitmask("Snare"), (1 << 4) | (1 << 12));
        assert_eq!(fp.role_velocities["Kick"], vec![100, 95]);
        assert_eq!(fp.role_event_counts["Snare"], 2);
        assert_eq!(fp.total_events(), 4);
        assert_eq!(fp.onset_count(), 4);
        assert_eq!(fp.pattern_hash.len(), 16);
        assert!(fp.pattern_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_duplicate_slot_sets_one_bit_but_counts_twice() {
        let fp = fingerprint(&[make_event("Snare", 2.0, 80), make_event("Snare", 2.0, 60)]);
        assert_eq!(fp.bitmask("Snare").count_ones(), 1);
        assert_eq!(fp.role_event_counts["Snare"], 2);
        assert_eq!(fp.role_velocities["Snare"], vec![80, 60]);
    }

    #[test]
    fn test_hash_independent_of_input_order() {
        let events = backbeat();
        let mut reversed = events.clone();
        reversed.reverse();
        assert_eq!(fingerprint(&events).pattern_hash, fingerprint(&reversed).pattern_hash);
    }

    #[test]
    fn test_hash_ignores_velocity() {
        let mut soft = backbeat();
        for e in &mut soft {
            e.velocity = 30;
        }
        assert_eq!(fingerprint(&backbeat()).pattern_hash, fingerprint(&soft).pattern_hash);
    }

    #[test]
    fn test_hash_differs_for_different_patterns() {
        let mut moved = backbeat();
        moved[2].beat = 3.5;
        assert_ne!(fingerprint(&backbeat()).pattern_hash, fingerprint(&moved).pattern_hash);
    }

    #[test]
    fn test_empty_bar_hash() {
        for beats in [3, 4, 7] {
            let fp = extract(&[], 5, beats, 16);
            assert_eq!(fp.pattern_hash, EMPTY_PATTERN_HASH);
            assert!(fp.role_onset_bitmasks.is_empty());
            assert!(fp.role_velocities.is_empty());
            assert!(fp.role_event_counts.is_empty());
        }
    }

    #[test]
    fn test_similarity_reflexive() {
        let fp = fingerprint(&backbeat());
        assert!((calculate_similarity(&fp, &fp) - 1.0).abs() < 1e-12);
        let empty = extract(&[], 1, 4, 16);
        assert!((calculate_similarity(&empty, &empty) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_disjoint() {
        let a = fingerprint(&[make_event("Kick", 1.0, 100)]);
        let b = fingerprint(&[make_event("Snare", 1.0, 100)]);
        assert_eq!(calculate_similarity(&a, &b), 0.0);
        let empty = extract(&[], 1, 4, 16);
        assert_eq!(calculate_similarity(&a, &empty), 0.0);
    }

    #[test]
    fn test_similarity_partial_overlap() {
        let a = fingerprint(&backbeat());
        // Drop the second kick: 3 shared onsets out of 4 total
        let b = fingerprint(&[
            make_event("Kick", 1.0, 100),
            make_event("Snare", 2.0, 90),
            make_event("Snare", 4.0, 92),
        ]);
        assert!((calculate_similarity(&a, &b) - 0.75).abs() < 1e-12);
        assert!((calculate_similarity(&b, &a) - 0.75).abs() < 1e-12);
    }
}
