use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extract::matrix::BeatPositionMatrix;

/// How tightly two roles' onsets line up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleCoordination {
    pub role_a: String,
    pub role_b: String,
    /// Bar/slot cells where both roles hit.
    pub coincidence_count: u32,
    pub role_a_hits: u32,
    pub role_b_hits: u32,
    /// coincidences / (a_hits + b_hits − coincidences), in [0, 1].
    pub lock_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossRoleCoordinationResult {
    /// Keyed by [`create_key`].
    pub pairs: BTreeMap<String, RoleCoordination>,
}

impl CrossRoleCoordinationResult {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, role_a: &str, role_b: &str) -> Option<&RoleCoordination> {
        self.pairs.get(&create_key(role_a, role_b))
    }

    /// The most tightly locked pair. Ties go to the alphabetically first key.
    pub fn tightest(&self) -> Option<&RoleCoordination> {
        self.pairs
            .values()
            .fold(None, |best: Option<&RoleCoordination>, p| match best {
                Some(b) if b.lock_score >= p.lock_score => Some(b),
                _ => Some(p),
            })
    }
}

/// Order-independent pair key: role names sorted and joined with `+`.
pub fn create_key(role_a: &str, role_b: &str) -> String {
    if role_a <= role_b {
        format!("{role_a}+{role_b}")
    } else {
        format!("{role_b}+{role_a}")
    }
}

/// Coincidence counts and lock scores for every unordered pair of roles.
pub fn extract(matrices: &BTreeMap<String, BeatPositionMatrix>) -> CrossRoleCoordinationResult {
    let roles: Vec<&BeatPositionMatrix> = matrices.values().collect();
    let mut pairs = BTreeMap::new();

    for (i, a) in roles.iter().enumerate() {
        for b in &roles[i + 1..] {
            let coordination = coordinate(a, b);
            log::trace!(
                "{}: {} coincidences, lock {:.3}",
                create_key(&a.role, &b.role),
                coordination.coincidence_count,
                coordination.lock_score
            );
            pairs.insert(create_key(&a.role, &b.role), coordination);
        }
    }

    CrossRoleCoordinationResult { pairs }
}

/// `a` and `b` arrive in role-name order (BTreeMap iteration).
fn coordinate(a: &BeatPositionMatrix, b: &BeatPositionMatrix) -> RoleCoordination {
    let bars = a.total_bars.max(b.total_bars);
    let coincidence_count: u32 = (1..=bars)
        .map(|bar| (a.hit_mask(bar) & b.hit_mask(bar)).count_ones())
        .sum();
    let role_a_hits = a.hit_count() as u32;
    let role_b_hits = b.hit_count() as u32;

    let union = role_a_hits + role_b_hits - coincidence_count;
    let lock_score = if union == 0 {
        0.0
    } else {
        coincidence_count as f64 / union as f64
    };

    RoleCoordination {
        role_a: a.role.clone(),
        role_b: b.role.clone(),
        coincidence_count,
        role_a_hits,
        role_b_hits,
        lock_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BarTrack, DrumEvent};
    use crate::extract::matrix;

    fn make_event(bar: u32, role: &str, beat: f64) -> DrumEvent {
        DrumEvent {
            bar_number: bar,
            beat,
            role: role.to_string(),
            note_number: 0,
            velocity: 100,
            duration_ticks: 60,
            absolute_time_ticks: 0,
            timing_offset_ticks: None,
        }
    }

    #[test]
    fn test_key_is_order_independent() {
        assert_eq!(create_key("Snare", "Kick"), "Kick+Snare");
        assert_eq!(create_key("Kick", "Snare"), "Kick+Snare");
        assert_eq!(create_key("Kick", "Kick"), "Kick+Kick");
    }

    #[test]
    fn test_single_role_has_no_pairs() {
        let ruler = BarTrack::uniform(1, 480, 4);
        let matrices = matrix::build_all(&[make_event(1, "Kick", 1.0)], &ruler, 16);
        assert!(extract(&matrices).is_empty());
    }

    #[test]
    fn test_lock_score_characterization() {
        // Kick on 1 and 3, hats on every beat, over 2 bars:
        // 4 coincidences, 4 kick hits, 8 hat hits → 4 / (4 + 8 - 4) = 0.5
        let ruler = BarTrack::uniform(2, 480, 4);
        let mut events = Vec::new();
        for bar in 1..=2 {
            events.push(make_event(bar, "Kick", 1.0));
            events.push(make_event(bar, "Kick", 3.0));
            for beat in [1.0, 2.0, 3.0, 4.0] {
                events.push(make_event(bar, "ClosedHat", beat));
            }
            events.push(make_event(bar, "Snare", 2.5));
        }
        let matrices = matrix::build_all(&events, &ruler, 16);
        let result = extract(&matrices);

        assert_eq!(result.pairs.len(), 3);
        let kick_hat = result.get("Kick", "ClosedHat").unwrap();
        assert_eq!(kick_hat.role_a, "ClosedHat");
        assert_eq!(kick_hat.role_b, "Kick");
        assert_eq!(kick_hat.coincidence_count, 4);
        assert_eq!((kick_hat.role_a_hits, kick_hat.role_b_hits), (8, 4));
        assert!((kick_hat.lock_score - 0.5).abs() < 1e-12);

        let kick_snare = result.get("Snare", "Kick").unwrap();
        assert_eq!(kick_snare.coincidence_count, 0);
        assert_eq!(kick_snare.lock_score, 0.0);

        assert_eq!(result.tightest().unwrap().role_b, "Kick");
    }

    #[test]
    fn test_identical_parts_fully_locked() {
        let ruler = BarTrack::uniform(1, 480, 4);
        let events = vec![
            make_event(1, "Kick", 1.0),
            make_event(1, "Crash", 1.0),
        ];
        let result = extract(&matrix::build_all(&events, &ruler, 16));
        assert!((result.get("Crash", "Kick").unwrap().lock_score - 1.0).abs() < 1e-12);
    }
}
