use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::extract::fingerprint::{calculate_similarity, BarPatternFingerprint};

/// Two bars with different but similar patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub bar_a: u32,
    pub bar_b: u32,
    pub hash_a: String,
    pub hash_b: String,
    pub similarity: f64,
}

/// Patterns linked (transitively) by similar pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFamily {
    pub family_id: usize,
    /// Distinct hashes in the family, sorted.
    pub pattern_hashes: Vec<String>,
    /// Every bar playing one of the family's patterns, ascending.
    pub bar_numbers: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSimilarityResult {
    pub threshold: f64,
    pub similar_pairs: Vec<SimilarPair>,
    pub pattern_families: Vec<PatternFamily>,
    /// Mean similarity over every unordered pair of bars; 0 with fewer than two bars.
    pub average_similarity: f64,
}

impl PatternSimilarityResult {
    pub fn is_empty(&self) -> bool {
        self.similar_pairs.is_empty() && self.pattern_families.is_empty()
    }

    pub fn family_of(&self, pattern_hash: &str) -> Option<&PatternFamily> {
        self.pattern_families
            .iter()
            .find(|f| f.pattern_hashes.iter().any(|h| h == pattern_hash))
    }
}

/// Compare every unordered pair of bars.
///
/// Pairs sharing a hash are exact repeats (reported by the repetition detector), so
/// only pairs of different patterns at or above `threshold` become similar pairs.
pub fn analyze(fingerprints: &[BarPatternFingerprint], threshold: f64) -> PatternSimilarityResult {
    let n = fingerprints.len();
    if n < 2 {
        return PatternSimilarityResult {
            threshold,
            ..PatternSimilarityResult::default()
        };
    }

    // For each bar i, score it against every later bar j. Indexed collect keeps row order.
    let rows: Vec<(f64, Vec<SimilarPair>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let a = &fingerprints[i];
            let mut sum = 0.0;
            let mut pairs = Vec::new();
            for b in &fingerprints[i + 1..] {
                let sim = calculate_similarity(a, b);
                sum += sim;
                if a.pattern_hash != b.pattern_hash && sim >= threshold {
                    pairs.push(SimilarPair {
                        bar_a: a.bar_number,
                        bar_b: b.bar_number,
                        hash_a: a.pattern_hash.clone(),
                        hash_b: b.pattern_hash.clone(),
                        similarity: sim,
                    });
                }
            }
            (sum, pairs)
        })
        .collect();

    let pair_count = n * (n - 1) / 2;
    let total: f64 = rows.iter().map(|(sum, _)| sum).sum();
    let similar_pairs: Vec<SimilarPair> = rows.into_iter().flat_map(|(_, pairs)| pairs).collect();
    let pattern_families = group_families(fingerprints, &similar_pairs);

    log::debug!(
        "Similarity: {} bars, {} similar pairs, {} families",
        n,
        similar_pairs.len(),
        pattern_families.len()
    );

    PatternSimilarityResult {
        threshold,
        average_similarity: total / pair_count as f64,
        similar_pairs,
        pattern_families,
    }
}

/// Union-find over distinct hashes, joined by similar pairs.
fn group_families(
    fingerprints: &[BarPatternFingerprint],
    pairs: &[SimilarPair],
) -> Vec<PatternFamily> {
    // BTreeMap gives each hash a stable index in hash order
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    for pair in pairs {
        index.insert(pair.hash_a.as_str(), 0);
        index.insert(pair.hash_b.as_str(), 0);
    }
    for (i, slot) in index.values_mut().enumerate() {
        *slot = i;
    }

    let mut parent: Vec<usize> = (0..index.len()).collect();
    for pair in pairs {
        let a = find(&mut parent, index[pair.hash_a.as_str()]);
        let b = find(&mut parent, index[pair.hash_b.as_str()]);
        if a != b {
            // Smaller root wins so the result never depends on pair order
            let (root, child) = if a < b { (a, b) } else { (b, a) };
            parent[child] = root;
        }
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (hash, &i) in &index {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(hash.to_string());
    }

    groups
        .into_values()
        .enumerate()
        .map(|(family_id, pattern_hashes)| {
            let mut bar_numbers: Vec<u32> = fingerprints
                .iter()
                .filter(|fp| pattern_hashes.contains(&fp.pattern_hash))
                .map(|fp| fp.bar_number)
                .collect();
            bar_numbers.sort_unstable();
            PatternFamily {
                family_id,
                pattern_hashes,
                bar_numbers,
            }
        })
        .collect()
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::fingerprint::compute_pattern_hash;

    /// Fingerprint with a single role whose onsets are `slots`.
    fn make_fp(bar: u32, role: &str, slots: &[u32]) -> BarPatternFingerprint {
        let mask = slots.iter().fold(0u64, |m, &s| m | (1 << s));
        let mut masks = BTreeMap::new();
        if mask != 0 {
            masks.insert(role.to_string(), mask);
        }
        BarPatternFingerprint {
            bar_number: bar,
            beats_per_bar: 4,
            grid_resolution: 16,
            pattern_hash: compute_pattern_hash(&masks),
            role_onset_bitmasks: masks,
            role_velocities: BTreeMap::new(),
            role_event_counts: BTreeMap::new(),
        }
    }

    const EIGHTHS: [u32; 8] = [0, 2, 4, 6, 8, 10, 12, 14];

    #[test]
    fn test_too_few_bars() {
        let result = analyze(&[make_fp(1, "ClosedHat", &EIGHTHS)], 0.8);
        assert!(result.is_empty());
        assert_eq!(result.average_similarity, 0.0);
        assert!((result.threshold - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_identical_bars_are_not_similar_pairs() {
        let fps = vec![make_fp(1, "ClosedHat", &EIGHTHS), make_fp(2, "ClosedHat", &EIGHTHS)];
        let result = analyze(&fps, 0.8);
        assert!(result.similar_pairs.is_empty());
        assert!((result.average_similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_similar_variation_detected() {
        // 7 of 8 shared onsets → 7/8 = 0.875
        let fps = vec![
            make_fp(1, "ClosedHat", &EIGHTHS),
            make_fp(2, "ClosedHat", &EIGHTHS[..7]),
            make_fp(3, "ClosedHat", &[1, 3]),
        ];
        let result = analyze(&fps, 0.8);
        assert_eq!(result.similar_pairs.len(), 1);
        let pair = &result.similar_pairs[0];
        assert_eq!((pair.bar_a, pair.bar_b), (1, 2));
        assert!((pair.similarity - 0.875).abs() < 1e-12);
        assert_eq!(result.pattern_families.len(), 1);
        assert_eq!(result.pattern_families[0].pattern_hashes.len(), 2);
        assert_eq!(result.pattern_families[0].bar_numbers, vec![1, 2]);
        assert!(result.family_of(&fps[2].pattern_hash).is_none());
    }

    #[test]
    fn test_families_are_transitive() {
        // A~B and B~C, but A and C differ by two onsets (6/8 = 0.75 < 0.8)
        let a: Vec<u32> = EIGHTHS.to_vec();
        let b: Vec<u32> = EIGHTHS[..7].to_vec();
        let c: Vec<u32> = EIGHTHS[..6].to_vec();
        let fps = vec![
            make_fp(1, "ClosedHat", &a),
            make_fp(2, "ClosedHat", &b),
            make_fp(3, "ClosedHat", &c),
        ];
        let result = analyze(&fps, 0.8);
        assert_eq!(result.similar_pairs.len(), 2);
        assert_eq!(result.pattern_families.len(), 1);
        assert_eq!(result.pattern_families[0].pattern_hashes.len(), 3);
    }

    #[test]
    fn test_family_ids_stable_across_input_order() {
        let fps = vec![
            make_fp(1, "ClosedHat", &EIGHTHS),
            make_fp(2, "ClosedHat", &EIGHTHS[..7]),
            make_fp(3, "Ride", &EIGHTHS),
            make_fp(4, "Ride", &EIGHTHS[1..]),
        ];
        let mut reversed = fps.clone();
        reversed.reverse();
        let forward = analyze(&fps, 0.8);
        let backward = analyze(&reversed, 0.8);
        let hashes = |r: &PatternSimilarityResult| {
            r.pattern_families.iter().map(|f| f.pattern_hashes.clone()).collect::<Vec<_>>()
        };
        assert_eq!(forward.pattern_families.len(), 2);
        assert_eq!(hashes(&forward), hashes(&backward));
    }
}
