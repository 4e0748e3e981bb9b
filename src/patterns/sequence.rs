use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::extract::fingerprint::BarPatternFingerprint;

/// A multi-bar hash window and every bar where it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSequence {
    pub pattern_hashes: Vec<String>,
    pub start_bars: Vec<u32>,
    pub occurrence_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequencePatternResult {
    pub two_bar_sequences: Vec<BarSequence>,
    pub four_bar_sequences: Vec<BarSequence>,
}

impl SequencePatternResult {
    pub fn is_empty(&self) -> bool {
        self.two_bar_sequences.is_empty() && self.four_bar_sequences.is_empty()
    }

    /// Windows of the given length that occur more than once.
    pub fn repeating(&self, window: usize) -> Vec<&BarSequence> {
        let sequences = match window {
            2 => &self.two_bar_sequences,
            4 => &self.four_bar_sequences,
            _ => return Vec::new(),
        };
        sequences.iter().filter(|s| s.occurrence_count > 1).collect()
    }
}

pub fn detect(fingerprints: &[BarPatternFingerprint]) -> SequencePatternResult {
    SequencePatternResult {
        two_bar_sequences: sliding_windows(fingerprints, 2),
        four_bar_sequences: sliding_windows(fingerprints, 4),
    }
}

/// Slide a `window`-bar window over the bar sequence and group identical windows.
/// Ordered by occurrence count (descending), then by first start bar.
pub fn sliding_windows(fingerprints: &[BarPatternFingerprint], window: usize) -> Vec<BarSequence> {
    if window == 0 || fingerprints.len() < window {
        return Vec::new();
    }

    // Insertion order = first start bar, so output never depends on HashMap order
    let mut index: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut sequences: Vec<BarSequence> = Vec::new();

    for w in fingerprints.windows(window) {
        let key: Vec<&str> = w.iter().map(|fp| fp.pattern_hash.as_str()).collect();
        let start = w[0].bar_number;
        match index.get(&key) {
            Some(&i) => {
                sequences[i].start_bars.push(start);
                sequences[i].occurrence_count += 1;
            }
            None => {
                index.insert(key.clone(), sequences.len());
                sequences.push(BarSequence {
                    pattern_hashes: key.iter().map(|h| h.to_string()).collect(),
                    start_bars: vec![start],
                    occurrence_count: 1,
                });
            }
        }
    }

    // Stable sort keeps first-appearance order among equal counts
    sequences.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
    sequences
}
