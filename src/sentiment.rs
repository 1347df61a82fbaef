use std::collections::HashMap;

use lazy_static::lazy_static;

// Polarity of common English words in [-1, 1]. Adjective-heavy, in the
// spirit of the subjectivity lexicons used by pattern-style scorers.
const LEXICON: &[(&str, f64)] = &[
    ("amazing", 0.6),
    ("awesome", 1.0),
    ("beautiful", 0.85),
    ("best", 1.0),
    ("better", 0.5),
    ("big", 0.0),
    ("brilliant", 0.9),
    ("cool", 0.35),
    ("crazy", -0.6),
    ("cute", 0.5),
    ("delicious", 1.0),
    ("easy", 0.43),
    ("epic", 0.1),
    ("excellent", 1.0),
    ("exciting", 0.3),
    ("fantastic", 0.4),
    ("fun", 0.3),
    ("funny", 0.25),
    ("glad", 0.5),
    ("good", 0.7),
    ("great", 0.8),
    ("happy", 0.8),
    ("hot", 0.25),
    ("incredible", 0.9),
    ("interesting", 0.5),
    ("love", 0.5),
    ("lovely", 0.5),
    ("lucky", 0.33),
    ("magic", 0.5),
    ("nice", 0.6),
    ("perfect", 1.0),
    ("popular", 0.6),
    ("pretty", 0.25),
    ("special", 0.36),
    ("strong", 0.43),
    ("super", 0.33),
    ("sweet", 0.35),
    ("top", 0.5),
    ("true", 0.35),
    ("ultimate", 0.0),
    ("win", 0.8),
    ("wonderful", 1.0),
    ("angry", -0.5),
    ("awful", -1.0),
    ("bad", -0.7),
    ("boring", -1.0),
    ("broken", -0.4),
    ("cry", -0.5),
    ("dangerous", -0.6),
    ("dark", -0.15),
    ("dead", -0.2),
    ("difficult", -0.5),
    ("dumb", -0.38),
    ("fail", -0.5),
    ("fake", -0.5),
    ("hard", -0.29),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("lost", 0.0),
    ("mad", -0.63),
    ("poor", -0.4),
    ("sad", -0.5),
    ("scary", -0.5),
    ("shocking", -1.0),
    ("sick", -0.71),
    ("stupid", -0.8),
    ("terrible", -1.0),
    ("ugly", -0.7),
    ("wrong", -0.5),
    ("worse", -0.4),
    ("worst", -1.0),
];

// Multipliers applied to the next scored word.
const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.3),
    ("so", 1.3),
    ("extremely", 1.5),
    ("most", 1.2),
    ("slightly", 0.5),
    ("somewhat", 0.7),
];

const NEGATIONS: &[&str] = &["not", "never", "no", "isn't", "don't", "doesn't", "can't", "won't"];

// Negated words keep half their magnitude with the sign flipped.
const NEGATION_FACTOR: f64 = -0.5;

lazy_static! {
    static ref POLARITY: HashMap<&'static str, f64> = LEXICON.iter().copied().collect();
    static ref INTENSITY: HashMap<&'static str, f64> = INTENSIFIERS.iter().copied().collect();
}

/// Lexicon-based polarity of `text`, in [-1, 1]. Zero when no word is known.
///
/// Each known word contributes its polarity, scaled by a preceding
/// intensifier and flipped by a preceding negation; the score is the mean
/// of the contributions.
pub fn polarity(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let mut contributions = Vec::new();
    let mut intensity = 1.0;
    let mut negated = false;

    for token in lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
    {
        if NEGATIONS.contains(&token) {
            negated = true;
            continue;
        }
        if let Some(&score) = POLARITY.get(token) {
            let mut value = (score * intensity).clamp(-1.0, 1.0);
            if negated {
                value *= NEGATION_FACTOR;
            }
            contributions.push(value);
            intensity = 1.0;
            negated = false;
            continue;
        }
        if let Some(&factor) = INTENSITY.get(token) {
            intensity = factor;
            continue;
        }
        intensity = 1.0;
    }

    if contributions.is_empty() {
        return 0.0;
    }
    let mean = contributions.iter().sum::<f64>() / contributions.len() as f64;
    mean.clamp(-1.0, 1.0)
}
