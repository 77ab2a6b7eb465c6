//! Lexicon/rule-based sentiment scoring
//!
//! Compound polarity in the style of VADER:
//! - each token carries a valence from the lexicon (range -4..4)
//! - boosters in the three preceding tokens raise or lower its magnitude
//! - a negation in the three preceding tokens flips and dampens it
//! - ALL-CAPS tokens in mixed-case text are emphasized
//! - valences before "but" are halved, after it raised by half
//! - `!` and `?` amplify the total away from zero
//!
//! The sum is squashed into [-1, 1] with `x / sqrt(x² + 15)`.

use csra_common::SentimentLabel;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Saturation constant of the normalization transform
pub const COMPOUND_ALPHA: f64 = 15.0;

/// Magnitude added or removed by a booster word
const BOOSTER_INCR: f64 = 0.293;

/// Magnitude added by ALL-CAPS emphasis
const CAPS_INCR: f64 = 0.733;

/// Multiplier applied to a negated valence
const NEGATION_SCALAR: f64 = -0.74;

/// Tokens before a sentiment word inspected for boosters and negations
const LOOKBACK: usize = 3;

/// Amplification per exclamation mark (max 4 counted)
const EXCLAMATION_INCR: f64 = 0.292;

/// Amplification per question mark when 2-3 are present
const QUESTION_INCR: f64 = 0.18;

/// Amplification when more than 3 question marks are present
const QUESTION_MAX: f64 = 0.96;

/// Built-in word valences
const VALENCES: &[(&str, f64)] = &[
    // positive
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("best", 3.2),
    ("better", 1.9),
    ("brilliant", 2.8),
    ("clean", 1.7),
    ("convenient", 1.7),
    ("easy", 1.9),
    ("excellent", 2.7),
    ("fantastic", 2.6),
    ("fast", 1.2),
    ("fine", 0.8),
    ("fixed", 1.1),
    ("good", 1.9),
    ("great", 3.1),
    ("happy", 2.7),
    ("helpful", 1.7),
    ("intuitive", 1.5),
    ("like", 1.5),
    ("liked", 1.8),
    ("love", 3.2),
    ("loved", 2.9),
    ("loving", 2.9),
    ("nice", 1.8),
    ("perfect", 2.7),
    ("pleased", 1.9),
    ("protected", 1.6),
    ("recommend", 1.5),
    ("reliable", 1.7),
    ("safe", 1.9),
    ("satisfied", 1.8),
    ("secure", 1.4),
    ("simple", 1.0),
    ("smooth", 1.3),
    ("solid", 1.4),
    ("superb", 3.1),
    ("thank", 1.5),
    ("thanks", 1.9),
    ("trust", 2.3),
    ("trusted", 2.1),
    ("useful", 1.9),
    ("wonderful", 2.7),
    ("works", 1.0),
    ("worth", 0.9),
    // negative
    ("angry", -2.3),
    ("annoying", -1.9),
    ("awful", -2.0),
    ("bad", -2.5),
    ("breach", -1.5),
    ("broken", -2.1),
    ("bug", -1.0),
    ("buggy", -1.6),
    ("concerned", -1.4),
    ("confusing", -1.3),
    ("crash", -1.7),
    ("crashes", -1.7),
    ("crashing", -1.9),
    ("creepy", -1.8),
    ("dangerous", -2.1),
    ("disappointed", -1.9),
    ("disappointing", -2.2),
    ("error", -1.2),
    ("fail", -2.5),
    ("failed", -2.3),
    ("fails", -2.1),
    ("fake", -2.1),
    ("fraud", -2.8),
    ("frustrated", -2.0),
    ("frustrating", -2.1),
    ("garbage", -2.5),
    ("hacked", -1.7),
    ("hate", -2.7),
    ("horrible", -2.5),
    ("insecure", -1.6),
    ("invasive", -1.2),
    ("issue", -0.9),
    ("issues", -1.0),
    ("lag", -1.2),
    ("laggy", -1.5),
    ("leak", -1.4),
    ("leaked", -1.8),
    ("lost", -1.3),
    ("poor", -2.1),
    ("problem", -1.7),
    ("problems", -1.7),
    ("ripoff", -2.1),
    ("sad", -2.1),
    ("scam", -2.5),
    ("scammed", -2.6),
    ("slow", -1.1),
    ("spam", -1.5),
    ("stole", -2.2),
    ("stolen", -2.1),
    ("steal", -2.3),
    ("stupid", -2.4),
    ("suspicious", -1.5),
    ("terrible", -2.5),
    ("ugly", -2.3),
    ("unreliable", -1.9),
    ("unsafe", -1.9),
    ("unusable", -2.2),
    ("useless", -1.8),
    ("waste", -1.8),
    ("worried", -1.7),
    ("worry", -1.9),
    ("worse", -2.1),
    ("worst", -3.1),
    ("wrong", -2.1),
];

/// Built-in booster words and their signed increments
const BOOSTERS: &[(&str, f64)] = &[
    ("absolutely", BOOSTER_INCR),
    ("completely", BOOSTER_INCR),
    ("especially", BOOSTER_INCR),
    ("extremely", BOOSTER_INCR),
    ("highly", BOOSTER_INCR),
    ("incredibly", BOOSTER_INCR),
    ("really", BOOSTER_INCR),
    ("so", BOOSTER_INCR),
    ("super", BOOSTER_INCR),
    ("totally", BOOSTER_INCR),
    ("truly", BOOSTER_INCR),
    ("very", BOOSTER_INCR),
    ("barely", -BOOSTER_INCR),
    ("hardly", -BOOSTER_INCR),
    ("kinda", -BOOSTER_INCR),
    ("marginally", -BOOSTER_INCR),
    ("partly", -BOOSTER_INCR),
    ("slightly", -BOOSTER_INCR),
    ("somewhat", -BOOSTER_INCR),
];

/// Built-in negation words; any token ending in "n't" also negates
const NEGATIONS: &[&str] = &[
    "aint", "cannot", "cant", "dont", "doesnt", "didnt", "isnt", "wasnt", "wont", "never",
    "no", "nobody", "none", "nor", "not", "nothing", "nowhere", "neither", "without", "rarely",
    "seldom",
];

static DEFAULT_LEXICON: Lazy<SentimentLexicon> = Lazy::new(SentimentLexicon::builtin);

/// Word valences, boosters and negations
#[derive(Debug, Clone)]
pub struct SentimentLexicon {
    valences: HashMap<String, f64>,
    boosters: HashMap<String, f64>,
    negations: HashSet<String>,
}

impl SentimentLexicon {
    fn builtin() -> Self {
        Self {
            valences: VALENCES.iter().map(|(w, v)| (w.to_string(), *v)).collect(),
            boosters: BOOSTERS.iter().map(|(w, v)| (w.to_string(), *v)).collect(),
            negations: NEGATIONS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Valence of a lowercase word, if it carries sentiment
    pub fn valence(&self, word: &str) -> Option<f64> {
        self.valences.get(word).copied()
    }

    fn booster(&self, word: &str) -> Option<f64> {
        self.boosters.get(word).copied()
    }

    fn is_negation(&self, word: &str) -> bool {
        self.negations.contains(word) || word.ends_with("n't")
    }

    pub fn len(&self) -> usize {
        self.valences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valences.is_empty()
    }
}

impl Default for SentimentLexicon {
    fn default() -> Self {
        DEFAULT_LEXICON.clone()
    }
}

/// Scoring result for one text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentiment {
    /// Compound polarity in [-1.0, 1.0]
    pub compound: f64,
    pub label: SentimentLabel,
}

impl Sentiment {
    fn from_compound(compound: f64) -> Self {
        Self {
            compound,
            label: SentimentLabel::from_score(compound),
        }
    }
}

/// Deterministic compound-polarity scorer
#[derive(Debug, Clone, Default)]
pub struct SentimentScorer {
    lexicon: SentimentLexicon,
}

impl SentimentScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or override word valences (clamped to [-4, 4])
    ///
    /// Non-finite valences are ignored.
    pub fn with_entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        for (word, valence) in entries {
            let word: String = word.into();
            if !valence.is_finite() {
                warn!(word = %word, "Ignoring non-finite sentiment valence");
                continue;
            }
            self.lexicon
                .valences
                .insert(word.to_lowercase(), valence.clamp(-4.0, 4.0));
        }
        self
    }

    pub fn lexicon(&self) -> &SentimentLexicon {
        &self.lexicon
    }

    /// Score a review text
    pub fn score(&self, text: &str) -> Sentiment {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Sentiment::from_compound(0.0);
        }

        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let caps_differ = is_caps_differential(&tokens);

        let mut valences: Vec<f64> = Vec::with_capacity(tokens.len());
        for (i, word) in lowered.iter().enumerate() {
            if self.lexicon.booster(word).is_some() || self.lexicon.is_negation(word) {
                valences.push(0.0);
                continue;
            }
            let Some(base) = self.lexicon.valence(word) else {
                valences.push(0.0);
                continue;
            };

            let mut valence = base;
            if caps_differ && is_all_caps(tokens[i]) {
                valence += CAPS_INCR * base.signum();
            }

            for distance in 1..=LOOKBACK.min(i) {
                let prev = &lowered[i - distance];
                if let Some(incr) = self.lexicon.booster(prev) {
                    let mut scalar = incr * valence.signum();
                    if caps_differ && is_all_caps(tokens[i - distance]) {
                        scalar += CAPS_INCR * incr.signum() * valence.signum();
                    }
                    valence += scalar * distance_damping(distance);
                }
            }

            let negated = (1..=LOOKBACK.min(i)).any(|d| self.lexicon.is_negation(&lowered[i - d]));
            if negated {
                valence *= NEGATION_SCALAR;
            }

            valences.push(valence);
        }

        if let Some(but_index) = lowered.iter().position(|w| w == "but") {
            for (i, v) in valences.iter_mut().enumerate() {
                if i < but_index {
                    *v *= 0.5;
                } else if i > but_index {
                    *v *= 1.5;
                }
            }
        }

        let mut sum: f64 = valences.iter().sum();
        let emphasis = punctuation_emphasis(text);
        if sum > 0.0 {
            sum += emphasis;
        } else if sum < 0.0 {
            sum -= emphasis;
        }

        Sentiment::from_compound(normalize_score(sum))
    }
}

/// Squash a raw valence sum into [-1, 1]
pub fn normalize_score(sum: f64) -> f64 {
    if sum == 0.0 {
        return 0.0;
    }
    (sum / (sum * sum + COMPOUND_ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Split on whitespace and trim surrounding punctuation, keeping inner
/// apostrophes ("don't") and casing
fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_all_caps(token: &str) -> bool {
    token.chars().any(char::is_alphabetic)
        && token.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
}

/// True when some, but not all, tokens are ALL-CAPS
fn is_caps_differential(tokens: &[&str]) -> bool {
    let caps = tokens.iter().filter(|t| is_all_caps(t)).count();
    caps > 0 && caps < tokens.len()
}

fn distance_damping(distance: usize) -> f64 {
    match distance {
        1 => 1.0,
        2 => 0.95,
        _ => 0.9,
    }
}

fn punctuation_emphasis(text: &str) -> f64 {
    let exclamations = text.matches('!').count().min(4) as f64 * EXCLAMATION_INCR;
    let questions = match text.matches('?').count() {
        0 | 1 => 0.0,
        n @ 2..=3 => n as f64 * QUESTION_INCR,
        _ => QUESTION_MAX,
    };
    exclamations + questions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(text: &str) -> f64 {
        SentimentScorer::new().score(text).compound
    }

    #[test]
    fn test_empty_text_is_neutral() {
        let s = SentimentScorer::new().score("");
        assert_eq!(s.compound, 0.0);
        assert_eq!(s.label, SentimentLabel::Neutral);

        let s = SentimentScorer::new().score("   !!! ");
        assert_eq!(s.compound, 0.0);
        assert_eq!(s.label, SentimentLabel::Neutral);
    }

    #[test]
    fn test_polarity_direction() {
        assert!(score("This app is great") > 0.05);
        assert!(score("This app is terrible") < -0.05);
        assert_eq!(score("The app opens a settings page"), 0.0);
    }

    #[test]
    fn test_negation_flips() {
        assert!(score("This app is not great") < -0.05);
        assert!(score("I don't hate it") > 0.0);
    }

    #[test]
    fn test_boosters_and_emphasis_increase_magnitude() {
        let plain = score("The app is good");
        assert!(score("The app is very good") > plain);
        assert!(score("The app is good!!!") > plain);
        assert!(score("The app is GOOD") > plain);
        assert!(score("The app is slightly good") < plain);
    }

    #[test]
    fn test_but_shifts_weight_to_second_clause() {
        let s = SentimentScorer::new().score("The design is good but the ads are terrible");
        assert_eq!(s.label, SentimentLabel::Negative);
    }

    #[test]
    fn test_compound_is_bounded() {
        let text = "great amazing awesome best love perfect ".repeat(50);
        let s = score(&text);
        assert!(s <= 1.0 && s > 0.99);
        let text = "worst terrible scam fraud hate ".repeat(50);
        let s = score(&text);
        assert!((-1.0..-0.99).contains(&s));
    }

    #[test]
    fn test_label_consistent_with_thresholds() {
        let scorer = SentimentScorer::new();
        for text in [
            "",
            "ok",
            "fine",
            "not bad",
            "meh, it works i guess",
            "Worried about privacy",
            "LOVE IT",
            "hardly useful??",
            "Good app but crashes",
        ] {
            let s = scorer.score(text);
            assert_eq!(s.label, SentimentLabel::from_score(s.compound), "text: {}", text);
            assert!((-1.0..=1.0).contains(&s.compound));
        }
    }

    #[test]
    fn test_deterministic() {
        let scorer = SentimentScorer::new();
        let text = "Very SLOW and it leaked my data!!";
        assert_eq!(scorer.score(text), scorer.score(text));
    }

    #[test]
    fn test_custom_entries() {
        let scorer = SentimentScorer::new().with_entries([("bloatware", -2.0), ("Snappy", 9.0)]);
        assert!(scorer.score("pure bloatware").compound < 0.0);
        assert_eq!(scorer.lexicon().valence("snappy"), Some(4.0));
    }

    #[test]
    fn test_non_finite_entries_ignored() {
        let scorer = SentimentScorer::new().with_entries([
            ("glitchy", f64::NAN),
            ("laggy", f64::INFINITY),
            ("great", f64::NEG_INFINITY),
        ]);
        let builtin = SentimentScorer::new();
        assert_eq!(scorer.lexicon().valence("glitchy"), None);
        assert_eq!(scorer.lexicon().valence("laggy"), builtin.lexicon().valence("laggy"));
        assert_eq!(scorer.lexicon().valence("great"), builtin.lexicon().valence("great"));

        let compound = scorer.score("glitchy laggy but great").compound;
        assert!(compound.is_finite());
        assert!((-1.0..=1.0).contains(&compound));
    }

    #[test]
    fn test_normalize_score_matches_formula() {
        let x: f64 = 3.1;
        assert!((normalize_score(x) - x / (x * x + 15.0).sqrt()).abs() < 1e-12);
        assert_eq!(normalize_score(0.0), 0.0);
    }
}
