// ai
//! 😊😐😠 Sentiment: reading the room, one tweet at a time.
//!
//! Two halves:
//! - [`PolarityScorer`]: anything that turns text into a float, conventionally in `[-1.0, 1.0]`.
//!   Injected into the normalizer so tests can hand it a rigged scorer.
//! - [`classify`]: the bucketing rule. Evaluated top to bottom, and the neutral band
//!   is `[0.0, 0.2]`, lopsided on purpose. Existing dashboards were built on this
//!   exact band, so it stays lopsided.

use crate::common::Sentiment;

/// 🎚️ Upper edge of the neutral band, inclusive.
pub const NEUTRAL_CEILING: f64 = 0.2;

/// 📏 Turns text into a polarity score. Negative is grumpy, positive is delighted.
pub trait PolarityScorer: Send + Sync {
    fn polarity(&self, text: &str) -> f64;
}

/// 🧪 Closures are scorers too. Great for tests, terrible for nuance.
impl<F> PolarityScorer for F
where
    F: Fn(&str) -> f64 + Send + Sync,
{
    fn polarity(&self, text: &str) -> f64 {
        self(text)
    }
}

/// 🪣 The bucketing rule: `< 0` negative, `<= 0.2` neutral, otherwise positive.
/// A scorer that returns NaN or infinity has no opinion, so that is neutral too.
pub fn classify(polarity: f64) -> Sentiment {
    if !polarity.is_finite() {
        Sentiment::Neutral
    } else if polarity < 0.0 {
        Sentiment::Negative
    } else if polarity <= NEUTRAL_CEILING {
        Sentiment::Neutral
    } else {
        Sentiment::Positive
    }
}

/// 📚 VADER lexical scorer. Returns the compound score, which already lives in `[-1, 1]`.
pub struct VaderScorer {
    analyzer: vader_sentiment::SentimentIntensityAnalyzer<'static>,
}

impl VaderScorer {
    pub fn new() -> Self {
        Self {
            analyzer: vader_sentiment::SentimentIntensityAnalyzer::new(),
        }
    }
}

impl Default for VaderScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VaderScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaderScorer").finish_non_exhaustive()
    }
}

impl PolarityScorer for VaderScorer {
    fn polarity(&self, text: &str) -> f64 {
        self.analyzer
            .polarity_scores(text)
            .get("compound")
            .copied()
            .unwrap_or(0.0)
    }
}
