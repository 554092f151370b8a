//! Caption composition for triplets annotated by two independent annotators.
//!
//! Training draws one of four literal compositions uniformly; evaluation uses
//! a fixed composition so results are reproducible.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// One of the four ways two captions `A`, `B` are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionComposition {
    /// "A and B"
    FirstAndSecond,
    /// "B and A"
    SecondAndFirst,
    /// "A"
    FirstOnly,
    /// "B"
    SecondOnly,
}

impl CaptionComposition {
    /// Map a uniform draw in \[0, 1) onto its quartile.
    pub fn from_draw(r: f64) -> Self {
        if r < 0.25 {
            Self::FirstAndSecond
        } else if r < 0.5 {
            Self::SecondAndFirst
        } else if r < 0.75 {
            Self::FirstOnly
        } else {
            Self::SecondOnly
        }
    }

    /// Map a fixed selector 0-3 onto the matching quartile.
    pub fn from_selector(selector: u8) -> Option<Self> {
        match selector {
            0 => Some(Self::FirstAndSecond),
            1 => Some(Self::SecondAndFirst),
            2 => Some(Self::FirstOnly),
            3 => Some(Self::SecondOnly),
            _ => None,
        }
    }

    /// Compose two captions, stripping edge punctuation from each fragment.
    pub fn compose(&self, first: &str, second: &str) -> String {
        let a = strip_caption(first);
        let b = strip_caption(second);
        match self {
            Self::FirstAndSecond => format!("{a} and {b}"),
            Self::SecondAndFirst => format!("{b} and {a}"),
            Self::FirstOnly => a.to_string(),
            Self::SecondOnly => b.to_string(),
        }
    }
}

/// Strip leading/trailing `.`, `?`, `,` and spaces.
pub fn strip_caption(caption: &str) -> &str {
    caption.trim_matches(|c| matches!(c, '.' | '?' | ',' | ' '))
}

/// Source of caption choices: a seeded RNG or a fixed composition.
#[derive(Debug, Clone)]
pub enum CaptionSelector {
    /// Uniform random draws (training)
    Random(StdRng),
    /// Deterministic override (evaluation, reproducible runs)
    Fixed(CaptionComposition),
}

impl CaptionSelector {
    /// Random selector, seeded for reproducibility when `seed` is given.
    pub fn random(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::Random(rng)
    }

    /// Fixed selector.
    pub fn fixed(composition: CaptionComposition) -> Self {
        Self::Fixed(composition)
    }

    /// Evaluation default: always "A and B".
    pub fn evaluation() -> Self {
        Self::Fixed(CaptionComposition::FirstAndSecond)
    }

    /// Apply the quartile composition policy.
    ///
    /// A single caption is returned unmodified; with more than two, only the
    /// first two take part.
    pub fn compose(&mut self, captions: &[String]) -> String {
        match captions {
            [] => String::new(),
            [only] => only.clone(),
            [first, second, ..] => {
                let composition = match self {
                    Self::Random(rng) => CaptionComposition::from_draw(rng.gen::<f64>()),
                    Self::Fixed(composition) => *composition,
                };
                composition.compose(first, second)
            }
        }
    }

    /// Pick one caption uniformly (random) or the first one (fixed).
    pub fn choose(&mut self, captions: &[String]) -> String {
        match self {
            Self::Random(rng) => captions.choose(rng).cloned().unwrap_or_default(),
            Self::Fixed(_) => captions.first().cloned().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Vec<String> {
        vec!["is red.".to_string(), " has long sleeves?".to_string()]
    }

    #[test]
    fn test_quartile_boundaries() {
        assert_eq!(CaptionComposition::from_draw(0.0), CaptionComposition::FirstAndSecond);
        assert_eq!(CaptionComposition::from_draw(0.2499), CaptionComposition::FirstAndSecond);
        assert_eq!(CaptionComposition::from_draw(0.25), CaptionComposition::SecondAndFirst);
        assert_eq!(CaptionComposition::from_draw(0.4999), CaptionComposition::SecondAndFirst);
        assert_eq!(CaptionComposition::from_draw(0.5), CaptionComposition::FirstOnly);
        assert_eq!(CaptionComposition::from_draw(0.75), CaptionComposition::SecondOnly);
        assert_eq!(CaptionComposition::from_draw(0.9999), CaptionComposition::SecondOnly);
    }

    #[test]
    fn test_compositions_strip_punctuation() {
        let captions = pair();
        let (a, b) = (&captions[0], &captions[1]);
        assert_eq!(
            CaptionComposition::FirstAndSecond.compose(a, b),
            "is red and has long sleeves"
        );
        assert_eq!(
            CaptionComposition::SecondAndFirst.compose(a, b),
            "has long sleeves and is red"
        );
        assert_eq!(CaptionComposition::FirstOnly.compose(a, b), "is red");
        assert_eq!(CaptionComposition::SecondOnly.compose(a, b), "has long sleeves");
    }

    #[test]
    fn test_selector_mapping() {
        assert_eq!(
            CaptionComposition::from_selector(1),
            Some(CaptionComposition::SecondAndFirst)
        );
        assert_eq!(CaptionComposition::from_selector(4), None);
    }

    #[test]
    fn test_single_caption_unmodified() {
        let mut selector = CaptionSelector::random(Some(7));
        let captions = vec!["  is blue.".to_string()];
        assert_eq!(selector.compose(&captions), "  is blue.");
    }

    #[test]
    fn test_evaluation_selector_is_first_quartile() {
        let mut selector = CaptionSelector::evaluation();
        for _ in 0..5 {
            assert_eq!(selector.compose(&pair()), "is red and has long sleeves");
        }
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let draw = |seed| {
            let mut selector = CaptionSelector::random(Some(seed));
            (0..20).map(|_| selector.compose(&pair())).collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }

    #[test]
    fn test_random_draws_cover_all_compositions() {
        let mut selector = CaptionSelector::random(Some(3));
        let outputs: std::collections::HashSet<String> =
            (0..200).map(|_| selector.compose(&pair())).collect();
        assert_eq!(outputs.len(), 4);
    }

    #[test]
    fn test_choose_fixed_takes_first() {
        let mut selector = CaptionSelector::evaluation();
        assert_eq!(selector.choose(&pair()), "is red.");
        assert_eq!(selector.choose(&[]), "");
    }
}
