//! Event drivers: turn canonicized text into event (feature) lists.
//!
//! All drivers here are per-document and stateless. Character-based drivers
//! operate on Unicode scalar values; word and sentence drivers use UAX #29
//! segmentation from `unicode-segmentation`.

use unicode_segmentation::UnicodeSegmentation;

use crate::errors::{GaapError, Result};
use crate::pipeline::params::{ParamSpec, ParameterSet};
use crate::pipeline::traits::{Described, EventDriver, ExecutionMode};
use crate::types::EventSet;

/// Overlapping windows of `n` chars, joined back into strings.
fn char_ngrams(chars: &[char], n: usize) -> EventSet {
    if n == 0 || chars.len() < n {
        return Vec::new();
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

// ============================================================================
// Character n-grams
// ============================================================================

pub struct CharacterNGrams {
    params: ParameterSet,
}

impl Default for CharacterNGrams {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(Self::NAME, vec![ParamSpec::int_range("n", 1, 20, 2)]),
        }
    }
}

impl Described for CharacterNGrams {
    const NAME: &'static str = "CharacterNGrams";
    const DESCRIPTION: &'static str =
        "Groups of N successive characters (sliding window); N is given as a parameter.";
}

impl_module!(CharacterNGrams, ExecutionMode::PerDocument);

impl EventDriver for CharacterNGrams {
    fn extract(&self, text: &str) -> Result<EventSet> {
        let n = self.params.int("n")? as usize;
        let chars: Vec<char> = text.chars().collect();
        let events = char_ngrams(&chars, n);
        if events.is_empty() {
            return Err(GaapError::module(
                Self::NAME,
                format!(
                    "text of {} characters is shorter than n={n}; check the output of previous modules",
                    chars.len()
                ),
            ));
        }
        Ok(events)
    }
}

// ============================================================================
// Word drivers
// ============================================================================

pub struct WhitespaceWords {
    params: ParameterSet,
}

impl Default for WhitespaceWords {
    fn default() -> Self {
        Self {
            params: ParameterSet::empty(Self::NAME),
        }
    }
}

impl Described for WhitespaceWords {
    const NAME: &'static str = "WhitespaceWords";
    const DESCRIPTION: &'static str =
        "Returns a list of words where a word is a whitespace-delimited unit.";
}

impl_module!(WhitespaceWords, ExecutionMode::PerDocument);

impl EventDriver for WhitespaceWords {
    fn extract(&self, text: &str) -> Result<EventSet> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }
}

pub struct Words {
    params: ParameterSet,
}

impl Default for Words {
    fn default() -> Self {
        Self {
            params: ParameterSet::empty(Self::NAME),
        }
    }
}

impl Described for Words {
    const NAME: &'static str = "Words";
    const DESCRIPTION: &'static str = "Words as defined by Unicode word boundaries (UAX #29).";
}

impl_module!(Words, ExecutionMode::PerDocument);

impl EventDriver for Words {
    fn extract(&self, text: &str) -> Result<EventSet> {
        Ok(text.unicode_words().map(str::to_string).collect())
    }
}

pub struct Sentences {
    params: ParameterSet,
}

impl Default for Sentences {
    fn default() -> Self {
        Self {
            params: ParameterSet::empty(Self::NAME),
        }
    }
}

impl Described for Sentences {
    const NAME: &'static str = "Sentences";
    const DESCRIPTION: &'static str =
        "Sentences as defined by Unicode sentence boundaries (UAX #29).";
}

impl_module!(Sentences, ExecutionMode::PerDocument);

impl EventDriver for Sentences {
    fn extract(&self, text: &str) -> Result<EventSet> {
        Ok(text
            .unicode_sentences()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

pub struct WordNGrams {
    params: ParameterSet,
}

impl Default for WordNGrams {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(Self::NAME, vec![ParamSpec::int_range("n", 1, 10, 2)]),
        }
    }
}

impl Described for WordNGrams {
    const NAME: &'static str = "WordNGrams";
    const DESCRIPTION: &'static str =
        "Groups of N successive whitespace-delimited words, joined by a space.";
}

impl_module!(WordNGrams, ExecutionMode::PerDocument);

impl EventDriver for WordNGrams {
    fn extract(&self, text: &str) -> Result<EventSet> {
        let n = self.params.int("n")? as usize;
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() < n {
            return Ok(Vec::new());
        }
        Ok(words.windows(n).map(|w| w.join(" ")).collect())
    }
}

// ============================================================================
// Skip-grams and positions
// ============================================================================

pub struct KSkipCharacterNGrams {
    params: ParameterSet,
}

impl Default for KSkipCharacterNGrams {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![
                    ParamSpec::int_range("k", 0, 10, 1),
                    ParamSpec::int_range("n", 1, 20, 2),
                ],
            ),
        }
    }
}

impl Described for KSkipCharacterNGrams {
    const NAME: &'static str = "KSkipCharacterNGrams";
    const DESCRIPTION: &'static str =
        "Character n-grams over the text keeping only every (k+1)-th character.";
}

impl_module!(KSkipCharacterNGrams, ExecutionMode::PerDocument);

impl EventDriver for KSkipCharacterNGrams {
    fn extract(&self, text: &str) -> Result<EventSet> {
        let k = self.params.int("k")? as usize;
        let n = self.params.int("n")? as usize;
        let kept: Vec<char> = text.chars().step_by(k + 1).collect();
        Ok(char_ngrams(&kept, n))
    }
}

pub struct CharacterPosition {
    params: ParameterSet,
}

impl CharacterPosition {
    const DELIMITERS: [&'static str; 4] = [
        "<whitespace(s)>",
        ", (comma)",
        ". (period)",
        "; (semicolon)",
    ];
}

impl Default for CharacterPosition {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(
                Self::NAME,
                vec![ParamSpec::choice(
                    "delimiter",
                    &Self::DELIMITERS,
                    Self::DELIMITERS[0],
                )],
            ),
        }
    }
}

impl Described for CharacterPosition {
    const NAME: &'static str = "CharacterPosition";
    const DESCRIPTION: &'static str =
        "Converts delimited words into letters tagged with their position within the word.";
}

impl_module!(CharacterPosition, ExecutionMode::PerDocument);

impl EventDriver for CharacterPosition {
    fn extract(&self, text: &str) -> Result<EventSet> {
        let delimiter = self.params.text("delimiter")?;
        let words: Vec<&str> = match delimiter.chars().next() {
            Some(d) if delimiter != Self::DELIMITERS[0] => text.split(d).collect(),
            _ => text.split_whitespace().collect(),
        };
        Ok(words
            .iter()
            .flat_map(|w| w.chars().enumerate().map(|(i, c)| format!("{c}{i}")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::params::ParamValue;
    use crate::pipeline::traits::Module;

    #[test]
    fn test_character_ngrams_default_bigrams() {
        let d = CharacterNGrams::default();
        assert_eq!(d.extract("abcd").unwrap(), vec!["ab", "bc", "cd"]);
    }

    #[test]
    fn test_character_ngrams_unicode() {
        let mut d = CharacterNGrams::default();
        d.set_param("n", ParamValue::Int(1)).unwrap();
        assert_eq!(d.extract("né").unwrap(), vec!["n", "é"]);
    }

    #[test]
    fn test_character_ngrams_short_text_fails() {
        let mut d = CharacterNGrams::default();
        d.set_param("n", ParamValue::Int(5)).unwrap();
        assert!(d.extract("abc").is_err());
    }

    #[test]
    fn test_whitespace_words() {
        let d = WhitespaceWords::default();
        assert_eq!(d.extract(" the  cat\tsat ").unwrap(), vec!["the", "cat", "sat"]);
    }

    #[test]
    fn test_unicode_words_drop_punctuation() {
        let d = Words::default();
        assert_eq!(d.extract("Hello, world!").unwrap(), vec!["Hello", "world"]);
    }

    #[test]
    fn test_sentences() {
        let d = Sentences::default();
        let out = d.extract("One here. Two there! Three?").unwrap();
        assert_eq!(out, vec!["One here.", "Two there!", "Three?"]);
    }

    #[test]
    fn test_word_ngrams() {
        let d = WordNGrams::default();
        assert_eq!(d.extract("a b c").unwrap(), vec!["a b", "b c"]);
        assert!(d.extract("solo").unwrap().is_empty());
    }

    #[test]
    fn test_k_skip_ngrams() {
        let mut d = KSkipCharacterNGrams::default();
        // k = 1 keeps a, c, e
        assert_eq!(d.extract("abcde").unwrap(), vec!["ac", "ce"]);
        d.set_param("k", ParamValue::Int(0)).unwrap();
        assert_eq!(d.extract("abc").unwrap(), vec!["ab", "bc"]);
    }

    #[test]
    fn test_character_position() {
        let d = CharacterPosition::default();
        assert_eq!(
            d.extract("ab c").unwrap(),
            vec!["a0", "b1", "c0"]
        );
    }

    #[test]
    fn test_character_position_comma_delimiter() {
        let mut d = CharacterPosition::default();
        d.set_param("delimiter", ", (comma)".into()).unwrap();
        assert_eq!(d.extract("ab,c").unwrap(), vec!["a0", "b1", "c0"]);
    }
}
