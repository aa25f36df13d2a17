//! Text canonicizers.
//!
//! All built-in canonicizers are pure per-document transforms, so they run
//! in [`ExecutionMode::PerDocument`] and may fan out across the pool.

use crate::errors::Result;
use crate::pipeline::params::ParameterSet;
use crate::pipeline::traits::{Canonicizer, Described, ExecutionMode};

/// Characters treated as punctuation by the punctuation canonicizers.
pub const PUNCTUATION: &str = ",.?!\"'`;:-()&$";

fn is_punctuation(c: char) -> bool {
    PUNCTUATION.contains(c)
}

macro_rules! simple_canonicizer {
    ($ty:ident, $name:expr, $desc:expr) => {
        pub struct $ty {
            params: ParameterSet,
        }

        impl Default for $ty {
            fn default() -> Self {
                Self {
                    params: ParameterSet::empty($name),
                }
            }
        }

        impl Described for $ty {
            const NAME: &'static str = $name;
            const DESCRIPTION: &'static str = $desc;
        }

        impl_module!($ty, ExecutionMode::PerDocument);
    };
}

simple_canonicizer!(
    NormalizeWhitespace,
    "NormalizeWhitespace",
    "Converts every run of whitespace (newline, space, tab) to a single space and trims the ends."
);

impl Canonicizer for NormalizeWhitespace {
    fn canonicize(&self, text: &str) -> Result<String> {
        Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

simple_canonicizer!(UnifyCase, "UnifyCase", "Converts all text to lower case.");

impl Canonicizer for UnifyCase {
    fn canonicize(&self, text: &str) -> Result<String> {
        Ok(text.to_lowercase())
    }
}

simple_canonicizer!(
    StripPunctuation,
    "StripPunctuation",
    "Strips the punctuation characters ,.?!\"'`;:-()&$ from the text."
);

impl Canonicizer for StripPunctuation {
    fn canonicize(&self, text: &str) -> Result<String> {
        Ok(text.chars().filter(|c| !is_punctuation(*c)).collect())
    }
}

simple_canonicizer!(
    StripNumbers,
    "StripNumbers",
    "Converts each digit string to a single 0."
);

impl Canonicizer for StripNumbers {
    fn canonicize(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut in_digits = false;
        for c in text.chars() {
            if c.is_ascii_digit() {
                if !in_digits {
                    out.push('0');
                }
                in_digits = true;
            } else {
                out.push(c);
                in_digits = false;
            }
        }
        Ok(out)
    }
}

simple_canonicizer!(
    PunctuationSeparator,
    "PunctuationSeparator",
    "Adds whitespace before and after each punctuation character."
);

impl Canonicizer for PunctuationSeparator {
    fn canonicize(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len() * 2);
        for c in text.chars() {
            if is_punctuation(c) {
                out.push(' ');
                out.push(c);
                out.push(' ');
            } else {
                out.push(c);
            }
        }
        Ok(out)
    }
}

simple_canonicizer!(
    StripAlphanumeric,
    "StripAlphanumeric",
    "Removes letters and digits, leaving whitespace, punctuation and symbols."
);

impl Canonicizer for StripAlphanumeric {
    fn canonicize(&self, text: &str) -> Result<String> {
        Ok(text
            .chars()
            .filter(|c| !c.is_alphanumeric())
            .collect())
    }
}

simple_canonicizer!(
    StripNullCharacters,
    "StripNullCharacters",
    "Strips all 0x00 characters from the text."
);

impl Canonicizer for StripNullCharacters {
    fn canonicize(&self, text: &str) -> Result<String> {
        Ok(text.chars().filter(|c| *c != '\0').collect())
    }
}
