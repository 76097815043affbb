//! Language hints for the remote transcription service.

use crate::error::{Result, VoxflowError};
use std::fmt;

/// Codes the remote service accepts as a language hint (ISO 639-1 plus a few
/// service-specific entries).
const SUPPORTED_CODES: &[&str] = &[
    "af", "am", "ar", "as", "az", "ba", "be", "bg", "bn", "bo", "br", "bs", "ca", "cs", "cy", "da",
    "de", "el", "en", "es", "et", "eu", "fa", "fi", "fo", "fr", "gl", "gu", "ha", "haw", "he",
    "hi", "hr", "ht", "hu", "hy", "id", "is", "it", "ja", "jw", "ka", "kk", "km", "kn", "ko", "la",
    "lb", "ln", "lo", "lt", "lv", "mg", "mi", "mk", "ml", "mn", "mr", "ms", "mt", "my", "ne", "nl",
    "nn", "no", "oc", "pa", "pl", "ps", "pt", "ro", "ru", "sa", "sd", "si", "sk", "sl", "sn", "so",
    "sq", "sr", "su", "sv", "sw", "ta", "te", "tg", "th", "tk", "tl", "tr", "tt", "uk", "ur", "uz",
    "vi", "yi", "yo", "yue", "zh",
];

/// A validated language hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language(&'static str);

impl Language {
    /// Parse a code against the supported set.
    ///
    /// Matching is case-insensitive; the canonical lowercase form is kept.
    pub fn parse(code: &str) -> Result<Self> {
        let lower = code.trim().to_lowercase();
        SUPPORTED_CODES
            .iter()
            .find(|&&c| c == lower)
            .map(|&c| Language(c))
            .ok_or(VoxflowError::InvalidLanguage {
                code: code.to_string(),
            })
    }

    /// The canonical code string sent on the wire.
    pub fn code(&self) -> &'static str {
        self.0
    }

    /// All supported codes, for help output.
    pub fn all() -> &'static [&'static str] {
        SUPPORTED_CODES
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_codes() {
        assert_eq!(Language::parse("en").unwrap().code(), "en");
        assert_eq!(Language::parse("de").unwrap().code(), "de");
        assert_eq!(Language::parse("yue").unwrap().code(), "yue");
    }

    #[test]
    fn parsing_is_case_insensitive_and_trims() {
        assert_eq!(Language::parse(" EN ").unwrap().code(), "en");
    }

    #[test]
    fn rejects_unknown_codes() {
        let err = Language::parse("xx").unwrap_err();
        assert!(matches!(err, VoxflowError::InvalidLanguage { code } if code == "xx"));
        assert!(Language::parse("english").is_err());
        assert!(Language::parse("").is_err());
    }

    #[test]
    fn supported_set_is_sorted_and_sized() {
        let codes = Language::all();
        assert!(codes.len() >= 95, "expected ~100 codes, got {}", codes.len());
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, codes);
    }
}
