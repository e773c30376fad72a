//! Input language detection
//!
//! Classification is by dominant Unicode script. Latin text is reported as
//! the default language since the assistant has no reason to tell European
//! languages apart for synthesis routing.

use crate::{Error, Result};

/// Classifies text into a language code
pub trait LanguageDetector: Send + Sync {
    /// Detect the language of `text`
    ///
    /// # Errors
    ///
    /// Returns error if the text carries no classifiable letters
    fn detect(&self, text: &str) -> Result<String>;
}

/// Script ranges and the language code each maps to
const SCRIPTS: &[(char, char, &str)] = &[
    ('\u{0900}', '\u{097F}', "hi"),
    ('\u{0980}', '\u{09FF}', "bn"),
    ('\u{0A00}', '\u{0A7F}', "pa"),
    ('\u{0A80}', '\u{0AFF}', "gu"),
    ('\u{0B80}', '\u{0BFF}', "ta"),
    ('\u{0C00}', '\u{0C7F}', "te"),
    ('\u{0C80}', '\u{0CFF}', "kn"),
    ('\u{0D00}', '\u{0D7F}', "ml"),
    ('\u{0600}', '\u{06FF}', "ar"),
    ('\u{0400}', '\u{04FF}', "ru"),
    ('\u{3040}', '\u{30FF}', "ja"),
    ('\u{AC00}', '\u{D7AF}', "ko"),
    ('\u{4E00}', '\u{9FFF}', "zh"),
];

/// Detects language from the dominant writing system
#[derive(Debug, Clone)]
pub struct ScriptDetector {
    latin_language: String,
}

impl ScriptDetector {
    /// Create a detector reporting Latin-script text as `latin_language`
    #[must_use]
    pub fn new(latin_language: impl Into<String>) -> Self {
        Self {
            latin_language: latin_language.into(),
        }
    }
}

impl Default for ScriptDetector {
    fn default() -> Self {
        Self::new("en")
    }
}

impl LanguageDetector for ScriptDetector {
    fn detect(&self, text: &str) -> Result<String> {
        let mut counts = vec![0usize; SCRIPTS.len()];
        let mut latin = 0usize;

        for c in text.chars().filter(|c| c.is_alphabetic()) {
            if c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c) {
                latin += 1;
            } else if let Some(idx) = SCRIPTS
                .iter()
                .position(|(start, end, _)| (*start..=*end).contains(&c))
            {
                counts[idx] += 1;
            }
        }

        // Kanji share the Han range with Chinese; any kana marks the text as Japanese
        if let (Some(ja), Some(zh)) = (script_index("ja"), script_index("zh"))
            && counts[ja] > 0
        {
            counts[ja] += std::mem::take(&mut counts[zh]);
        }

        let (best_idx, best) = counts
            .iter()
            .enumerate()
            .max_by_key(|(_, count)| **count)
            .map_or((0, 0), |(idx, count)| (idx, *count));

        if best == 0 && latin == 0 {
            return Err(Error::Language("no letters to classify".to_string()));
        }

        if best > latin {
            Ok(SCRIPTS[best_idx].2.to_string())
        } else {
            Ok(self.latin_language.clone())
        }
    }
}

fn script_index(code: &str) -> Option<usize> {
    SCRIPTS.iter().position(|(_, _, c)| *c == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_text() {
        let detector = ScriptDetector::default();
        assert_eq!(detector.detect("What is GST?").unwrap(), "en");
    }

    #[test]
    fn test_hindi_text() {
        let detector = ScriptDetector::default();
        assert_eq!(detector.detect("जीएसटी क्या है?").unwrap(), "hi");
    }

    #[test]
    fn test_mixed_text_uses_dominant_script() {
        let detector = ScriptDetector::default();
        assert_eq!(detector.detect("IDMS में जीएसटी रिटर्न कैसे बनाएं").unwrap(), "hi");
    }

    #[test]
    fn test_kana_with_kanji_is_japanese() {
        let detector = ScriptDetector::default();
        assert_eq!(detector.detect("請求書を作成する").unwrap(), "ja");
        assert_eq!(detector.detect("发票管理").unwrap(), "zh");
    }

    #[test]
    fn test_no_letters_is_error() {
        let detector = ScriptDetector::default();
        assert!(detector.detect("12345 ?!").is_err());
        assert!(detector.detect("").is_err());
    }
}
