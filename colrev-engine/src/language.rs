//! Language detection for titles and extracted PDF text
//!
//! A stopword profile classifier: each candidate language is scored by the
//! share of its function words among all function-word hits in the text.
//! Short inputs without any function word are reported as undetermined.

use colrev_common::text::remove_accents;
use std::collections::HashMap;

/// Detector confidence for one language
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageConfidence {
    /// ISO 639-1 code
    pub code: &'static str,
    pub confidence: f64,
}

const PROFILES: &[(&str, &[&str])] = &[
    (
        "en",
        &[
            "the", "of", "and", "to", "in", "for", "on", "with", "a", "an", "is", "are", "from",
            "by", "this", "that", "we", "how", "what", "why", "its", "their", "towards", "toward",
            "between", "through", "into", "as", "at", "be", "or", "which", "using", "based",
        ],
    ),
    (
        "de",
        &[
            "der", "die", "das", "und", "zur", "zum", "mit", "von", "fur", "ein", "eine", "einer",
            "im", "den", "des", "ist", "auf", "bei", "uber", "nicht", "sich", "dem", "wie",
        ],
    ),
    (
        "fr",
        &[
            "le", "la", "les", "des", "et", "du", "une", "pour", "dans", "sur", "au", "aux",
            "est", "par", "qui", "que", "avec", "ces", "cette", "entre",
        ],
    ),
    (
        "es",
        &[
            "el", "los", "las", "del", "y", "para", "una", "por", "con", "en", "como", "sobre",
            "entre", "su", "sus", "al", "lo", "es", "mas",
        ],
    ),
    (
        "pt",
        &[
            "os", "as", "do", "da", "dos", "das", "e", "para", "uma", "com", "no", "na", "nos",
            "nas", "em", "pelo", "pela", "sobre", "ao", "entre",
        ],
    ),
    (
        "it",
        &[
            "il", "gli", "della", "delle", "dei", "degli", "e", "per", "una", "con", "nel",
            "nella", "sul", "sulla", "tra", "che", "di", "alla",
        ],
    ),
    (
        "nl",
        &[
            "de", "het", "een", "van", "en", "voor", "met", "op", "naar", "bij", "zijn", "niet",
            "door", "over", "dat", "deze", "wordt",
        ],
    ),
];

fn tokens(text: &str) -> Vec<String> {
    remove_accents(&text.to_lowercase())
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Confidence per language, most likely first
pub fn confidence_values(text: &str) -> Vec<LanguageConfidence> {
    let mut hits: HashMap<&'static str, f64> = HashMap::new();
    for token in tokens(text) {
        let matching: Vec<&'static str> = PROFILES
            .iter()
            .filter(|(_, words)| words.contains(&token.as_str()))
            .map(|(code, _)| *code)
            .collect();
        // Words shared by several profiles count fractionally
        for code in &matching {
            *hits.entry(code).or_default() += 1.0 / matching.len() as f64;
        }
    }
    let total: f64 = hits.values().sum();
    if total == 0.0 {
        return Vec::new();
    }
    let mut values: Vec<LanguageConfidence> = hits
        .into_iter()
        .map(|(code, n)| LanguageConfidence {
            code,
            confidence: n / total,
        })
        .collect();
    values.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.code.cmp(b.code))
    });
    values
}

/// Most likely language, if any function word was found
pub fn detect(text: &str) -> Option<LanguageConfidence> {
    confidence_values(text).into_iter().next()
}

/// Confidence that `text` is English (0 when undetermined)
pub fn english_confidence(text: &str) -> f64 {
    confidence_values(text)
        .into_iter()
        .find(|c| c.code == "en")
        .map(|c| c.confidence)
        .unwrap_or(0.0)
}

/// Whether alphabetic characters are overwhelmingly non-Latin
pub fn mostly_non_latin(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }
    let non_latin = letters.iter().filter(|c| !is_latin(**c)).count();
    non_latin as f64 / letters.len() as f64 > 0.75
}

fn is_latin(c: char) -> bool {
    matches!(c as u32,
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F | 0x1E00..=0x1EFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_title() {
        let lang = detect("Analyzing the Past to Prepare for the Future: Writing a Literature Review").unwrap();
        assert_eq!(lang.code, "en");
        assert!(lang.confidence > 0.9);
    }

    #[test]
    fn german_title() {
        let lang = detect("Die Digitalisierung der Verwaltung und ihre Folgen für den Staat").unwrap();
        assert_eq!(lang.code, "de");
    }

    #[test]
    fn no_function_words_is_undetermined() {
        assert!(detect("Platform Ecosystems Governance").is_none());
        assert_eq!(english_confidence(""), 0.0);
    }

    #[test]
    fn alphabets() {
        assert!(mostly_non_latin("数字平台的治理研究"));
        assert!(!mostly_non_latin("Digital platforms"));
        assert!(!mostly_non_latin("Évolution des systèmes"));
    }
}
