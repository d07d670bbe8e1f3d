//! Local lexicon of outlet names
//!
//! Abbreviations and spelling variants of journals and conferences are
//! rewritten to one canonical name, so that records from different exports
//! compare equal on their container title.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Journal abbreviation -> canonical journal name
const JOURNAL_ABBREVIATIONS: &[(&str, &str)] = &[
    ("MISQ", "MIS Quarterly"),
    ("MIS Q", "MIS Quarterly"),
    ("Mis Quarterly", "MIS Quarterly"),
    ("Management Information Systems Quarterly", "MIS Quarterly"),
    ("ISR", "Information Systems Research"),
    ("Inf Syst Res", "Information Systems Research"),
    ("JMIS", "Journal of Management Information Systems"),
    ("J Manage Inform Syst", "Journal of Management Information Systems"),
    ("JAIS", "Journal of the Association for Information Systems"),
    ("J Assoc Inf Syst", "Journal of the Association for Information Systems"),
    ("EJIS", "European Journal of Information Systems"),
    ("Eur J Inf Syst", "European Journal of Information Systems"),
    ("ISJ", "Information Systems Journal"),
    ("Inf Syst J", "Information Systems Journal"),
    ("JSIS", "The Journal of Strategic Information Systems"),
    ("J Strateg Inf Syst", "The Journal of Strategic Information Systems"),
    ("JIT", "Journal of Information Technology"),
    ("J Inf Technol", "Journal of Information Technology"),
    ("CAIS", "Communications of the Association for Information Systems"),
    ("Commun Assoc Inf Syst", "Communications of the Association for Information Systems"),
    ("MISQE", "MIS Quarterly Executive"),
    ("DSS", "Decision Support Systems"),
    ("Decis Support Syst", "Decision Support Systems"),
    ("I&M", "Information & Management"),
    ("Inf Manage", "Information & Management"),
    ("BISE", "Business & Information Systems Engineering"),
    ("Bus Inf Syst Eng", "Business & Information Systems Engineering"),
    ("CACM", "Communications of the ACM"),
    ("Commun ACM", "Communications of the ACM"),
    ("Manage Sci", "Management Science"),
    ("Organ Sci", "Organization Science"),
    ("SMJ", "Strategic Management Journal"),
    ("Strateg Manage J", "Strategic Management Journal"),
    ("AMJ", "Academy of Management Journal"),
    ("Acad Manage J", "Academy of Management Journal"),
    ("AMR", "Academy of Management Review"),
    ("Acad Manage Rev", "Academy of Management Review"),
];

/// Spelling variants of journal names
const JOURNAL_VARIATIONS: &[(&str, &str)] = &[
    ("Information & Management", "Information & Management"),
    ("Information and Management", "Information & Management"),
    ("Information &amp; Management", "Information & Management"),
    ("Business and Information Systems Engineering", "Business & Information Systems Engineering"),
    ("Journal of Strategic Information Systems", "The Journal of Strategic Information Systems"),
    ("MIS Quarterly: Management Information Systems", "MIS Quarterly"),
    ("MIS Quarterly - Management Information Systems", "MIS Quarterly"),
    ("Communications of the Association for Information Systems", "Communications of the Association for Information Systems"),
    ("Communications of the AIS", "Communications of the Association for Information Systems"),
    ("Journal of the AIS", "Journal of the Association for Information Systems"),
];

/// Conference abbreviation -> canonical booktitle
const CONFERENCE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("ICIS", "International Conference on Information Systems"),
    ("ECIS", "European Conference on Information Systems"),
    ("AMCIS", "Americas Conference on Information Systems"),
    ("PACIS", "Pacific Asia Conference on Information Systems"),
    ("HICSS", "Hawaii International Conference on System Sciences"),
    ("WI", "Wirtschaftsinformatik"),
    ("CSCW", "Conference on Computer Supported Cooperative Work"),
    ("CHI", "Conference on Human Factors in Computing Systems"),
    ("DESRIST", "International Conference on Design Science Research in Information Systems and Technology"),
];

fn key(name: &str) -> String {
    name.trim().trim_end_matches('.').replace('.', "").to_lowercase()
}

static JOURNALS: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    JOURNAL_ABBREVIATIONS
        .iter()
        .chain(JOURNAL_VARIATIONS.iter())
        .map(|(k, v)| (key(k), *v))
        .collect()
});

static CONFERENCES: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    CONFERENCE_ABBREVIATIONS
        .iter()
        .map(|(k, v)| (key(k), *v))
        .collect()
});

/// Canonical journal name for an abbreviation or variant
pub fn canonical_journal(journal: &str) -> Option<&'static str> {
    JOURNALS
        .get(&key(journal))
        .copied()
        .filter(|canonical| *canonical != journal)
}

/// Canonical booktitle for a conference abbreviation
///
/// Matches the bare abbreviation as well as "Proceedings of ICIS 2019"-style
/// strings.
pub fn canonical_conference(booktitle: &str) -> Option<&'static str> {
    if let Some(canonical) = CONFERENCES.get(&key(booktitle)) {
        return Some(canonical).copied().filter(|c| *c != booktitle);
    }
    let words: Vec<String> = booktitle
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    if words.len() > 4 {
        return None;
    }
    words
        .iter()
        .filter(|w| w.chars().all(|c| c.is_ascii_uppercase()) && w.len() > 1)
        .find_map(|w| CONFERENCES.get(&key(w)).copied())
}

/// Whether a name is one of the known conference names or abbreviations
pub fn is_known_conference(name: &str) -> bool {
    canonical_conference(name).is_some()
        || CONFERENCE_ABBREVIATIONS
            .iter()
            .any(|(_, canonical)| canonical.eq_ignore_ascii_case(name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_abbreviations() {
        assert_eq!(canonical_journal("MISQ"), Some("MIS Quarterly"));
        assert_eq!(canonical_journal("Mis Quarterly"), Some("MIS Quarterly"));
        assert_eq!(canonical_journal("MIS Quarterly"), None);
        assert_eq!(canonical_journal("Decis. Support Syst."), Some("Decision Support Systems"));
        assert_eq!(canonical_journal("Unknown Journal"), None);
    }

    #[test]
    fn conference_abbreviations() {
        assert_eq!(
            canonical_conference("ICIS 2019"),
            Some("International Conference on Information Systems")
        );
        assert_eq!(
            canonical_conference("Proceedings of AMCIS"),
            Some("Americas Conference on Information Systems")
        );
        assert!(is_known_conference("European Conference on Information Systems"));
        assert_eq!(canonical_conference("Some Workshop on Things and Stuff in 2020"), None);
    }
}
