//! Content identifiers: colrev_id and TOC key

use super::fields::{self, AUTHOR, BOOKTITLE, INSTITUTION, JOURNAL, NUMBER, SCHOOL, SERIES, TITLE, URL, VOLUME, YEAR};
use super::Record;
use crate::text::{parse_authors, robust_token};
use crate::{Error, Result};

/// Version prefix of the identifier format
pub const COLREV_ID_PREFIX: &str = "colrev_id1:";

fn required<'a>(record: &'a Record, key: &str) -> Result<&'a str> {
    match record.get(key) {
        Some(v) if v == fields::UNKNOWN => Err(Error::NotEnoughDataToIdentify(format!(
            "{} unknown ({})",
            key, record.id
        ))),
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::NotEnoughDataToIdentify(format!(
            "missing {} ({})",
            key, record.id
        ))),
    }
}

fn container_for_id(record: &Record) -> Result<&str> {
    match record.entry_type.as_str() {
        "phdthesis" | "masterthesis" | "mastersthesis" => required(record, SCHOOL),
        "techreport" => required(record, INSTITUTION),
        "inproceedings" => required(record, BOOKTITLE),
        "article" => required(record, JOURNAL),
        _ => required(record, SERIES).or_else(|_| required(record, URL)),
    }
}

/// Author token: family names followed by initials, e.g. `Smith J Jones K`
fn author_for_id(author: &str) -> String {
    parse_authors(author)
        .iter()
        .map(|name| {
            let mut parts = vec![name.last.clone()];
            parts.extend(name.initials().iter().map(|c| c.to_string()));
            parts.join(" ")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the colrev_id from the identifying fields
///
/// Format: `colrev_id1:|<type>|<container>[|<volume>|<number>]|<year>|<authors>|<title>`
/// where type is `a` for articles and `p` for inproceedings. Articles
/// without volume or number use `-`.
pub fn create_colrev_id(record: &Record) -> Result<String> {
    for key in fields::IDENTIFYING_FIELDS {
        if record.get(key) == Some(fields::UNKNOWN) {
            return Err(Error::NotEnoughDataToIdentify(format!(
                "{} unknown (maybe required) ({})",
                key, record.id
            )));
        }
    }

    let type_token = match record.entry_type.as_str() {
        "article" => "a".to_string(),
        "inproceedings" => "p".to_string(),
        other => other.to_lowercase(),
    };
    let mut tokens = vec![robust_token(&type_token), robust_token(container_for_id(record)?)];
    if record.entry_type == "article" {
        tokens.push(robust_token(record.known(VOLUME).unwrap_or("-")));
        tokens.push(robust_token(record.known(NUMBER).unwrap_or("-")));
    }
    tokens.push(robust_token(required(record, YEAR)?));

    let author = author_for_id(required(record, AUTHOR)?);
    if author.replace('-', "").trim().is_empty() {
        return Err(Error::NotEnoughDataToIdentify(format!(
            "missing author ({})",
            record.id
        )));
    }
    tokens.push(robust_token(&author));
    tokens.push(robust_token(required(record, TITLE)?));

    let colrev_id = format!("{}|{}", COLREV_ID_PREFIX, tokens.join("|")).replace(';', "");
    if colrev_id.contains("|minitrack-introduction") {
        return Err(Error::NotEnoughDataToIdentify(format!(
            "title typically non-distinct ({})",
            record.id
        )));
    }
    Ok(colrev_id)
}

fn toc_container(value: &str) -> String {
    value
        .replace(' ', "-")
        .replace('\\', "")
        .replace('&', "and")
        .to_lowercase()
}

/// Key of the journal issue or conference year a record belongs to
///
/// `None` for entry types that are not part of a table of contents.
pub fn toc_key(record: &Record) -> Option<String> {
    match record.entry_type.as_str() {
        "article" => {
            let journal = record.known(JOURNAL)?;
            Some(format!(
                "{}|{}|{}",
                toc_container(journal),
                record.known(VOLUME).unwrap_or("-"),
                record.known(NUMBER).unwrap_or("-"),
            ))
        }
        "inproceedings" => {
            let booktitle = record.known(BOOKTITLE)?;
            Some(format!(
                "{}|{}",
                toc_container(booktitle),
                record.get(YEAR).unwrap_or("")
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn smith_jones() -> Record {
        Record::new("Smith2020", "article")
            .with_field("author", "Smith, J. and Jones, K.")
            .with_field("title", "On X")
            .with_field("year", "2020")
            .with_field("journal", "X Journal")
            .with_field("volume", "1")
            .with_field("number", "2")
    }

    #[test]
    fn article_colrev_id() {
        assert_eq!(
            create_colrev_id(&smith_jones()).unwrap(),
            "colrev_id1:|a|x-journal|1|2|2020|smith-j-jones-k|on-x"
        );
    }

    #[test]
    fn colrev_id_is_stable_under_benign_edits() {
        let mut edited = smith_jones();
        edited.set_raw("author", "Smith, John and Jones, Karl");
        edited.set_raw("title", "On X.");
        assert_eq!(
            create_colrev_id(&edited).unwrap(),
            create_colrev_id(&smith_jones()).unwrap()
        );
    }

    #[test]
    fn missing_volume_defaults_to_dash() {
        let mut record = smith_jones();
        record.fields.remove("number");
        assert_eq!(
            create_colrev_id(&record).unwrap(),
            "colrev_id1:|a|x-journal|1|-|2020|smith-j-jones-k|on-x"
        );
    }

    #[test]
    fn inproceedings_uses_booktitle() {
        let record = Record::new("Lee2019", "inproceedings")
            .with_field("author", "Lee, Ann")
            .with_field("title", "Platforms")
            .with_field("year", "2019")
            .with_field("booktitle", "ICIS");
        assert_eq!(
            create_colrev_id(&record).unwrap(),
            "colrev_id1:|p|icis|2019|lee-a|platforms"
        );
    }

    #[test]
    fn missing_fields_cannot_be_identified() {
        let mut record = smith_jones();
        record.fields.remove("journal");
        assert!(matches!(
            create_colrev_id(&record),
            Err(Error::NotEnoughDataToIdentify(_))
        ));
        let mut record = smith_jones();
        record.set_raw("year", "UNKNOWN");
        assert!(create_colrev_id(&record).is_err());
    }

    #[test]
    fn toc_keys() {
        assert_eq!(toc_key(&smith_jones()).as_deref(), Some("x-journal|1|2"));
        let mut record = smith_jones();
        record.set_raw("number", "UNKNOWN");
        assert_eq!(toc_key(&record).as_deref(), Some("x-journal|1|-"));
        assert_eq!(toc_key(&Record::new("B", "book")), None);
    }
}
