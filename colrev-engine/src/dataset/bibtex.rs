//! BibTeX reading and canonical writing
//!
//! The reader accepts raw search exports: `@type{key, field = {..}}` with
//! braced, quoted or bare values, `#` concatenation, `@string` macros and
//! skipped `@comment`/`@preamble` blocks.
//!
//! The writer produces the canonical form of `records.bib`:
//! - records sorted by ID and separated by a blank line
//! - fields ordered `colrev_origin`, `colrev_status`, identifying fields,
//!   provenance fields, then the rest alphabetically
//! - two-space indent, names padded to 30 columns, trailing commas
//! - list-valued state fields with one item per line

use colrev_common::record::fields::{self, COLREV_ID, D_PROV, MD_PROV, ORIGIN, PDF_ID, STATUS};
use colrev_common::record::Provenance;
use colrev_common::{Error, Record, RecordState, Result};
use std::collections::HashMap;

/// One entry as it appears in the file
#[derive(Debug, Clone, PartialEq)]
pub struct BibEntry {
    pub entry_type: String,
    pub key: String,
    pub fields: Vec<(String, String)>,
    /// Line of the `@`
    pub line: usize,
}

impl BibEntry {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    macros: HashMap<String, String>,
    _src: &'a str,
}

fn month_macros() -> HashMap<String, String> {
    [
        ("jan", "January"),
        ("feb", "February"),
        ("mar", "March"),
        ("apr", "April"),
        ("may", "May"),
        ("jun", "June"),
        ("jul", "July"),
        ("aug", "August"),
        ("sep", "September"),
        ("oct", "October"),
        ("nov", "November"),
        ("dec", "December"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            macros: month_macros(),
            _src: src,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::BibtexParse {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of file", expected))),
        }
    }

    fn identifier(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || "_-:.+/'".contains(c) {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        out
    }

    /// Content between balanced braces; the opening brace is consumed already
    fn braced(&mut self) -> Result<String> {
        let start_line = self.line;
        let mut depth = 1usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        Err(Error::BibtexParse {
            line: start_line,
            message: "unbalanced braces".to_string(),
        })
    }

    fn quoted(&mut self) -> Result<String> {
        let start_line = self.line;
        let mut depth = 0usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '"' if depth == 0 => return Ok(out),
                _ => {}
            }
            out.push(c);
        }
        Err(Error::BibtexParse {
            line: start_line,
            message: "unterminated quoted value".to_string(),
        })
    }

    fn value(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('{') => {
                    self.bump();
                    out.push_str(&self.braced()?);
                }
                Some('"') => {
                    self.bump();
                    out.push_str(&self.quoted()?);
                }
                Some(c) if c.is_alphanumeric() => {
                    let word = self.identifier();
                    match self.macros.get(&word.to_lowercase()) {
                        Some(expanded) => out.push_str(expanded),
                        None => out.push_str(&word),
                    }
                }
                Some(c) => return Err(self.error(format!("unexpected '{}' in value", c))),
                None => return Err(self.error("unexpected end of file in value")),
            }
            self.skip_whitespace();
            if self.peek() == Some('#') {
                self.bump();
                continue;
            }
            return Ok(out);
        }
    }

    fn skip_block(&mut self) -> Result<()> {
        self.skip_whitespace();
        match self.bump() {
            Some('{') => self.braced().map(|_| ()),
            Some('(') => {
                while let Some(c) = self.bump() {
                    if c == ')' {
                        return Ok(());
                    }
                }
                Err(self.error("unterminated block"))
            }
            _ => Err(self.error("expected block after @")),
        }
    }

    fn string_macro(&mut self) -> Result<()> {
        self.expect('{')?;
        self.skip_whitespace();
        let name = self.identifier().to_lowercase();
        self.expect('=')?;
        let value = self.value()?;
        self.expect('}')?;
        self.macros.insert(name, value);
        Ok(())
    }

    fn entry(&mut self, entry_type: String, line: usize) -> Result<BibEntry> {
        self.skip_whitespace();
        let close = match self.bump() {
            Some('{') => '}',
            Some('(') => ')',
            _ => return Err(self.error("expected '{' after entry type")),
        };
        self.skip_whitespace();
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if c == ',' || c == close || c.is_whitespace() {
                break;
            }
            key.push(c);
            self.bump();
        }
        if key.is_empty() {
            return Err(self.error("missing citation key"));
        }

        let mut entry = BibEntry {
            entry_type,
            key,
            fields: Vec::new(),
            line,
        };
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(entry);
                }
                Some(_) => {
                    let name = self.identifier();
                    if name.is_empty() {
                        return Err(self.error("expected field name"));
                    }
                    self.expect('=')?;
                    let value = self.value()?;
                    let name = if name == fields::MOVED_DUPE_ID {
                        name
                    } else {
                        name.to_lowercase()
                    };
                    entry.fields.push((name, value));
                }
                None => return Err(self.error(format!("unterminated entry {}", entry.key))),
            }
        }
    }

    fn parse(mut self) -> Result<Vec<BibEntry>> {
        let mut entries = Vec::new();
        while let Some(c) = self.bump() {
            if c != '@' {
                continue;
            }
            let line = self.line;
            self.skip_whitespace();
            let entry_type = self.identifier().to_lowercase();
            match entry_type.as_str() {
                "" => return Err(self.error("missing entry type after @")),
                "comment" | "preamble" => self.skip_block()?,
                "string" => self.string_macro()?,
                _ => entries.push(self.entry(entry_type, line)?),
            }
        }
        Ok(entries)
    }
}

/// Parse BibTeX text into raw entries
pub fn parse_entries(content: &str) -> Result<Vec<BibEntry>> {
    Parser::new(content).parse()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert an entry into a record
///
/// A missing `colrev_status` means `md_retrieved` (raw search exports); an
/// invalid one is an integrity error.
pub fn record_from_entry(entry: &BibEntry) -> Result<Record> {
    let mut record = Record::new(entry.key.clone(), entry.entry_type.clone());
    for (name, value) in &entry.fields {
        match name.as_str() {
            STATUS => {
                record.status = value
                    .parse::<RecordState>()
                    .map_err(|_| Error::StatusFieldValue {
                        id: entry.key.clone(),
                        value: value.clone(),
                    })?;
            }
            ORIGIN => record.origin = split_list(value),
            MD_PROV => record.masterdata_provenance = Provenance::parse(value),
            D_PROV => record.data_provenance = Provenance::parse(value),
            COLREV_ID => record.colrev_id = split_list(value),
            PDF_ID => record.colrev_pdf_id = Some(value.trim().to_string()),
            _ => {
                record.fields.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(record)
}

/// Parse BibTeX text into records, in file order
pub fn parse_records(content: &str) -> Result<Vec<Record>> {
    parse_entries(content)?.iter().map(record_from_entry).collect()
}

const NAME_WIDTH: usize = 30;

fn write_field(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("  {:<width$}= {{{}}},\n", name, value, width = NAME_WIDTH));
}

fn write_list_field(out: &mut String, name: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let indent = " ".repeat(2 + NAME_WIDTH + 3);
    let value = items.join(&format!("\n{}", indent));
    write_field(out, name, &value);
}

/// Canonical serialization of one record
pub fn write_record(record: &Record) -> String {
    let mut out = format!("@{}{{{},\n", record.entry_type, record.id);

    let origins: Vec<String> = record.origin.iter().map(|o| format!("{};", o)).collect();
    write_list_field(&mut out, ORIGIN, &origins);
    write_field(&mut out, STATUS, record.status.as_str());

    for key in fields::IDENTIFYING_FIELDS {
        if let Some(value) = record.get(key) {
            write_field(&mut out, key, value);
        }
    }

    write_list_field(&mut out, MD_PROV, &record.masterdata_provenance.to_lines());
    write_list_field(&mut out, D_PROV, &record.data_provenance.to_lines());
    let colrev_ids: Vec<String> = record.colrev_id.iter().map(|c| format!("{};", c)).collect();
    write_list_field(&mut out, COLREV_ID, &colrev_ids);
    if let Some(pdf_id) = &record.colrev_pdf_id {
        write_field(&mut out, PDF_ID, pdf_id);
    }

    for (key, value) in &record.fields {
        if !fields::is_identifying(key) {
            write_field(&mut out, key, value);
        }
    }
    out.push_str("}\n");
    out
}

/// Serialization of a search-export entry: fields only, no colrev bookkeeping
pub fn write_raw_entry(record: &Record) -> String {
    let mut out = format!("@{}{{{},\n", record.entry_type, record.id);
    for (key, value) in &record.fields {
        write_field(&mut out, key, value);
    }
    out.push_str("}\n");
    out
}

/// Canonical serialization of a record collection, sorted by ID
pub fn write_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> String {
    let mut sorted: Vec<&Record> = records.into_iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
        .iter()
        .map(|r| write_record(r))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RAW: &str = r#"
@string{misq = "MIS Quarterly"}
@comment{exported by a database}

@Article{Webster2002,
  Author = {Webster, Jane and Watson, Richard T.},
  title = "Analyzing the Past to Prepare for the Future: {W}riting a Literature Review",
  journal = misq,
  year = 2002,
  month = jun,
  pages = {xiii--xxiii}
}

@inproceedings(Lee2019,
  author = {Lee, Ann},
  title = {Platforms} # { and } # {ecosystems},
  booktitle = {ICIS},
  year = {2019},
)
"#;

    #[test]
    fn parses_raw_exports() {
        let entries = parse_entries(RAW).unwrap();
        assert_eq!(entries.len(), 2);
        let webster = &entries[0];
        assert_eq!(webster.entry_type, "article");
        assert_eq!(webster.key, "Webster2002");
        assert_eq!(webster.get("author"), Some("Webster, Jane and Watson, Richard T."));
        assert_eq!(
            webster.get("title"),
            Some("Analyzing the Past to Prepare for the Future: {W}riting a Literature Review")
        );
        assert_eq!(webster.get("journal"), Some("MIS Quarterly"));
        assert_eq!(webster.get("year"), Some("2002"));
        assert_eq!(webster.get("month"), Some("June"));
        assert_eq!(entries[1].get("title"), Some("Platforms and ecosystems"));
    }

    #[test]
    fn reports_the_line_of_parse_errors() {
        let err = parse_entries("@article{A,\n  title = {Open\n").unwrap_err();
        assert!(matches!(err, Error::BibtexParse { line: 2, .. }), "{:?}", err);

        let err = parse_entries("\n\n@article{A,\n  title = ;\n}").unwrap_err();
        assert!(matches!(err, Error::BibtexParse { line: 4, .. }), "{:?}", err);
    }

    #[test]
    fn invalid_status_is_an_integrity_error() {
        let err = parse_records("@article{A,\n  colrev_status = {md_unknown},\n}\n").unwrap_err();
        assert!(matches!(err, Error::StatusFieldValue { ref id, .. } if id == "A"));
    }

    #[test]
    fn canonical_layout() {
        let mut record = Record::new("Webster2002", "article")
            .with_field("title", "Writing a literature review")
            .with_field("author", "Webster, J. and Watson, R.")
            .with_field("doi", "10.2307/4132319")
            .with_origin("lr.bib/1")
            .with_origin("scopus.bib/2")
            .with_status(RecordState::MdProcessed);
        record.masterdata_provenance.set("author", "ORIGINAL", "");
        record.masterdata_provenance.set("title", "ORIGINAL", "");
        let expected = "\
@article{Webster2002,
  colrev_origin                 = {lr.bib/1;
                                   scopus.bib/2;},
  colrev_status                 = {md_processed},
  author                        = {Webster, J. and Watson, R.},
  title                         = {Writing a literature review},
  colrev_masterdata_provenance  = {author:ORIGINAL;;
                                   title:ORIGINAL;;},
  doi                           = {10.2307/4132319},
}
";
        assert_eq!(write_record(&record), expected);
    }

    #[test]
    fn canonical_form_round_trips() {
        let mut record = Record::new("B2020", "article")
            .with_field("author", "B, A")
            .with_field("abstract", "Line one\nline two {with} braces")
            .with_origin("x.bib/1")
            .with_status(RecordState::MdPrepared);
        record.colrev_id.push("colrev_id1:|a|j|1|-|2020|b-a|t".to_string());
        record.colrev_pdf_id = Some("cpid2:ffff0000".to_string());
        record.masterdata_provenance.set("volume", "ORIGINAL", "missing");
        let other = Record::new("A2019", "misc").with_field("title", "T").with_origin("x.bib/2");

        let text = write_records([&record, &other]);
        let parsed = parse_records(&text).unwrap();
        assert_eq!(parsed[0].id, "A2019");
        assert_eq!(parsed[1], record);
        assert_eq!(write_records(parsed.iter()), text);
    }
}
