//! Tabular exchange files
//!
//! Screening sheets, manual-preparation lists and the data extraction file
//! are plain string tables. The format follows the file extension: `.csv`
//! through `csv`, `.xlsx` through `rust_xlsxwriter` (write) and `calamine`
//! (read).

use calamine::{open_workbook, Data, Reader, Xlsx};
use colrev_common::{Error, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

/// A header row plus string cells
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, padded or cut to the header width
    pub fn push<S: Into<String>>(&mut self, row: impl IntoIterator<Item = S>) {
        let mut row: Vec<String> = row.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell of `row` in column `name` (empty if either is missing)
    pub fn get<'a>(&self, row: &'a [String], name: &str) -> &'a str {
        self.column(name)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn data_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::DataFile(format!("{}: {}", path.display(), e))
}

fn is_xlsx(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

pub fn read(path: &Path) -> Result<Table> {
    if is_xlsx(path) {
        read_xlsx(path)
    } else {
        read_csv(path)
    }
}

pub fn write(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if is_xlsx(path) {
        write_xlsx(path, table)
    } else {
        write_csv(path, table)
    }
}

pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| data_error(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| data_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut table = Table::new(headers);
    for row in reader.records() {
        let row = row.map_err(|e| data_error(path, e))?;
        table.push(row.iter().map(|c| c.trim().to_string()));
    }
    Ok(table)
}

pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| data_error(path, e))?;
    writer.write_record(&table.headers).map_err(|e| data_error(path, e))?;
    for row in &table.rows {
        writer.write_record(row).map_err(|e| data_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

pub fn read_xlsx(path: &Path) -> Result<Table> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| data_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| data_error(path, "no worksheet"))?
        .map_err(|e| data_error(path, e))?;
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let mut table = Table::new(header.iter().map(cell_text));
    for row in rows {
        table.push(row.iter().map(cell_text));
    }
    Ok(table)
}

pub fn write_xlsx(path: &Path, table: &Table) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();
    for (col, header) in table.headers.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, header, &bold)
            .map_err(|e| data_error(path, e))?;
    }
    for (i, row) in table.rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            sheet
                .write_string(i as u32 + 1, col as u16, cell)
                .map_err(|e| data_error(path, e))?;
        }
    }
    workbook.save(path).map_err(|e| data_error(path, e))?;
    Ok(())
}
