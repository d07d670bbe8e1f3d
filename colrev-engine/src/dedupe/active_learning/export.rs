//! Validation spreadsheets
//!
//! Clusters are exported for review with one background color per cluster;
//! values differing from the cluster's first row are bold. Reviewers mark
//! wrong clusters in the `error` column, which `dedupe --fix_errors` reads.

use super::cluster::Cluster;
use super::features::CONTAINER_TITLE;
use calamine::{open_workbook, Data, Reader, Xlsx};
use colrev_common::{Error, Record, Result};
use rust_xlsxwriter::{Color, Format, Workbook, XlsxError};
use std::collections::BTreeMap;
use std::path::Path;

pub const COLUMNS: [&str; 11] = [
    "error",
    "confidence_score",
    "cluster_id",
    "ID",
    "author",
    "title",
    "year",
    CONTAINER_TITLE,
    "volume",
    "number",
    "pages",
];

/// Cluster background colors, cycled
pub const CLUSTER_COLORS: [u32; 7] = [
    0xFFFFFF, 0xFFCC99, 0xFFFFCC, 0xCCFFCC, 0xFFFF99, 0x99CCFF, 0xFF99CC,
];

fn xlsx_error(path: &Path, e: XlsxError) -> Error {
    Error::DataFile(format!("{}: {}", path.display(), e))
}

fn field_value(record: &Record, column: &str) -> String {
    match column {
        "ID" => record.id.clone(),
        CONTAINER_TITLE => record.container_title(),
        other => record.get(other).unwrap_or("").to_string(),
    }
}

/// Write clusters of `records` to `path`
///
/// Returns `false` (and writes nothing) when there are no clusters.
pub fn write_clusters(path: &Path, clusters: &[(Cluster, Vec<&Record>)]) -> Result<bool> {
    if clusters.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header = Format::new().set_bold();
    for (col, name) in COLUMNS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *name, &header)
            .map_err(|e| xlsx_error(path, e))?;
    }

    let mut row: u32 = 1;
    for (cluster_id, (cluster, members)) in clusters.iter().enumerate() {
        let color = Color::RGB(CLUSTER_COLORS[cluster_id % CLUSTER_COLORS.len()]);
        let plain = Format::new().set_background_color(color);
        let differing = Format::new().set_background_color(color).set_bold();
        let first = members.first().copied();

        for record in members {
            worksheet
                .write_string_with_format(row, 0, "", &plain)
                .map_err(|e| xlsx_error(path, e))?;
            worksheet
                .write_number_with_format(row, 1, (cluster.score * 10000.0).round() / 10000.0, &plain)
                .map_err(|e| xlsx_error(path, e))?;
            worksheet
                .write_number_with_format(row, 2, cluster_id as f64, &plain)
                .map_err(|e| xlsx_error(path, e))?;
            for (offset, column) in COLUMNS[3..].iter().enumerate() {
                let value = field_value(record, column);
                let differs = *column != "ID"
                    && first.is_some_and(|f| field_value(f, column) != value);
                let format = if differs { &differing } else { &plain };
                worksheet
                    .write_string_with_format(row, (offset + 3) as u16, &value, format)
                    .map_err(|e| xlsx_error(path, e))?;
            }
            row += 1;
        }
    }
    workbook.save(path).map_err(|e| xlsx_error(path, e))?;
    Ok(true)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// IDs of the clusters marked in the `error` column, per cluster
pub fn flagged_clusters(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| Error::DataFile(format!("{}: {}", path.display(), e)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::DataFile(format!("{}: no worksheet", path.display())))?
        .map_err(|e| Error::DataFile(format!("{}: {}", path.display(), e)))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let column = |name: &str| header.iter().position(|c| cell_text(c) == name);
    let (Some(error_col), Some(cluster_col), Some(id_col)) =
        (column("error"), column("cluster_id"), column("ID"))
    else {
        return Err(Error::DataFile(format!(
            "{}: expected columns error, cluster_id and ID",
            path.display()
        )));
    };

    let mut ids: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut flagged: Vec<String> = Vec::new();
    for row in rows {
        let get = |i: usize| row.get(i).map(cell_text).unwrap_or_default();
        let cluster = get(cluster_col);
        ids.entry(cluster.clone()).or_default().push(get(id_col));
        if !get(error_col).is_empty() && !flagged.contains(&cluster) {
            flagged.push(cluster);
        }
    }
    Ok(flagged
        .into_iter()
        .filter_map(|c| ids.remove(&c))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn record(id: &str, title: &str) -> Record {
        Record::new(id, "article")
            .with_field("author", "Webster, J.")
            .with_field("title", title)
            .with_field("year", "2002")
    }

    #[test]
    fn empty_cluster_list_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dupes.xlsx");
        assert!(!write_clusters(&path, &[]).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn exported_clusters_read_back_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dedupe").join("dupes.xlsx");
        let (a, b) = (record("A", "Writing a review"), record("B", "Writing a Review"));
        let cluster = Cluster {
            members: vec![0, 1],
            score: 0.91,
        };
        assert!(write_clusters(&path, &[(cluster, vec![&a, &b])]).unwrap());
        assert!(flagged_clusters(&path).unwrap().is_empty());
    }

    #[test]
    fn flagged_rows_select_their_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dupes.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, name) in COLUMNS.iter().enumerate() {
            sheet.write_string(0, col as u16, *name).unwrap();
        }
        let rows = [("", 0.0, "A"), ("x", 0.0, "B"), ("", 1.0, "C"), ("", 1.0, "D")];
        for (i, (error, cluster, id)) in rows.iter().enumerate() {
            let row = (i + 1) as u32;
            sheet.write_string(row, 0, *error).unwrap();
            sheet.write_number(row, 2, *cluster).unwrap();
            sheet.write_string(row, 3, *id).unwrap();
        }
        workbook.save(&path).unwrap();

        assert_eq!(
            flagged_clusters(&path).unwrap(),
            vec![vec!["A".to_string(), "B".to_string()]]
        );
    }
}
