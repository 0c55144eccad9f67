//! ==============================================================================
//! archive.rs - csv files for rotated samples
//! ==============================================================================
//!
//! purpose:
//!     the file side of rotation: takes a file stem and the ordered rows,
//!     writes `<dir>/<stem>.csv` with a header line.
//!
//! relationships:
//!     - used by: rotation.rs
//!
//! ==============================================================================

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::GaugesConfig;
use crate::error::ArchiveError;

pub type Row = [String; 4];

#[async_trait]
pub trait Archive: Send {
    /// write one table, returning where it landed
    async fn write_table(&mut self, stem: &str, rows: &[Row]) -> Result<PathBuf, ArchiveError>;
}

pub struct CsvArchive {
    dir: PathBuf,
    header: Row,
}

impl CsvArchive {
    pub fn new(dir: impl Into<PathBuf>, gauges: &GaugesConfig) -> Self {
        Self {
            dir: dir.into(),
            header: [
                "Date".to_string(),
                "Time".to_string(),
                format!("{} ({})", gauges.first_label, gauges.unit),
                format!("{} ({})", gauges.second_label, gauges.unit),
            ],
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn render(&self, rows: &[Row]) -> String {
        let mut out = String::new();
        for row in std::iter::once(&self.header).chain(rows) {
            let line: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
            out.push_str(&line.join(","));
            out.push_str("\r\n");
        }
        out
    }
}

#[async_trait]
impl Archive for CsvArchive {
    async fn write_table(&mut self, stem: &str, rows: &[Row]) -> Result<PathBuf, ArchiveError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ArchiveError::CreateDir { path: self.dir.clone(), source })?;

        let path = self.dir.join(format!("{}.csv", stem));
        tokio::fs::write(&path, self.render(rows))
            .await
            .map_err(|source| ArchiveError::Write { path: path.clone(), source })?;
        Ok(path)
    }
}

/// quote a field when it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Sample;
    use crate::frame::{decode_response, encode_response, GaugeAddress};
    use chrono::NaiveDate;

    fn row(values: [&str; 4]) -> Row {
        values.map(str::to_string)
    }

    #[test]
    fn test_header_from_labels() {
        let archive = CsvArchive::new("unused", &GaugesConfig::default());
        assert_eq!(archive.render(&[]), "Date,Time,Prep (mBar),LT (mBar)\r\n");
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_field("0.0025"), "0.0025");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_writes_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("archive").join("gauges");
        let mut archive = CsvArchive::new(&nested, &GaugesConfig::default());

        let rows = [
            row(["2024-01-01", "00:00:00", "2.5e-3", ""]),
            Sample::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 10).unwrap(),
                None,
                decode_response(&encode_response(GaugeAddress::Second, 4.0e-8)),
            )
            .to_row(),
        ];
        let path = archive.write_table("stem", &rows).await.unwrap();

        assert_eq!(path, nested.join("stem.csv"));
        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            [
                "Date,Time,Prep (mBar),LT (mBar)",
                "2024-01-01,00:00:00,2.5e-3,",
                "2024-01-01,00:00:10,,4e-8",
            ]
        );
    }

    #[tokio::test]
    async fn test_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut archive = CsvArchive::new(blocker.join("sub"), &GaugesConfig::default());
        let err = archive.write_table("stem", &[]).await.unwrap_err();
        assert!(matches!(err, ArchiveError::CreateDir { .. }));
    }
}
