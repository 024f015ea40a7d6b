//! Report rendering
//!
//! The `report` mode prints one row per classified artifact to stdout as an aligned
//! table; the keep/delete summary goes to stderr so the table stays machine-readable.

use crate::artifact::Artifact;
use crate::rules::Classification;
use chrono::{DateTime, Utc};
use std::io::{self, Write};

const HEADER: [&str; 5] = ["action", "image", "tag", "parsed_version", "age_days"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Keep,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Keep => "keep",
            Action::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub action: Action,
    pub image: String,
    pub tag: String,
    pub parsed_version: String,
    pub age_days: i64,
}

impl ReportRow {
    pub fn new(action: Action, artifact: &Artifact, now: DateTime<Utc>) -> Self {
        Self {
            action,
            image: artifact.repository().to_string(),
            tag: artifact.tag().to_string(),
            parsed_version: artifact.version().to_string(),
            age_days: artifact.age_days(now),
        }
    }

    fn cells(&self) -> [String; 5] {
        [
            self.action.as_str().to_string(),
            self.image.clone(),
            self.tag.clone(),
            self.parsed_version.clone(),
            self.age_days.to_string(),
        ]
    }
}

/// Keep rows followed by delete rows, each in classification order
#[derive(Debug, Clone, Default)]
pub struct ReportTable {
    rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn from_classification(classification: &Classification, now: DateTime<Utc>) -> Self {
        let keep = classification
            .keep
            .iter()
            .map(|a| ReportRow::new(Action::Keep, a, now));
        let delete = classification
            .delete
            .iter()
            .map(|a| ReportRow::new(Action::Delete, a, now));
        Self {
            rows: keep.chain(delete).collect(),
        }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Columns padded to their widest cell plus one space; the last column is not padded.
    pub fn render(&self) -> String {
        let lines: Vec<[String; 5]> = std::iter::once(HEADER.map(str::to_string))
            .chain(self.rows.iter().map(ReportRow::cells))
            .collect();

        let mut widths = [0usize; 5];
        for line in &lines {
            for (width, cell) in widths.iter_mut().zip(line) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        for line in &lines {
            for (i, cell) in line.iter().enumerate() {
                if i + 1 == line.len() {
                    out.push_str(cell);
                } else {
                    out.push_str(&format!("{:<width$} ", cell, width = widths[i]));
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.render().as_bytes())?;
        writer.flush()
    }
}

/// `deleting N images, keeping M images`
pub fn summary_line(classification: &Classification) -> String {
    format!(
        "deleting {} images, keeping {} images",
        classification.delete.len(),
        classification.keep.len()
    )
}
