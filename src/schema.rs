//! Named column layouts for each sheet tab.
//!
//! The spreadsheet has no usable header row, so every tab is read positionally. Each
//! layout lives here as an explicit table so that a column reorder in the sheet becomes a
//! new schema version instead of silently shifting values into the wrong fields.

use std::fmt;
use std::str::FromStr;

use csv::StringRecord;

use crate::domain::DatasetKind;
use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Municipality,
    Municipality2,
    Municipality3,
    Count,
    CityAware,
    Situation,
    LastUpdatedAt,
    Status,
    SupportFlag,
    LatestNeed,
    ResponseStatus,
    SourceUrl,
    Title,
    Number,
    Region,
    StoreName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = JobError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(SchemaVersion::V1),
            "v2" | "2" => Ok(SchemaVersion::V2),
            other => Err(JobError::InvalidConfig(format!(
                "unknown info schema version: {other}"
            ))),
        }
    }
}

const INFO_V1: &[Field] = &[
    Field::Id,
    Field::Municipality,
    Field::Municipality2,
    Field::Municipality3,
    Field::Situation,
    Field::LastUpdatedAt,
    Field::Status,
    Field::ResponseStatus,
    Field::SourceUrl,
];

const INFO_V2: &[Field] = &[
    Field::Id,
    Field::Municipality,
    Field::Municipality2,
    Field::Municipality3,
    Field::Count,
    Field::CityAware,
    Field::Situation,
    Field::LastUpdatedAt,
    Field::Status,
    Field::SupportFlag,
    Field::LatestNeed,
    Field::ResponseStatus,
    Field::SourceUrl,
];

const ROAD: &[Field] = &[Field::Situation, Field::LastUpdatedAt, Field::SourceUrl];

const SUPPORT: &[Field] = &[Field::Title, Field::SourceUrl];

const STORE: &[Field] = &[Field::Number, Field::Region, Field::StoreName];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSchema {
    pub dataset: DatasetKind,
    pub version: SchemaVersion,
    /// Leading lines dropped before the first data row.
    pub header_lines: usize,
    pub fields: &'static [Field],
    /// Whether records are geocoded during ingestion or left for the dashboard.
    pub geocode: bool,
}

impl ColumnSchema {
    pub fn info(version: SchemaVersion) -> Self {
        match version {
            SchemaVersion::V1 => Self {
                dataset: DatasetKind::Info,
                version,
                header_lines: 1,
                fields: INFO_V1,
                geocode: false,
            },
            SchemaVersion::V2 => Self {
                dataset: DatasetKind::Info,
                version,
                header_lines: 1,
                fields: INFO_V2,
                geocode: true,
            },
        }
    }

    pub fn road() -> Self {
        Self {
            dataset: DatasetKind::Road,
            version: SchemaVersion::V1,
            header_lines: 0,
            fields: ROAD,
            geocode: false,
        }
    }

    pub fn support() -> Self {
        Self {
            dataset: DatasetKind::Support,
            version: SchemaVersion::V1,
            header_lines: 1,
            fields: SUPPORT,
            geocode: false,
        }
    }

    pub fn store() -> Self {
        Self {
            dataset: DatasetKind::Store,
            version: SchemaVersion::V1,
            header_lines: 1,
            fields: STORE,
            geocode: false,
        }
    }

    pub fn position(&self, field: Field) -> Option<usize> {
        self.fields.iter().position(|candidate| *candidate == field)
    }

    /// Checks the row against the fixed columns and hands back named access to it.
    pub fn bind<'a>(&'a self, row: &'a StringRecord, line: u64) -> Result<BoundRow<'a>, JobError> {
        if row.len() < self.fields.len() {
            return Err(JobError::RowShape {
                dataset: self.dataset,
                line,
                expected: self.fields.len(),
                found: row.len(),
            });
        }
        Ok(BoundRow { schema: self, row })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundRow<'a> {
    schema: &'a ColumnSchema,
    row: &'a StringRecord,
}

impl<'a> BoundRow<'a> {
    /// Cell for `field`, or `None` when this schema version has no such column.
    pub fn get(&self, field: Field) -> Option<&'a str> {
        self.schema
            .position(field)
            .and_then(|index| self.row.get(index))
    }

    pub fn text(&self, field: Field) -> String {
        self.get(field).unwrap_or_default().to_string()
    }

    pub fn overflow(&self) -> impl Iterator<Item = &'a str> + 'a {
        let start = self.schema.fields.len();
        let row = self.row;
        row.iter().skip(start)
    }

    /// Non-empty overflow cells joined with newlines, in column order.
    pub fn notes(&self) -> String {
        self.overflow()
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
