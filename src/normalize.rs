//! Turns raw sheet rows into typed records.
//!
//! The info tab uses the spreadsheet convention of merged cells: a blank id or
//! municipality means "same as the row above". Those three columns are filled forward in
//! row order, so rows must be processed strictly sequentially.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::domain::{InfoRecord, RoadRecord, StoreRecord, SupportRecord};
use crate::error::JobError;
use crate::geocode::Locator;
use crate::schema::{BoundRow, ColumnSchema, Field};

pub const DEFAULT_PREFECTURE: &str = "石川県";

/// Lazily yields `(line, row)` pairs after dropping `header_lines` leading records.
///
/// The sheet export never quotes cells, so `"` is read as literal text.
pub fn read_rows<R: Read>(
    input: R,
    header_lines: usize,
) -> impl Iterator<Item = Result<(u64, StringRecord), JobError>> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(input)
        .into_records()
        .enumerate()
        .skip(header_lines)
        .map(|(index, record)| {
            let record = record.map_err(|err| JobError::Parse(err.to_string()))?;
            let line = record
                .position()
                .map(|position| position.line())
                .unwrap_or(index as u64 + 1);
            Ok((line, record))
        })
}

/// Last non-blank values of the merged-cell columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarryForward {
    pub id: Option<String>,
    pub municipality: Option<String>,
    pub municipality2: Option<String>,
}

impl CarryForward {
    fn fill(slot: &mut Option<String>, cell: Option<&str>) -> Option<String> {
        if let Some(value) = cell.filter(|value| !value.is_empty()) {
            *slot = Some(value.to_string());
        }
        slot.clone()
    }

    pub fn apply(&mut self, row: &BoundRow<'_>) -> (Option<String>, Option<String>, Option<String>) {
        (
            Self::fill(&mut self.id, row.get(Field::Id)),
            Self::fill(&mut self.municipality, row.get(Field::Municipality)),
            Self::fill(&mut self.municipality2, row.get(Field::Municipality2)),
        )
    }
}

pub struct InfoNormalizer<'r> {
    schema: ColumnSchema,
    prefecture: String,
    locator: Option<&'r mut dyn Locator>,
    state: CarryForward,
}

impl<'r> InfoNormalizer<'r> {
    pub fn new(schema: ColumnSchema) -> Self {
        Self {
            schema,
            prefecture: DEFAULT_PREFECTURE.to_string(),
            locator: None,
            state: CarryForward::default(),
        }
    }

    pub fn with_prefecture(mut self, prefecture: &str) -> Self {
        self.prefecture = prefecture.to_string();
        self
    }

    /// Used only when the schema version geocodes during ingestion.
    pub fn with_locator(mut self, locator: &'r mut dyn Locator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn normalize<R: Read>(&mut self, input: R) -> Result<Vec<InfoRecord>, JobError> {
        let mut records = Vec::new();
        for row in read_rows(input, self.schema.header_lines) {
            let (line, row) = row?;
            let schema = self.schema;
            let bound = schema.bind(&row, line)?;
            records.push(self.normalize_row(&bound, line));
        }
        Ok(records)
    }

    pub fn normalize_row(&mut self, row: &BoundRow<'_>, line: u64) -> InfoRecord {
        let (id, municipality, municipality2) = self.state.apply(row);
        if id.is_none() && municipality.is_none() {
            debug!(line, "row has no id or municipality to carry forward");
        }
        let optional = |field: Field| row.get(field).map(str::to_string);

        let mut record = InfoRecord {
            id,
            municipality,
            municipality2,
            municipality3: row.text(Field::Municipality3),
            count: optional(Field::Count),
            city_aware: optional(Field::CityAware),
            situation: row.text(Field::Situation),
            last_updated_at: row.text(Field::LastUpdatedAt),
            status: row.text(Field::Status),
            support_flag: optional(Field::SupportFlag),
            latest_need: optional(Field::LatestNeed),
            response_status: row.text(Field::ResponseStatus),
            source_url: row.text(Field::SourceUrl),
            location: None,
            notes: row.notes(),
        };

        if self.schema.geocode {
            if let Some(locator) = self.locator.as_deref_mut() {
                if let Some(address) = geocode_address(&self.prefecture, &record) {
                    record.location = locator.locate(&address);
                }
            }
        }
        record
    }
}

/// Prefecture followed by every known municipality part, or `None` when the record has
/// no municipality at all.
pub fn geocode_address(prefecture: &str, record: &InfoRecord) -> Option<String> {
    let parts = [
        record.municipality.as_deref().unwrap_or_default(),
        record.municipality2.as_deref().unwrap_or_default(),
        record.municipality3.as_str(),
    ];
    if parts.iter().all(|part| part.is_empty()) {
        return None;
    }
    Some(format!("{prefecture}{}", parts.concat()))
}

fn normalize_plain<R, T, F>(input: R, schema: &ColumnSchema, build: F) -> Result<Vec<T>, JobError>
where
    R: Read,
    F: Fn(&BoundRow<'_>) -> T,
{
    let mut records = Vec::new();
    for row in read_rows(input, schema.header_lines) {
        let (line, row) = row?;
        let bound = schema.bind(&row, line)?;
        records.push(build(&bound));
    }
    Ok(records)
}

pub fn normalize_road<R: Read>(input: R) -> Result<Vec<RoadRecord>, JobError> {
    normalize_plain(input, &ColumnSchema::road(), |row| RoadRecord {
        situation: row.text(Field::Situation),
        last_updated_at: row.text(Field::LastUpdatedAt),
        source_url: row.text(Field::SourceUrl),
        notes: row.notes(),
    })
}

pub fn normalize_support<R: Read>(input: R) -> Result<Vec<SupportRecord>, JobError> {
    normalize_plain(input, &ColumnSchema::support(), |row| SupportRecord {
        title: row.text(Field::Title),
        source_url: row.text(Field::SourceUrl),
        notes: row.notes(),
    })
}

pub fn normalize_store<R: Read>(input: R) -> Result<Vec<StoreRecord>, JobError> {
    normalize_plain(input, &ColumnSchema::store(), |row| StoreRecord {
        number: row.text(Field::Number),
        region: row.text(Field::Region),
        store_name: row.text(Field::StoreName),
        notes: row.notes(),
    })
}
