//! The replicated record
//!
//! A title record as the API layer sees it. The key is carried separately.
//! Stored rows use `NULL | INT | TEXT`, so `isAdult` is kept as 0/1 and
//! absent optionals as `NULL`. `to_row` and `from_row` are the only
//! conversion pair between the two shapes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::{Column, EngineError, EngineResult, Row};

pub const TITLE_TYPE: &str = "titleType";
pub const PRIMARY_TITLE: &str = "primaryTitle";
pub const ORIGINAL_TITLE: &str = "originalTitle";
pub const IS_ADULT: &str = "isAdult";
pub const START_YEAR: &str = "startYear";
pub const END_YEAR: &str = "endYear";
pub const RUNTIME_MINUTES: &str = "runtimeMinutes";
pub const GENRES: &str = "genres";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub title_type: Option<String>,
    pub primary_title: Option<String>,
    pub original_title: Option<String>,
    #[serde(default, deserialize_with = "bool_or_flag")]
    pub is_adult: bool,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub genres: Option<String>,
}

/// Accepts `true`/`false` as well as the `0`/`1` flags the store uses.
fn bool_or_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Null(Option<()>),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
        Flag::Null(_) => false,
    })
}

impl Record {
    pub fn titled(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            title_type: Some("movie".to_string()),
            primary_title: Some(title.clone()),
            original_title: Some(title),
            ..Default::default()
        }
    }

    pub fn with_primary_title(mut self, title: impl Into<String>) -> Self {
        self.primary_title = Some(title.into());
        self
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(TITLE_TYPE.into(), self.title_type.clone().into());
        row.insert(PRIMARY_TITLE.into(), self.primary_title.clone().into());
        row.insert(ORIGINAL_TITLE.into(), self.original_title.clone().into());
        row.insert(IS_ADULT.into(), self.is_adult.into());
        row.insert(START_YEAR.into(), self.start_year.into());
        row.insert(END_YEAR.into(), self.end_year.into());
        row.insert(RUNTIME_MINUTES.into(), self.runtime_minutes.into());
        row.insert(GENRES.into(), self.genres.clone().into());
        row
    }

    /// Rebuilds a record from a stored row. Missing columns read as `NULL`.
    pub fn from_row(row: &Row) -> EngineResult<Self> {
        Ok(Self {
            title_type: text(row, TITLE_TYPE)?,
            primary_title: text(row, PRIMARY_TITLE)?,
            original_title: text(row, ORIGINAL_TITLE)?,
            is_adult: int(row, IS_ADULT)?.map_or(false, |v| v != 0),
            start_year: small_int(row, START_YEAR)?,
            end_year: small_int(row, END_YEAR)?,
            runtime_minutes: small_int(row, RUNTIME_MINUTES)?,
            genres: text(row, GENRES)?,
        })
    }
}

fn type_error(column: &str) -> EngineError {
    EngineError::ColumnType {
        column: column.to_string(),
    }
}

fn text(row: &Row, column: &str) -> EngineResult<Option<String>> {
    match row.get(column) {
        None | Some(Column::Null) => Ok(None),
        Some(Column::Text(s)) => Ok(Some(s.clone())),
        Some(Column::Int(_)) => Err(type_error(column)),
    }
}

fn int(row: &Row, column: &str) -> EngineResult<Option<i64>> {
    match row.get(column) {
        None | Some(Column::Null) => Ok(None),
        Some(Column::Int(n)) => Ok(Some(*n)),
        Some(Column::Text(_)) => Err(type_error(column)),
    }
}

fn small_int(row: &Row, column: &str) -> EngineResult<Option<i32>> {
    int(row, column)?
        .map(|n| i32::try_from(n).map_err(|_| type_error(column)))
        .transpose()
}
