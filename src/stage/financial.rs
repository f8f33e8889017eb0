use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use polars::prelude::{Column, CsvReadOptions, DataFrame, SerReader};

use crate::{
    data::{domain::EpochDay, layout::DataLayout},
    error::{DataError, IoError, ParseError, PipelineResult, polars_err},
    io::{SerdeFormat, save, write_parquet},
    math::scaler::MinMaxScaler,
    scheduler::WorkUnit,
    transport::schema::FeedCol,
};

const DATE_FORMAT: &str = "%m/%d/%Y";

/// Inputs and outputs of one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinancialPlan {
    pub name: String,
    pub raw: PathBuf,
    pub dest: PathBuf,
    pub scaler: PathBuf,
}

impl FinancialPlan {
    pub fn new(layout: &DataLayout, name: &str, fmt: SerdeFormat) -> Self {
        Self {
            name: name.to_string(),
            raw: layout.financial_raw(name),
            dest: layout.financial_processed(name),
            scaler: layout.financial_scaler(name, fmt),
        }
    }
}

/// Recomputed on every run.
impl WorkUnit for FinancialPlan {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn artifact(&self) -> Option<PathBuf> {
        None
    }
}

/// Builds the scaled close-to-close series of one instrument and persists it with its scaler.
#[tracing::instrument(skip(plan), fields(instrument = %plan.name))]
pub fn write_series(plan: &FinancialPlan) -> PipelineResult<usize> {
    let (mut df, scaler) = prepare_series(&plan.raw)?;
    write_parquet(&mut df, &plan.dest)?;
    save(&scaler, &plan.scaler)?;
    tracing::debug!(rows = df.height(), "Wrote financial series");
    Ok(df.height())
}

/// Reads a raw price CSV (`Date` as `MM/DD/YYYY`, `Price` with optional thousands
/// separators, newest row first) into `Timestamp` and scaled `CloseToClose`.
pub fn prepare_series(raw: &Path) -> PipelineResult<(DataFrame, MinMaxScaler)> {
    let bytes = std::fs::read(raw).map_err(|e| {
        IoError::ReadFailed(format!("Failed to read {}: {e}", raw.display()))
    })?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| ParseError::Table(format!("{}: {e}", raw.display())))?;

    let dates = text_column(&df, FeedCol::Date)?
        .into_iter()
        .map(|v| parse_date(v.as_deref()))
        .collect::<PipelineResult<Vec<_>>>()?;
    let prices = text_column(&df, FeedCol::Price)?
        .into_iter()
        .map(|v| parse_price(v.as_deref()))
        .collect::<PipelineResult<Vec<_>>>()?;

    let timestamps = dates
        .iter()
        .map(|d| EpochDay::from_date(*d).timestamp())
        .collect::<Vec<_>>();

    let df = DataFrame::new(vec![
        Column::new(FeedCol::Timestamp.name(), timestamps),
        Column::new(FeedCol::CloseToClose.name(), close_to_close(&prices)),
    ])
    .map_err(|e| polars_err("assembling financial series", e))?;

    let (scaler, df) = MinMaxScaler::fit_transform(df, &[FeedCol::CloseToClose.as_str()])?;
    Ok((df, scaler))
}

/// Percent change of each row against the next (older) row. The oldest row has none.
pub fn close_to_close(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|i| match (prices[i], prices.get(i + 1).copied().flatten()) {
            (Some(p), Some(prev)) if prev != 0.0 => Some((p / prev - 1.0) * 100.0),
            _ => None,
        })
        .collect()
}

fn text_column(df: &DataFrame, col: FeedCol) -> PipelineResult<Vec<Option<String>>> {
    let ca = df
        .column(col.as_str())
        .map_err(|_| DataError::MissingColumn(col.to_string()))?
        .str()
        .map_err(|e| DataError::ColumnType {
            column: col.to_string(),
            msg: e.to_string(),
        })?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

fn parse_date(v: Option<&str>) -> PipelineResult<NaiveDate> {
    let raw = v.unwrap_or_default().trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
        ParseError::MalformedValue {
            column: FeedCol::Date.to_string(),
            value: raw.to_string(),
        }
        .into()
    })
}

fn parse_price(v: Option<&str>) -> PipelineResult<Option<f64>> {
    let Some(raw) = v.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.replace(',', "")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| {
            ParseError::MalformedValue {
                column: FeedCol::Price.to_string(),
                value: raw.to_string(),
            }
            .into()
        })
}
