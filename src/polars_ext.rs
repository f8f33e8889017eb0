use polars::prelude::{
    Column, DataFrame, DataType, Expr, Field, Int64Chunked, IntoColumn, IntoSeries, PolarsResult,
};

use crate::{
    data::domain::{Category, compact_date_millis, compact_timestamp_millis},
    error::{DataError, PipelineResult},
    transport::schema::FeedCol,
};

pub trait ExprExt {
    /// Parses a compact `YYYYMMDD` integer column to epoch milliseconds (UTC midnight).
    /// Invalid dates become null.
    fn compact_date_ms(self) -> Expr;

    /// Parses a compact `YYYYMMDDhhmmss` integer column to epoch milliseconds.
    /// Invalid timestamps become null.
    fn compact_timestamp_ms(self) -> Expr;

    /// Maps a raw CAMEO base code string to its root category in `1..=20`, null otherwise.
    fn cameo_category(self) -> Expr;
}

impl ExprExt for Expr {
    fn compact_date_ms(self) -> Expr {
        self.map(|c| map_i64_udf(c, compact_date_millis), int64_field)
    }

    fn compact_timestamp_ms(self) -> Expr {
        self.map(|c| map_i64_udf(c, compact_timestamp_millis), int64_field)
    }

    fn cameo_category(self) -> Expr {
        self.map(cameo_category_udf, int64_field)
    }
}

pub trait DataFrameExt {
    /// Fails with `DataError::MissingColumn` when any of `cols` is absent.
    fn require_columns(&self, cols: &[FeedCol]) -> PipelineResult<()>;

    /// Reads a column as `i64` values, casting first when needed.
    fn i64_values(&self, col: FeedCol) -> PipelineResult<Vec<Option<i64>>>;

    /// Reads a column as `f64` values, casting first when needed.
    fn f64_values(&self, col: FeedCol) -> PipelineResult<Vec<Option<f64>>>;
}

impl DataFrameExt for DataFrame {
    fn require_columns(&self, cols: &[FeedCol]) -> PipelineResult<()> {
        let schema = self.schema();
        match cols.iter().find(|c| !schema.contains(c.as_str())) {
            Some(missing) => Err(DataError::MissingColumn(missing.to_string()).into()),
            None => Ok(()),
        }
    }

    fn i64_values(&self, col: FeedCol) -> PipelineResult<Vec<Option<i64>>> {
        let values: Vec<Option<i64>> = self
            .column(col.as_str())
            .and_then(|c| c.cast(&DataType::Int64))
            .and_then(|c| c.i64().map(|ca| ca.into_iter().collect()))
            .map_err(|e| DataError::ColumnType {
                column: col.to_string(),
                msg: e.to_string(),
            })?;
        Ok(values)
    }

    fn f64_values(&self, col: FeedCol) -> PipelineResult<Vec<Option<f64>>> {
        let values: Vec<Option<f64>> = self
            .column(col.as_str())
            .and_then(|c| c.cast(&DataType::Float64))
            .and_then(|c| c.f64().map(|ca| ca.into_iter().collect()))
            .map_err(|e| DataError::ColumnType {
                column: col.to_string(),
                msg: e.to_string(),
            })?;
        Ok(values)
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn int64_field(_: &polars::prelude::Schema, f: &Field) -> PolarsResult<Field> {
    Ok(Field {
        name: f.name().clone(),
        dtype: DataType::Int64,
    })
}

fn map_i64_udf(c: Column, f: fn(i64) -> Option<i64>) -> PolarsResult<Column> {
    let name = c.name().clone();
    let casted = c.cast(&DataType::Int64)?;
    let out = casted
        .i64()?
        .into_iter()
        .map(|v| v.and_then(f))
        .collect::<Int64Chunked>()
        .with_name(name)
        .into_series()
        .into_column();
    Ok(out)
}

fn cameo_category_udf(c: Column) -> PolarsResult<Column> {
    let name = c.name().clone();
    let casted = c.cast(&DataType::String)?;
    let out = casted
        .str()?
        .into_iter()
        .map(|v| {
            v.and_then(Category::from_base_code)
                .map(|cat| i64::from(cat.get()))
        })
        .collect::<Int64Chunked>()
        .with_name(name)
        .into_series()
        .into_column();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use polars::{
        df,
        prelude::{IntoLazy, col},
    };

    use super::*;

    #[test]
    fn compact_times_map_to_millis() {
        let df = df![
            "d" => &[Some(20210101i64), Some(20211340), None],
            "t" => &[Some(20210102000000i64), Some(1), None],
        ]
        .unwrap();
        let out = df
            .lazy()
            .select([
                col("d").compact_date_ms(),
                col("t").compact_timestamp_ms(),
            ])
            .collect()
            .unwrap();
        let d = out.column("d").unwrap().i64().unwrap();
        assert_eq!(d.get(0), Some(1_609_459_200_000));
        assert_eq!(d.get(1), None);
        assert_eq!(d.get(2), None);
        let t = out.column("t").unwrap().i64().unwrap();
        assert_eq!(t.get(0), Some(1_609_545_600_000));
        assert_eq!(t.get(1), None);
    }

    #[test]
    fn categories_from_strings() {
        let df = df![
            "c" => &[Some("0112"), Some("---"), Some(""), Some("190"), None, Some("999")],
        ]
        .unwrap();
        let out = df
            .lazy()
            .select([col("c").cameo_category()])
            .collect()
            .unwrap();
        let c: Vec<_> = out.column("c").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(c, vec![Some(1), None, None, Some(19), None, None]);
    }

    #[test]
    fn required_columns() {
        let df = df!["Time" => &[1i64], "MentionsCount" => &[1i64]].unwrap();
        assert!(
            df.require_columns(&[FeedCol::Time, FeedCol::MentionsCount])
                .is_ok()
        );
        assert!(df.require_columns(&[FeedCol::Finance]).is_err());
        assert_eq!(df.i64_values(FeedCol::Time).unwrap(), vec![Some(1)]);
        assert_eq!(df.f64_values(FeedCol::MentionsCount).unwrap(), vec![Some(1.0)]);
    }
}
