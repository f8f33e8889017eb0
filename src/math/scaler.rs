use polars::prelude::{DataFrame, DataType, Expr, IntoLazy, col, lit};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, PipelineResult, polars_err};

/// Observed range of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    /// Fits the range over the finite values; nulls and NaN are ignored.
    ///
    /// A column without any finite value gets the empty range `[0, 0]`.
    pub fn fit(name: impl Into<String>, values: impl IntoIterator<Item = Option<f64>>) -> Self {
        let (min, max) = values
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .unwrap_or((0.0, 0.0));
        Self {
            name: name.into(),
            min,
            max,
        }
    }

    /// Divisor of the transform. A constant column is only shifted.
    fn span(&self) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 { 1.0 } else { span }
    }

    pub fn scale(&self, v: f64) -> f64 {
        (v - self.min) / self.span()
    }

    pub fn unscale(&self, v: f64) -> f64 {
        v * self.span() + self.min
    }

    fn expr(&self) -> Expr {
        ((col(self.name.as_str()).cast(DataType::Float64) - lit(self.min)) / lit(self.span()))
            .alias(self.name.as_str())
    }
}

/// Min-max scaler onto `[0, 1]`, fitted per column.
///
/// The fitted state is a plain value: persist it with [`crate::io::save`] and apply it
/// later to held-out data or reverse it at inference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    columns: Vec<ColumnRange>,
}

impl MinMaxScaler {
    pub fn from_ranges(columns: Vec<ColumnRange>) -> Self {
        Self { columns }
    }

    /// Fits one range per named column of `df`.
    pub fn fit(df: &DataFrame, columns: &[&str]) -> PipelineResult<Self> {
        let ranges = columns
            .iter()
            .map(|name| {
                let values = df
                    .column(name)
                    .and_then(|c| c.cast(&DataType::Float64))
                    .and_then(|c| c.f64().map(|ca| ca.into_iter().collect::<Vec<_>>()))
                    .map_err(|e| DataError::ColumnType {
                        column: (*name).to_string(),
                        msg: e.to_string(),
                    })?;
                Ok(ColumnRange::fit(*name, values))
            })
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Self { columns: ranges })
    }

    /// Replaces every fitted column of `df` with its scaled `f64` values.
    pub fn transform(&self, df: DataFrame) -> PipelineResult<DataFrame> {
        if self.columns.is_empty() {
            return Ok(df);
        }
        df.lazy()
            .with_columns(self.columns.iter().map(ColumnRange::expr).collect::<Vec<_>>())
            .collect()
            .map_err(|e| polars_err("applying min-max scaler", e))
    }

    pub fn fit_transform(df: DataFrame, columns: &[&str]) -> PipelineResult<(Self, DataFrame)> {
        let scaler = Self::fit(&df, columns)?;
        let df = scaler.transform(df)?;
        Ok((scaler, df))
    }

    pub fn ranges(&self) -> &[ColumnRange] {
        &self.columns
    }

    pub fn range(&self, name: &str) -> PipelineResult<&ColumnRange> {
        self.columns
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| DataError::UnknownScalerColumn(name.to_string()).into())
    }

    pub fn transform_value(&self, name: &str, v: f64) -> PipelineResult<f64> {
        Ok(self.range(name)?.scale(v))
    }

    pub fn inverse_transform_value(&self, name: &str, v: f64) -> PipelineResult<f64> {
        Ok(self.range(name)?.unscale(v))
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::io::{SerdeFormat, load, save};

    #[test]
    fn scales_onto_unit_interval() {
        let df = df!["1_total_mentions" => &[0i64, 5, 10]].unwrap();
        let (scaler, out) = MinMaxScaler::fit_transform(df, &["1_total_mentions"]).unwrap();
        let v: Vec<_> = out
            .column("1_total_mentions")
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(v, vec![Some(0.0), Some(0.5), Some(1.0)]);
        assert_eq!(scaler.transform_value("1_total_mentions", 5.0).unwrap(), 0.5);
    }

    #[test]
    fn persisted_scaler_maps_held_out_values() {
        let dir = tempfile::tempdir().unwrap();
        let df = df!["m" => &[0.0f64, 5.0, 10.0]].unwrap();
        let scaler = MinMaxScaler::fit(&df, &["m"]).unwrap();
        for fmt in [SerdeFormat::Postcard, SerdeFormat::Json] {
            let path = dir.path().join(format!("scaler.{fmt}"));
            save(&scaler, &path).unwrap();
            let back: MinMaxScaler = load(&path).unwrap();
            assert_eq!(back, scaler);
            assert_eq!(back.transform_value("m", 5.0).unwrap(), 0.5);
            assert_eq!(back.inverse_transform_value("m", 0.5).unwrap(), 5.0);
        }
    }

    #[test]
    fn constant_and_null_columns() {
        let r = ColumnRange::fit("c", [Some(3.0), None, Some(3.0)]);
        assert_eq!((r.min, r.max), (3.0, 3.0));
        assert_eq!(r.scale(3.0), 0.0);
        assert_eq!(r.unscale(0.0), 3.0);

        let r = ColumnRange::fit("n", [None, Some(f64::NAN)]);
        assert_eq!((r.min, r.max), (0.0, 0.0));

        let df = df!["x" => &[Some(1.0f64), None, Some(3.0)]].unwrap();
        let (_, out) = MinMaxScaler::fit_transform(df, &["x"]).unwrap();
        let v: Vec<_> = out.column("x").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(v, vec![Some(0.0), None, Some(1.0)]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let scaler = MinMaxScaler::default();
        assert!(scaler.transform_value("missing", 1.0).is_err());
        let df = df!["a" => &[1i64]].unwrap();
        assert!(MinMaxScaler::fit(&df, &["b"]).is_err());
    }
}
