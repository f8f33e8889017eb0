use std::path::Path;

use polars::prelude::{Column, DataFrame, IntoLazy, col, lit};

use crate::{
    data::record::RecordKind,
    error::{PipelineResult, polars_err},
    io::write_parquet,
    transport::{
        decode::{GcamCounts, decode_feed},
        schema::FeedCol,
    },
};

/// Parses one raw feed file and writes its retained columns to `dest`.
///
/// Returns the number of rows written. Detail rows without a GCAM vector are dropped.
#[tracing::instrument(skip(raw), fields(bytes = raw.len(), dest = %dest.display()))]
pub fn parse_feed(raw: &[u8], kind: RecordKind, dest: &Path) -> PipelineResult<usize> {
    let df = decode_feed(raw, kind)?;
    let mut df = retain(df, kind)?;
    write_parquet(&mut df, dest)?;
    tracing::debug!(rows = df.height(), "Parsed feed file");
    Ok(df.height())
}

/// Selects and types the retained columns of a positional text frame.
///
/// Numeric casts are lenient: unparseable values become null.
pub fn retain(df: DataFrame, kind: RecordKind) -> PipelineResult<DataFrame> {
    let df = match kind {
        RecordKind::Detail => with_gcam_counts(df)?,
        RecordKind::Event | RecordKind::Mention => df,
    };

    let exprs = kind
        .retained()
        .iter()
        .map(|c| col(c.name()).cast(c.dtype()).alias(c.name()))
        .collect::<Vec<_>>();

    df.lazy()
        .select(exprs)
        .collect()
        .map_err(|e| polars_err(&format!("selecting retained {kind} columns"), e))
}

fn with_gcam_counts(df: DataFrame) -> PipelineResult<DataFrame> {
    let gcam = FeedCol::Gcam.name();
    let mut df = df
        .lazy()
        .filter(
            col(gcam.clone())
                .is_not_null()
                .and(col(gcam.clone()).neq(lit(""))),
        )
        .collect()
        .map_err(|e| polars_err("dropping rows without GCAM", e))?;

    let counts = df
        .column(gcam.as_str())
        .and_then(|c| c.str())
        .map_err(|e| polars_err("reading GCAM", e))?
        .into_iter()
        .map(|v| v.map(GcamCounts::extract).unwrap_or_default())
        .collect::<Vec<_>>();

    let columns = [
        (FeedCol::WordCount, counts.iter().map(|c| c.word_count).collect::<Vec<_>>()),
        (FeedCol::Negative, counts.iter().map(|c| c.negative).collect()),
        (FeedCol::Positive, counts.iter().map(|c| c.positive).collect()),
        (FeedCol::Finance, counts.iter().map(|c| c.finance).collect()),
    ];
    for (name, values) in columns {
        df.with_column(Column::new(name.name(), values))
            .map_err(|e| polars_err("attaching GCAM counts", e))?;
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use polars::prelude::DataType;

    use super::*;
    use crate::io::read_parquet;

    fn detail_line(doc: &str, gcam: &str) -> String {
        let mut fields = vec![""; 29];
        fields[0] = "20210101000000-1";
        fields[4] = doc;
        fields[17] = gcam;
        fields.join("\t")
    }

    #[test]
    fn events_keep_typed_retained_columns() {
        let mut fields = vec![""; 61];
        fields[0] = "42";
        fields[1] = "20210101";
        fields[26] = "0112";
        fields[27] = "011";
        fields[29] = "1";
        fields[30] = "-2.5";
        fields[53] = "US";
        let raw = format!("{}\n", fields.join("\t"));

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("parsed/event/2021/20210101000000.parquet");
        let rows = parse_feed(raw.as_bytes(), RecordKind::Event, &dest).unwrap();
        assert_eq!(rows, 1);

        let df = read_parquet(&dest).unwrap();
        assert_eq!(df.schema().as_ref(), RecordKind::Event.parsed_schema().as_ref());
        let base = df.column("EventBaseCode").unwrap().str().unwrap();
        assert_eq!(base.get(0), Some("011"));
        let g = df.column("GoldsteinScale").unwrap().f64().unwrap();
        assert_eq!(g.get(0), Some(-2.5));
    }

    #[test]
    fn bad_numbers_become_null() {
        let raw = "abc\t2021\tx\n";
        let df = retain(
            crate::transport::decode::read_feed_table(raw, RecordKind::Mention).unwrap(),
            RecordKind::Mention,
        )
        .unwrap();
        assert_eq!(
            df.column("GlobalEventID").unwrap().dtype(),
            &DataType::Int64
        );
        assert_eq!(df.column("GlobalEventID").unwrap().null_count(), 1);
        // Third positional field is MentionTimeDate.
        assert_eq!(df.column("MentionTimeDate").unwrap().null_count(), 1);
    }

    #[test]
    fn details_without_gcam_are_dropped() {
        let raw = [
            detail_line("https://a", "wc:100,c3.1:10,c3.2:5"),
            detail_line("https://b", ""),
            detail_line("https://c", "wc:3"),
        ]
        .join("\n");

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("d.parquet");
        let rows = parse_feed(raw.as_bytes(), RecordKind::Detail, &dest).unwrap();
        assert_eq!(rows, 2);

        let df = read_parquet(&dest).unwrap();
        let docs = df.column("DocumentIdentifier").unwrap().str().unwrap();
        assert_eq!(docs.get(0), Some("https://a"));
        assert_eq!(docs.get(1), Some("https://c"));
        let wc = df.column("WordCount").unwrap().i64().unwrap();
        assert_eq!(wc.get(0), Some(100));
        assert_eq!(wc.get(1), Some(3));
        let neg = df.column("Negative").unwrap().i64().unwrap();
        assert_eq!(neg.get(0), Some(10));
        assert_eq!(neg.get(1), Some(0));
    }

    #[test]
    fn empty_file_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("e.parquet");
        assert!(parse_feed(b"", RecordKind::Event, &dest).is_err());
        assert!(!dest.exists());
    }
}
