mod common;

use common::{Fixture, files_below};
use gdelt_features::{io::read_parquet, prelude::*};

fn f64_column(df: &polars::prelude::DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name).unwrap().f64().unwrap().into_iter().collect()
}

#[tokio::test]
async fn end_to_end_builds_feature_matrices() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(fx.config());
    let summary = pipeline.run().await.unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.failed_units(), 0, "{summary}");
    let labels: Vec<_> = summary.stages.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "download",
            "bucket event",
            "bucket detail",
            "bucket mention",
            "correlate",
            "financial"
        ]
    );
    assert_eq!(summary.stages[0].completed, 3);
    assert_eq!(summary.stages[4].completed, 4);

    let layout = fx.layout();
    let q1 = YearQuarter::new(Year(2021), Quarter::Q1);

    // The blank base code is gone, every category is valid.
    let events = read_parquet(&layout.quarter_file(RecordKind::Event, q1)).unwrap();
    assert_eq!(events.height(), 10);

    // One in-window mention per event; the late mention never counts.
    let correlated = read_parquet(&layout.correlated_file(q1)).unwrap();
    assert_eq!(correlated.height(), 10);
    for (name, expected) in [
        ("MentionsCount", 1),
        ("WordCount", 100),
        ("Negative", 5),
        ("Positive", 10),
        ("Finance", 1),
    ] {
        let values: Vec<_> = correlated
            .column(name)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert!(values.iter().all(|v| *v == Some(expected)), "{name}: {values:?}");
    }

    // Jan 1..=10 are emitted (trailing empty quarters do not cut the scan), two warm-up rows dropped.
    assert_eq!(summary.matrices.len(), 2);
    let daily = &summary.matrices[0];
    assert_eq!(daily.lookback, LookbackDays(1));
    assert_eq!(daily.rows, 8);
    assert_eq!(daily.columns, 101);
    assert_eq!(daily.first_day, chrono::NaiveDate::from_ymd_opt(2021, 1, 3));
    assert_eq!(daily.last_day, chrono::NaiveDate::from_ymd_opt(2021, 1, 10));

    let matrix = read_parquet(&layout.features_parquet(LookbackDays(1))).unwrap();
    assert!(matrix.column("Timestamp").is_err());
    let odd_days: Vec<_> = (3..=10).map(|d| Some(f64::from(d % 2))).collect();
    let even_days: Vec<_> = (3..=10).map(|d| Some(f64::from((d + 1) % 2))).collect();
    assert_eq!(f64_column(&matrix, "1_total_mentions"), odd_days);
    assert_eq!(f64_column(&matrix, "19_total_mentions"), even_days);

    let goldstein = f64_column(&matrix, "1_goldstein");
    assert!((goldstein[0].unwrap() - 0.67).abs() < 1e-9);
    assert_eq!(goldstein[1], Some(0.5));
    let negative = f64_column(&matrix, "1_negative");
    let expected: Vec<_> = odd_days.iter().map(|m| m.map(|m| m * 0.05)).collect();
    assert_eq!(negative, expected);

    let spx = f64_column(&matrix, "spx");
    assert!(spx.iter().all(|v| v.is_some_and(|v| (0.0..=1.0).contains(&v))));

    assert!(layout.features_csv(LookbackDays(3)).is_file());
    let scaler: MinMaxScaler = load(&layout.features_scaler(LookbackDays(3), SerdeFormat::Json)).unwrap();
    assert_eq!(scaler.ranges().len(), 20);
    let spx_scaler: MinMaxScaler =
        load(&layout.financial_scaler("spx", SerdeFormat::Json)).unwrap();
    assert!(spx_scaler.range("CloseToClose").is_ok());
}

#[tokio::test]
async fn cached_rerun_leaves_artifacts_untouched() {
    let fx = Fixture::new();
    fx.pipeline(fx.config()).run().await.unwrap();

    let layout = fx.layout();
    let watched = [
        layout.root().join("parsed"),
        layout.root().join("quarters"),
        layout.correlated_dir(),
    ];
    let before: Vec<_> = watched
        .iter()
        .flat_map(|d| files_below(d))
        .map(|p| (p.clone(), std::fs::read(&p).unwrap()))
        .collect();
    assert!(!before.is_empty());

    let summary = fx.pipeline(fx.config()).run().await.unwrap();
    assert_eq!(summary.stages[0].cached, 3);
    assert_eq!(summary.stages[0].completed, 0);
    assert_eq!(summary.stages[4].cached, 4);

    for (path, bytes) in before {
        assert_eq!(std::fs::read(&path).unwrap(), bytes, "{}", path.display());
    }
}

#[tokio::test]
async fn new_daily_files_rebuild_their_quarter() {
    let fx = Fixture::new();
    fx.pipeline(fx.config()).run().await.unwrap();

    let layout = fx.layout();
    let q2 = YearQuarter::new(Year(2021), Quarter::Q2);
    assert_eq!(read_parquet(&layout.quarter_file(RecordKind::Event, q2)).unwrap().height(), 0);

    fx.add_event_file("20210415000000", "20210414");
    std::fs::remove_file(layout.masterlist()).unwrap();

    let summary = fx.pipeline(fx.config()).run().await.unwrap();
    assert_eq!(summary.failed_units(), 0, "{summary}");
    assert_eq!(summary.stages[0].completed, 1);
    assert_eq!(summary.stages[0].cached, 3);

    let bucket_event = &summary.stages[1];
    assert_eq!(bucket_event.completed, 1, "{}", bucket_event.summary());
    assert_eq!(bucket_event.cached, 3);
    assert_eq!(read_parquet(&layout.quarter_file(RecordKind::Event, q2)).unwrap().height(), 1);

    let correlate = &summary.stages[4];
    assert_eq!(correlate.completed, 1, "{}", correlate.summary());
    assert_eq!(correlate.cached, 3);
}

#[tokio::test]
async fn missing_mirror_files_fail_units_not_the_run() {
    let fx = Fixture::new();
    std::fs::remove_file(
        fx.mirror
            .path()
            .join(format!("{}.gkg.csv.zip", common::STAMP)),
    )
    .unwrap();

    let pipeline = fx.pipeline(fx.config().with_lookbacks([1]));
    let list = pipeline.masterlist().await.unwrap();
    let report = pipeline.download(&list).await.unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].unit, format!("detail:{}", common::STAMP));
    assert_eq!(report.failures[0].error.kind(), "fetch");

    // Without detail buckets no quarter is ready.
    pipeline.bucket(RecordKind::Event).await.unwrap();
    pipeline.bucket(RecordKind::Mention).await.unwrap();
    let report = pipeline.correlate().await.unwrap();
    assert_eq!(report.skipped, 4);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
async fn aggregation_requires_financial_series() {
    let fx = Fixture::new();
    let pipeline = fx.pipeline(fx.config().with_instruments(["spx", "btc"]));
    let list = pipeline.masterlist().await.unwrap();
    pipeline.download(&list).await.unwrap();
    for kind in gdelt_features::pipeline::BUCKET_ORDER {
        pipeline.bucket(kind).await.unwrap();
    }
    pipeline.correlate().await.unwrap();

    // No raw btc prices: that unit fails, spx is still prepared.
    let report = pipeline.financial().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed(), 1);

    let err = pipeline.aggregate().await.unwrap_err();
    assert_eq!(err.kind(), "aggregation");
    assert!(!fx.layout().features_parquet(LookbackDays(1)).exists());
}
