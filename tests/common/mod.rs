#![allow(dead_code)]

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDate;
use flate2::{Compression, write::GzEncoder};
use gdelt_features::{
    prelude::*,
    transport::schema::{DETAIL_COLUMNS, EVENT_COLUMNS, MENTION_COLUMNS},
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const MASTERLIST_URL: &str = "http://mirror.test/gdeltv2/masterfilelist.txt";
pub const STAMP: &str = "20210115000000";

/// A mirror directory with fixture feeds and an empty data root.
pub struct Fixture {
    pub mirror: TempDir,
    pub data: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            mirror: tempfile::tempdir().unwrap(),
            data: tempfile::tempdir().unwrap(),
        };
        fixture.write_feeds();
        fixture.write_prices();
        fixture
    }

    pub fn config(&self) -> PipelineConfig {
        let fetch = FetchConfig {
            masterlist_url: MASTERLIST_URL.to_string(),
            ..FetchConfig::default()
        };
        PipelineConfig::default()
            .with_data_root(self.data.path())
            .with_years([2021])
            .with_instruments(["spx"])
            .with_lookbacks([1, 3])
            .with_fetch(fetch)
            .with_scan_start(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())
            .with_warmup_rows(2)
            .with_scaler_format(SerdeFormat::Json)
            .with_limits(StageLimits {
                workers: Some(2),
                ..StageLimits::default()
            })
    }

    pub fn pipeline(&self, config: PipelineConfig) -> Pipeline<MirrorFetcher> {
        Pipeline::new(config, MirrorFetcher::new(self.mirror.path()), scheduler()).unwrap()
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(self.data.path())
    }

    /// Ten events on Jan 1..=10, one in-window mention each, plus noise.
    fn write_feeds(&self) {
        let mut events = String::new();
        let mut mentions = String::new();
        let mut details = String::new();
        for i in 1..=10u32 {
            let id = (1000 + i).to_string();
            let date = format!("202101{i:02}");
            let code = if i % 2 == 0 { "190" } else { "0112" };
            let goldstein = if i % 2 == 0 { "-10" } else { "3.4" };
            let url = format!("https://news.test/{i}");
            let mention_time = format!("{date}120000");
            events.push_str(&tsv_row(
                &EVENT_COLUMNS,
                &[
                    ("GlobalEventID", id.as_str()),
                    ("SQLDATE", date.as_str()),
                    ("EventBaseCode", code),
                    ("QuadClass", "1"),
                    ("GoldsteinScale", goldstein),
                    ("ActionGeo_CountryCode", "US"),
                ],
            ));
            mentions.push_str(&tsv_row(
                &MENTION_COLUMNS,
                &[
                    ("GlobalEventID", id.as_str()),
                    ("MentionTimeDate", mention_time.as_str()),
                    ("MentionIdentifier", url.as_str()),
                ],
            ));
            details.push_str(&tsv_row(
                &DETAIL_COLUMNS,
                &[
                    ("DocumentIdentifier", url.as_str()),
                    ("GCAM", "wc:100,c3.1:5,c3.2:10,c4.16:1"),
                ],
            ));
        }
        // Blank base code: dropped when bucketing.
        events.push_str(&tsv_row(
            &EVENT_COLUMNS,
            &[("GlobalEventID", "9999"), ("SQLDATE", "20210103"), ("EventBaseCode", "---")],
        ));
        // Mention far outside the recency window.
        mentions.push_str(&tsv_row(
            &MENTION_COLUMNS,
            &[
                ("GlobalEventID", "1001"),
                ("MentionTimeDate", "20210301000000"),
                ("MentionIdentifier", "https://news.test/late"),
            ],
        ));
        // Detail without GCAM: dropped when parsing.
        details.push_str(&tsv_row(&DETAIL_COLUMNS, &[("DocumentIdentifier", "https://x")]));

        let mirror = self.mirror.path();
        std::fs::write(mirror.join(format!("{STAMP}.export.CSV.zip")), zip_bytes("export.CSV", &events)).unwrap();
        std::fs::write(mirror.join(format!("{STAMP}.mentions.CSV.zip")), zip_bytes("mentions.CSV", &mentions)).unwrap();
        std::fs::write(mirror.join(format!("{STAMP}.gkg.csv.zip")), gzip_bytes(&details)).unwrap();

        let list = [
            format!("10 aa http://mirror.test/gdeltv2/{STAMP}.export.CSV.zip"),
            format!("10 bb http://mirror.test/gdeltv2/{STAMP}.mentions.CSV.zip"),
            format!("10 cc http://mirror.test/gdeltv2/{STAMP}.gkg.csv.zip"),
            format!("10 dd http://mirror.test/gdeltv2/{STAMP}.translation.export.CSV.zip"),
        ]
        .join("\n");
        std::fs::write(mirror.join("masterfilelist.txt"), list).unwrap();
    }

    /// Publishes one more event file with a single event on `date`.
    pub fn add_event_file(&self, stamp: &str, date: &str) {
        let events = tsv_row(
            &EVENT_COLUMNS,
            &[
                ("GlobalEventID", "5001"),
                ("SQLDATE", date),
                ("EventBaseCode", "0112"),
                ("QuadClass", "1"),
                ("GoldsteinScale", "1.0"),
            ],
        );
        let mirror = self.mirror.path();
        std::fs::write(mirror.join(format!("{stamp}.export.CSV.zip")), zip_bytes("export.CSV", &events)).unwrap();

        let mut list = std::fs::read_to_string(mirror.join("masterfilelist.txt")).unwrap();
        list.push_str(&format!("\n10 ee http://mirror.test/gdeltv2/{stamp}.export.CSV.zip"));
        std::fs::write(mirror.join("masterfilelist.txt"), list).unwrap();
    }

    /// Newest first, one price per day from Jan 12 back to Dec 28.
    fn write_prices(&self) {
        let mut csv = String::from("\"Date\",\"Price\",\"Open\"\n");
        let start = NaiveDate::from_ymd_opt(2021, 1, 12).unwrap();
        for i in 0..16 {
            let day = start - chrono::Duration::days(i);
            let price = 3_700.0 + (i as f64 * 7.0) % 50.0;
            csv.push_str(&format!(
                "\"{}\",\"{},{:03}.00\",\"1\"\n",
                day.format("%m/%d/%Y"),
                (price as i64) / 1000,
                (price as i64) % 1000
            ));
        }
        let path = self.layout().financial_raw("spx");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, csv).unwrap();
    }
}

pub fn scheduler() -> Scheduler {
    Scheduler::new(
        WorkerPool::new(2).unwrap(),
        Arc::new(SilentProgress),
        CancellationToken::new(),
    )
}

/// One tab-separated line with `values` placed at their column positions.
pub fn tsv_row(columns: &[&str], values: &[(&str, &str)]) -> String {
    let mut fields = vec![""; columns.len()];
    for (name, value) in values {
        let idx = columns.iter().position(|c| c == name).unwrap();
        fields[idx] = *value;
    }
    let mut line = fields.join("\t");
    line.push('\n');
    line
}

pub fn gzip_bytes(text: &str) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap()
}

pub fn zip_bytes(entry: &str, text: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file(entry, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(text.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Every file below `dir`, sorted.
pub fn files_below(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in std::fs::read_dir(&d).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}
