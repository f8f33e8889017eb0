use std::{
    borrow::Cow,
    io::{Cursor, Read},
    sync::LazyLock,
};

use flate2::read::MultiGzDecoder;
use polars::prelude::{CsvParseOptions, CsvReadOptions, DataFrame, SerReader};
use regex::Regex;

use crate::{
    data::record::RecordKind,
    error::{ParseError, PipelineResult},
};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

// ================================================================================================
// Compression
// ================================================================================================

/// Sniffs the compression of a raw feed file by its magic bytes and inflates it.
///
/// Zip archives yield their first entry. Anything else is returned unchanged.
pub fn decompress(raw: &[u8]) -> Result<Cow<'_, [u8]>, ParseError> {
    if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::with_capacity(raw.len() * 8);
        MultiGzDecoder::new(raw)
            .read_to_end(&mut out)
            .map_err(|e| ParseError::Decompress {
                format: "gzip",
                msg: e.to_string(),
            })?;
        return Ok(Cow::Owned(out));
    }

    if raw.starts_with(&ZIP_MAGIC) {
        let zip_err = |e: zip::result::ZipError| ParseError::Decompress {
            format: "zip",
            msg: e.to_string(),
        };
        let mut archive = zip::ZipArchive::new(Cursor::new(raw)).map_err(zip_err)?;
        if archive.is_empty() {
            return Err(ParseError::EmptyFile);
        }
        let mut entry = archive.by_index(0).map_err(zip_err)?;
        let mut out = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
        entry
            .read_to_end(&mut out)
            .map_err(|e| ParseError::Decompress {
                format: "zip",
                msg: e.to_string(),
            })?;
        return Ok(Cow::Owned(out));
    }

    Ok(Cow::Borrowed(raw))
}

// ================================================================================================
// Text
// ================================================================================================

/// Decodes feed text as UTF-8, falling back to Latin-1 which maps every byte.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Reads headerless tab-separated feed text into an all-text frame with the kind's
/// positional column names.
///
/// No quoting is applied, surplus fields are truncated and empty fields are null.
pub fn read_feed_table(text: &str, kind: RecordKind) -> PipelineResult<DataFrame> {
    let parse_options = CsvParseOptions::default()
        .with_separator(b'\t')
        .with_quote_char(None)
        .with_truncate_ragged_lines(true)
        .with_missing_is_null(true);

    CsvReadOptions::default()
        .with_has_header(false)
        .with_schema(Some(kind.raw_schema()))
        .with_parse_options(parse_options)
        .into_reader_with_file_handle(Cursor::new(text.as_bytes()))
        .finish()
        .map_err(|e| ParseError::Table(format!("{kind} feed: {e}")).into())
}

/// Full decoding path from raw fetched bytes to the positional text frame.
pub fn decode_feed(raw: &[u8], kind: RecordKind) -> PipelineResult<DataFrame> {
    let plain = decompress(raw)?;
    if plain.is_empty() {
        return Err(ParseError::EmptyFile.into());
    }
    let text = decode_text(&plain);
    read_feed_table(&text, kind)
}

// ================================================================================================
// GCAM
// ================================================================================================

static GCAM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|,)wc:(\d+)|c3\.1:(\d+)|c3\.2:(\d+)|c4\.16:(\d+)")
        .unwrap_or_else(|e| unreachable!("static GCAM pattern is valid: {e}"))
});

/// The four sub-scores the pipeline keeps from a GCAM vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcamCounts {
    pub word_count: i64,
    pub negative: i64,
    pub positive: i64,
    pub finance: i64,
}

impl GcamCounts {
    /// Extracts `wc`, `c3.1`, `c3.2` and `c4.16`. Missing tags stay 0, repeated
    /// tags keep their last value.
    pub fn extract(gcam: &str) -> Self {
        let mut counts = Self::default();
        for caps in GCAM_PATTERN.captures_iter(gcam) {
            let slot = [
                &mut counts.word_count,
                &mut counts.negative,
                &mut counts.positive,
                &mut counts.finance,
            ];
            for (group, target) in slot.into_iter().enumerate() {
                if let Some(m) = caps.get(group + 1) {
                    // Digits only; overflow keeps the previous value.
                    if let Ok(v) = m.as_str().parse() {
                        *target = v;
                    }
                    break;
                }
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::{Compression, write::GzEncoder};
    use zip::write::SimpleFileOptions;

    use super::*;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn zipped(bytes: &[u8]) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        w.start_file("a.CSV", SimpleFileOptions::default()).unwrap();
        w.write_all(bytes).unwrap();
        w.start_file("b.CSV", SimpleFileOptions::default()).unwrap();
        w.write_all(b"ignored").unwrap();
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn sniffs_compression() {
        let text = b"1\t2\n";
        assert_eq!(decompress(&gzip(text)).unwrap().as_ref(), text);
        assert_eq!(decompress(&zipped(text)).unwrap().as_ref(), text);
        assert_eq!(decompress(text).unwrap().as_ref(), text);
    }

    #[test]
    fn corrupt_gzip_is_a_parse_error() {
        let err = decompress(&[0x1F, 0x8B, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, ParseError::Decompress { format: "gzip", .. }));
    }

    #[test]
    fn latin1_fallback_never_fails() {
        assert_eq!(decode_text("Zürich".as_bytes()), "Zürich");
        assert_eq!(decode_text(&[b'Z', 0xFC, b'r']), "Zür");
    }

    #[test]
    fn empty_input_is_rejected() {
        let err = decode_feed(&gzip(b""), RecordKind::Mention).unwrap_err();
        assert!(matches!(
            err,
            crate::error::PipelineError::Parse(ParseError::EmptyFile)
        ));
    }

    #[test]
    fn reads_ragged_positional_rows() {
        let long = vec!["x"; 20].join("\t");
        let text = format!("1\t20210101000000\t20210102000000\n2\t\t\t\t\t{long}\n");
        let df = read_feed_table(&text, RecordKind::Mention).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 16);
        let ids = df.column("GlobalEventID").unwrap().str().unwrap();
        assert_eq!(ids.get(1), Some("2"));
        let mt = df.column("MentionTimeDate").unwrap().str().unwrap();
        assert_eq!(mt.get(0), Some("20210102000000"));
        assert_eq!(mt.get(1), None);
    }

    #[test]
    fn quotes_are_literal() {
        let text = "\"a\tb\n";
        let df = read_feed_table(text, RecordKind::Mention).unwrap();
        let first = df.column("GlobalEventID").unwrap().str().unwrap();
        assert_eq!(first.get(0), Some("\"a"));
    }

    #[test]
    fn gcam_extraction() {
        let c = GcamCounts::extract("wc:100,c1.1:3,c3.1:10,c3.2:5");
        assert_eq!(
            c,
            GcamCounts {
                word_count: 100,
                negative: 10,
                positive: 5,
                finance: 0
            }
        );

        let c = GcamCounts::extract("wc:7,c4.16:2,c3.10:99,c4.16:4");
        assert_eq!(c.word_count, 7);
        assert_eq!(c.finance, 4);
        assert_eq!(c.negative, 0);

        assert_eq!(GcamCounts::extract("c2.1:4"), GcamCounts::default());
    }
}
