use std::sync::Arc;

use polars::prelude::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::transport::schema::{
    DETAIL_COLUMNS, EVENT_COLUMNS, FeedCol, MENTION_COLUMNS, raw_text_schema,
};

/// The three record kinds of the feed.
///
/// Each kind carries its full positional column list and the subset the
/// pipeline retains after parsing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Event,
    Mention,
    Detail,
}

impl RecordKind {
    /// Resolves the type segment of a feed file name (`export`, `mentions`, `gkg`).
    pub fn from_feed_type(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "export" => Some(Self::Event),
            "mentions" => Some(Self::Mention),
            "gkg" => Some(Self::Detail),
            _ => None,
        }
    }

    pub fn full_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Event => &EVENT_COLUMNS,
            Self::Mention => &MENTION_COLUMNS,
            Self::Detail => &DETAIL_COLUMNS,
        }
    }

    pub fn retained(&self) -> &'static [FeedCol] {
        match self {
            Self::Event => &[
                FeedCol::GlobalEventId,
                FeedCol::SqlDate,
                FeedCol::EventBaseCode,
                FeedCol::QuadClass,
                FeedCol::GoldsteinScale,
                FeedCol::ActionGeoCountryCode,
            ],
            Self::Mention => &[
                FeedCol::GlobalEventId,
                FeedCol::MentionTimeDate,
                FeedCol::MentionIdentifier,
            ],
            Self::Detail => &[
                FeedCol::DocumentIdentifier,
                FeedCol::WordCount,
                FeedCol::Negative,
                FeedCol::Positive,
                FeedCol::Finance,
            ],
        }
    }

    pub fn raw_schema(&self) -> SchemaRef {
        raw_text_schema(self.full_columns())
    }

    /// Schema of a parsed daily file.
    pub fn parsed_schema(&self) -> SchemaRef {
        Arc::new(Schema::from_iter(self.retained().iter().map(FeedCol::field)))
    }

    /// Schema of a quarter bucket. Event buckets carry the integer category.
    pub fn bucket_schema(&self) -> SchemaRef {
        Arc::new(Schema::from_iter(self.retained().iter().map(|c| match (self, c) {
            (Self::Event, FeedCol::EventBaseCode) => Field::new(c.name(), DataType::Int64),
            _ => c.field(),
        })))
    }
}
