use std::sync::Arc;

use polars::prelude::{DataType, Field, PlSmallStr, Schema, SchemaRef, TimeUnit};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The column vocabulary shared by every persisted table of the pipeline.
///
/// Names follow the upstream feed so that parsed files stay readable next to
/// the raw documentation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum FeedCol {
    // ========================================================================
    // Events
    // ========================================================================
    #[strum(serialize = "GlobalEventID")]
    GlobalEventId,
    /// Event day as a compact `YYYYMMDD` integer.
    #[strum(serialize = "SQLDATE")]
    SqlDate,
    /// CAMEO base code. A string in parsed files, the integer category afterwards.
    #[strum(serialize = "EventBaseCode")]
    EventBaseCode,
    #[strum(serialize = "QuadClass")]
    QuadClass,
    #[strum(serialize = "GoldsteinScale")]
    GoldsteinScale,
    #[strum(serialize = "ActionGeo_CountryCode")]
    ActionGeoCountryCode,

    // ========================================================================
    // Mentions
    // ========================================================================
    /// Mention timestamp as a compact `YYYYMMDDhhmmss` integer.
    #[strum(serialize = "MentionTimeDate")]
    MentionTimeDate,
    /// Article URL, joins to `DocumentIdentifier`.
    #[strum(serialize = "MentionIdentifier")]
    MentionIdentifier,

    // ========================================================================
    // Details
    // ========================================================================
    #[strum(serialize = "DocumentIdentifier")]
    DocumentIdentifier,
    #[strum(serialize = "GCAM")]
    Gcam,
    #[strum(serialize = "WordCount")]
    WordCount,
    #[strum(serialize = "Negative")]
    Negative,
    #[strum(serialize = "Positive")]
    Positive,
    #[strum(serialize = "Finance")]
    Finance,

    // ========================================================================
    // Correlated
    // ========================================================================
    /// Event time, millisecond precision, UTC.
    #[strum(serialize = "Time")]
    Time,
    #[strum(serialize = "MentionsCount")]
    MentionsCount,

    // ========================================================================
    // Financial
    // ========================================================================
    /// UTC midnight of the day in epoch seconds.
    #[strum(serialize = "Timestamp")]
    Timestamp,
    #[strum(serialize = "CloseToClose")]
    CloseToClose,
    #[strum(serialize = "Date")]
    Date,
    #[strum(serialize = "Price")]
    Price,
}

impl From<FeedCol> for PlSmallStr {
    fn from(value: FeedCol) -> Self {
        value.as_str().into()
    }
}

impl FeedCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Self::EventBaseCode
            | Self::ActionGeoCountryCode
            | Self::MentionIdentifier
            | Self::DocumentIdentifier
            | Self::Gcam
            | Self::Date
            | Self::Price => DataType::String,

            Self::GlobalEventId
            | Self::SqlDate
            | Self::QuadClass
            | Self::MentionTimeDate
            | Self::WordCount
            | Self::Negative
            | Self::Positive
            | Self::Finance
            | Self::MentionsCount
            | Self::Timestamp => DataType::Int64,

            Self::GoldsteinScale | Self::CloseToClose => DataType::Float64,

            Self::Time => DataType::Datetime(TimeUnit::Milliseconds, None),
        }
    }

    pub fn field(&self) -> Field {
        Field::new(self.name(), self.dtype())
    }
}

// ================================================================================================
// Raw Feed Layouts
// ================================================================================================

/// Positional columns of an event export file.
pub const EVENT_COLUMNS: [&str; 61] = [
    "GlobalEventID",
    "SQLDATE",
    "MonthYear",
    "Year",
    "FractionDate",
    "Actor1Code",
    "Actor1Name",
    "Actor1CountryCode",
    "Actor1KnownGroupCode",
    "Actor1EthnicCode",
    "Actor1Religion1Code",
    "Actor1Religion2Code",
    "Actor1Type1Code",
    "Actor1Type2Code",
    "Actor1Type3Code",
    "Actor2Code",
    "Actor2Name",
    "Actor2CountryCode",
    "Actor2KnownGroupCode",
    "Actor2EthnicCode",
    "Actor2Religion1Code",
    "Actor2Religion2Code",
    "Actor2Type1Code",
    "Actor2Type2Code",
    "Actor2Type3Code",
    "IsRootEvent",
    "EventCode",
    "EventBaseCode",
    "EventRootCode",
    "QuadClass",
    "GoldsteinScale",
    "NumMentions",
    "NumSources",
    "NumArticles",
    "AvgTone",
    "Actor1Geo_Type",
    "Actor1Geo_Fullname",
    "Actor1Geo_CountryCode",
    "Actor1Geo_ADM1Code",
    "Actor1Geo_ADM2Code",
    "Actor1Geo_Lat",
    "Actor1Geo_Long",
    "Actor1Geo_FeatureID",
    "Actor2Geo_Type",
    "Actor2Geo_Fullname",
    "Actor2Geo_CountryCode",
    "Actor2Geo_ADM1Code",
    "Actor2Geo_ADM2Code",
    "Actor2Geo_Lat",
    "Actor2Geo_Long",
    "Actor2Geo_FeatureID",
    "ActionGeo_Type",
    "ActionGeo_Fullname",
    "ActionGeo_CountryCode",
    "ActionGeo_ADM1Code",
    "ActionGeo_ADM2Code",
    "ActionGeo_Lat",
    "ActionGeo_Long",
    "ActionGeo_FeatureID",
    "DATEADDED",
    "SOURCEURL",
];

/// Positional columns of a mentions file.
pub const MENTION_COLUMNS: [&str; 16] = [
    "GlobalEventID",
    "SQLDATE",
    "MentionTimeDate",
    "MentionType",
    "MentionSourceName",
    "MentionIdentifier",
    "SentenceID",
    "Actor1CharOffset",
    "Actor2CharOffset",
    "ActionCharOffset",
    "InRawText",
    "Confidence",
    "MentionDocLen",
    "MentionDocTone",
    "MentionDocTranslationInfo",
    "Extras",
];

/// Positional columns of a knowledge-graph (detail) file.
pub const DETAIL_COLUMNS: [&str; 29] = [
    "GKGRECORDID",
    "DATE",
    "SourceCollectionIdentifier",
    "SourceCommonName",
    "DocumentIdentifier",
    "Counts",
    "V2Counts",
    "Themes",
    "V2Themes",
    "Locations",
    "V2Locations",
    "Persons",
    "V2Persons",
    "Organizations",
    "V2Organizations",
    "V2Tone",
    "Dates",
    "GCAM",
    "SharingImage",
    "RelatedImages",
    "SocialImageEmbeds",
    "SocialVideoEmbeds",
    "QuotedPersons",
    "QuotedPersonsCanonical",
    "Quotations",
    "AllNames",
    "Amounts",
    "TranslationInfo",
    "Extras",
];

/// Every raw column is read as text; typing happens when the retained subset is selected.
pub fn raw_text_schema(columns: &[&str]) -> SchemaRef {
    let s = Schema::from_iter(
        columns
            .iter()
            .map(|name| Field::new((*name).into(), DataType::String)),
    );
    Arc::new(s)
}

// ================================================================================================
// Derived Tables
// ================================================================================================

pub const CORRELATED_KEYS: [FeedCol; 6] = [
    FeedCol::GlobalEventId,
    FeedCol::Time,
    FeedCol::EventBaseCode,
    FeedCol::QuadClass,
    FeedCol::GoldsteinScale,
    FeedCol::ActionGeoCountryCode,
];

pub const CORRELATED_VALUES: [FeedCol; 5] = [
    FeedCol::MentionsCount,
    FeedCol::WordCount,
    FeedCol::Negative,
    FeedCol::Positive,
    FeedCol::Finance,
];

pub fn correlated_schema() -> SchemaRef {
    let s = Schema::from_iter(CORRELATED_KEYS.iter().chain(&CORRELATED_VALUES).map(|c| {
        match c {
            // Category after bucketing.
            FeedCol::EventBaseCode => Field::new(c.name(), DataType::Int64),
            other => other.field(),
        }
    }));
    Arc::new(s)
}

pub fn financial_schema() -> SchemaRef {
    let s = Schema::from_iter([FeedCol::Timestamp.field(), FeedCol::CloseToClose.field()]);
    Arc::new(s)
}

// ================================================================================================
// Feature Matrix
// ================================================================================================

/// Per-category metrics of a daily feature vector, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FeatureMetric {
    TotalMentions,
    Goldstein,
    Positive,
    Negative,
    Finance,
}

pub fn feature_column(category: u8, metric: FeatureMetric) -> String {
    format!("{category}_{metric}")
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn column_names_follow_the_feed() {
        assert_eq!(FeedCol::GlobalEventId.as_str(), "GlobalEventID");
        assert_eq!(FeedCol::ActionGeoCountryCode.as_str(), "ActionGeo_CountryCode");
        assert_eq!(FeedCol::from_str("SQLDATE").unwrap(), FeedCol::SqlDate);
    }

    #[test]
    fn retained_names_exist_in_raw_layouts() {
        for c in [
            FeedCol::GlobalEventId,
            FeedCol::SqlDate,
            FeedCol::EventBaseCode,
            FeedCol::QuadClass,
            FeedCol::GoldsteinScale,
            FeedCol::ActionGeoCountryCode,
        ] {
            assert!(EVENT_COLUMNS.contains(&c.as_str()), "{c} missing");
        }
        assert!(MENTION_COLUMNS.contains(&FeedCol::MentionTimeDate.as_str()));
        assert!(DETAIL_COLUMNS.contains(&FeedCol::Gcam.as_str()));
        assert_eq!(EVENT_COLUMNS[27], "EventBaseCode");
        assert_eq!(DETAIL_COLUMNS[17], "GCAM");
    }

    #[test]
    fn feature_columns_are_snake_case() {
        assert_eq!(
            feature_column(3, FeatureMetric::TotalMentions),
            "3_total_mentions"
        );
        assert_eq!(feature_column(20, FeatureMetric::Finance), "20_finance");
    }

    #[test]
    fn correlated_schema_types_category_as_integer() {
        let schema = correlated_schema();
        assert_eq!(schema.len(), 11);
        assert_eq!(
            schema.get(FeedCol::EventBaseCode.as_str()),
            Some(&DataType::Int64)
        );
        assert_eq!(
            schema.get(FeedCol::Time.as_str()),
            Some(&DataType::Datetime(TimeUnit::Milliseconds, None))
        );
    }
}
