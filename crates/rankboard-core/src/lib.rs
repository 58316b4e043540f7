use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod descriptor;
mod identity;

pub use descriptor::{AreaCodes, QueryDescriptor};
pub use identity::{EntityKey, IdentityError, resolve};

/// Numeric stand-in for "not found" when two ranks are compared.
pub const OUT_OF_RANGE_POSITION: u32 = 101;
pub const OUT_OF_RANGE_LABEL: &str = "out_of_range";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    OrganicListing,
    FeaturePage,
    LocalMap,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrganicListing => "organic_listing",
            Self::FeaturePage => "feature_page",
            Self::LocalMap => "local_map",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "organic_listing" | "organic" => Ok(Self::OrganicListing),
            "feature_page" | "feature" => Ok(Self::FeaturePage),
            "local_map" | "map" => Ok(Self::LocalMap),
            other => Err(format!(
                "invalid channel '{other}', expected one of: organic_listing, feature_page, local_map"
            )),
        }
    }
}

/// A search position, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RankRepr", into = "RankRepr")]
pub enum Rank {
    Position(u32),
    OutOfRange,
    /// Marker carried over from older data, such as a recorded scrape error.
    /// New measurements never produce it.
    Unrecognized(String),
}

impl Rank {
    pub fn position(value: u32) -> Option<Self> {
        (value >= 1).then_some(Self::Position(value))
    }

    /// Position used for period-over-period comparison; `None` when the rank
    /// carries no usable number.
    pub fn comparable_position(&self) -> Option<u32> {
        match self {
            Self::Position(value) => Some(*value),
            Self::OutOfRange => Some(OUT_OF_RANGE_POSITION),
            Self::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(value) => write!(f, "{value}"),
            Self::OutOfRange => f.write_str(OUT_OF_RANGE_LABEL),
            Self::Unrecognized(marker) => f.write_str(marker),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RankRepr {
    Number(i64),
    Text(String),
}

impl TryFrom<RankRepr> for Rank {
    type Error = String;

    fn try_from(value: RankRepr) -> Result<Self, Self::Error> {
        match value {
            RankRepr::Number(number) => u32::try_from(number)
                .ok()
                .and_then(Rank::position)
                .ok_or_else(|| format!("rank must be a positive integer, got {number}")),
            RankRepr::Text(text) if text == OUT_OF_RANGE_LABEL => Ok(Rank::OutOfRange),
            RankRepr::Text(text) => Ok(Rank::Unrecognized(text)),
        }
    }
}

impl From<Rank> for RankRepr {
    fn from(value: Rank) -> Self {
        match value {
            Rank::Position(position) => RankRepr::Number(i64::from(position)),
            Rank::OutOfRange => RankRepr::Text(OUT_OF_RANGE_LABEL.to_owned()),
            Rank::Unrecognized(marker) => RankRepr::Text(marker),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub rank: Rank,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
}

/// An observation bound to the entity it was measured for. Construction
/// resolves the key, so an unresolvable descriptor never gets this far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationRecord {
    pub entity_key: EntityKey,
    pub descriptor: QueryDescriptor,
    pub observation: Observation,
}

impl ObservationRecord {
    pub fn new(
        descriptor: &QueryDescriptor,
        observation: Observation,
    ) -> Result<Self, IdentityError> {
        let descriptor = descriptor.normalized();
        let entity_key = resolve(&descriptor)?;
        Ok(Self {
            entity_key,
            descriptor,
            observation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entity_key: EntityKey,
    pub descriptor: QueryDescriptor,
    pub log: Vec<Observation>,
    /// Date of the observation that carried the current feature page title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_observed_on: Option<NaiveDate>,
}

impl HistoryEntry {
    pub fn channel(&self) -> ChannelKind {
        self.descriptor.channel()
    }

    pub fn observation_on(&self, date: NaiveDate) -> Option<&Observation> {
        self.log
            .binary_search_by(|observation| observation.date.cmp(&date))
            .ok()
            .map(|index| &self.log[index])
    }

    pub fn last_observed(&self) -> Option<NaiveDate> {
        self.log.last().map(|observation| observation.date)
    }

    /// When the current title was seen. Entries written before title dates
    /// were tracked fall back to their latest observation.
    pub fn title_recency(&self) -> Option<NaiveDate> {
        self.descriptor
            .feature_page_name()
            .and(self.title_observed_on.or_else(|| self.last_observed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_json_uses_numbers_and_labels() {
        let ranks = vec![
            Rank::Position(12),
            Rank::OutOfRange,
            Rank::Unrecognized("error".to_owned()),
        ];
        let json = serde_json::to_string(&ranks).expect("serialize ranks");
        assert_eq!(json, r#"[12,"out_of_range","error"]"#);

        let parsed: Vec<Rank> = serde_json::from_str(&json).expect("parse ranks");
        assert_eq!(parsed, ranks);
    }

    #[test]
    fn rank_rejects_non_positive_numbers() {
        assert!(serde_json::from_str::<Rank>("0").is_err());
        assert!(serde_json::from_str::<Rank>("-3").is_err());
        assert_eq!(Rank::position(0), None);
    }

    #[test]
    fn comparable_position_maps_out_of_range_to_sentinel() {
        assert_eq!(Rank::Position(7).comparable_position(), Some(7));
        assert_eq!(
            Rank::OutOfRange.comparable_position(),
            Some(OUT_OF_RANGE_POSITION)
        );
        assert_eq!(
            Rank::Unrecognized("skip".to_owned()).comparable_position(),
            None
        );
    }

    #[test]
    fn channel_kind_parses_short_and_long_names() {
        assert_eq!(
            "map".parse::<ChannelKind>().expect("short name"),
            ChannelKind::LocalMap
        );
        assert_eq!(
            "feature_page".parse::<ChannelKind>().expect("long name"),
            ChannelKind::FeaturePage
        );
        assert!("seo".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn observation_record_normalizes_before_resolving() {
        let descriptor = QueryDescriptor::FeaturePage {
            brand_name: " brand ".to_owned(),
            feature_page_url: "https://example.test/f/1 ".to_owned(),
            feature_page_name: Some(" ".to_owned()),
        };
        let observation = Observation {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            rank: Rank::Position(3),
            screenshot_ref: None,
        };

        let record = ObservationRecord::new(&descriptor, observation).expect("record");
        assert_eq!(record.descriptor.brand_name(), "brand");
        assert_eq!(record.descriptor.feature_page_name(), None);
        assert_eq!(record.entity_key.as_str(), "brand|https://example.test/f/1");
    }
}
