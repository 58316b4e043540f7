use serde::{Deserialize, Serialize};

use crate::ChannelKind;

const STATION_SUFFIX: &str = "駅";
const CITY_SUFFIX: &str = "市";

/// Area codes the listing site expects when walking a search. They never take
/// part in identity: two tasks for the same area name are the same entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaCodes {
    pub service_area: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_area: Option<String>,
}

/// What a single rank measurement was taken for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum QueryDescriptor {
    OrganicListing {
        brand_name: String,
        area_name: String,
        #[serde(default)]
        area_codes: AreaCodes,
        #[serde(default)]
        service_keyword: String,
    },
    FeaturePage {
        brand_name: String,
        feature_page_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feature_page_name: Option<String>,
    },
    LocalMap {
        brand_name: String,
        search_location: String,
        keyword: String,
    },
}

impl QueryDescriptor {
    pub fn channel(&self) -> ChannelKind {
        match self {
            Self::OrganicListing { .. } => ChannelKind::OrganicListing,
            Self::FeaturePage { .. } => ChannelKind::FeaturePage,
            Self::LocalMap { .. } => ChannelKind::LocalMap,
        }
    }

    pub fn brand_name(&self) -> &str {
        match self {
            Self::OrganicListing { brand_name, .. }
            | Self::FeaturePage { brand_name, .. }
            | Self::LocalMap { brand_name, .. } => brand_name,
        }
    }

    pub fn feature_page_name(&self) -> Option<&str> {
        match self {
            Self::FeaturePage {
                feature_page_name, ..
            } => feature_page_name.as_deref(),
            Self::OrganicListing { .. } | Self::LocalMap { .. } => None,
        }
    }

    /// Label of this descriptor inside its display group: the keyword for
    /// keyword-driven channels, the brand for feature pages.
    pub fn member_label(&self) -> &str {
        match self {
            Self::OrganicListing {
                service_keyword, ..
            } => service_keyword,
            Self::FeaturePage { brand_name, .. } => brand_name,
            Self::LocalMap { keyword, .. } => keyword,
        }
    }

    pub fn with_brand_name(&self, brand: &str) -> Self {
        let mut next = self.clone();
        match &mut next {
            Self::OrganicListing { brand_name, .. }
            | Self::FeaturePage { brand_name, .. }
            | Self::LocalMap { brand_name, .. } => *brand_name = brand.to_owned(),
        }
        next
    }

    /// Returns a copy with a newer feature page title applied. Titles are only
    /// ever replaced by a non-empty value, never cleared.
    pub fn with_feature_page_name(&self, title: Option<&str>) -> Self {
        let mut next = self.clone();
        if let Self::FeaturePage {
            feature_page_name, ..
        } = &mut next
            && let Some(title) = normalize_optional(title)
        {
            *feature_page_name = Some(title);
        }
        next
    }

    /// Trims every field and strips a map keyword that repeats its own search
    /// location, e.g. location `渋谷駅` with keyword `渋谷 まつげパーマ`.
    pub fn normalized(&self) -> Self {
        match self {
            Self::OrganicListing {
                brand_name,
                area_name,
                area_codes,
                service_keyword,
            } => Self::OrganicListing {
                brand_name: brand_name.trim().to_owned(),
                area_name: area_name.trim().to_owned(),
                area_codes: AreaCodes {
                    service_area: area_codes.service_area.trim().to_owned(),
                    middle_area: normalize_optional(area_codes.middle_area.as_deref()),
                    small_area: normalize_optional(area_codes.small_area.as_deref()),
                },
                service_keyword: service_keyword.trim().to_owned(),
            },
            Self::FeaturePage {
                brand_name,
                feature_page_url,
                feature_page_name,
            } => Self::FeaturePage {
                brand_name: brand_name.trim().to_owned(),
                feature_page_url: feature_page_url.trim().to_owned(),
                feature_page_name: normalize_optional(feature_page_name.as_deref()),
            },
            Self::LocalMap {
                brand_name,
                search_location,
                keyword,
            } => {
                let search_location = search_location.trim().to_owned();
                let keyword = strip_location_prefix(&search_location, keyword.trim());
                Self::LocalMap {
                    brand_name: brand_name.trim().to_owned(),
                    search_location,
                    keyword,
                }
            }
        }
    }
}

fn strip_location_prefix(search_location: &str, keyword: &str) -> String {
    let base = search_location
        .strip_suffix(STATION_SUFFIX)
        .or_else(|| search_location.strip_suffix(CITY_SUFFIX))
        .unwrap_or(search_location)
        .trim();

    if base.is_empty() {
        return keyword.to_owned();
    }

    match keyword.strip_prefix(base) {
        Some(rest) if !rest.trim().is_empty() => rest.trim().to_owned(),
        _ => keyword.to_owned(),
    }
}

fn normalize_optional(input: Option<&str>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
