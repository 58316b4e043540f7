use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ChannelKind, QueryDescriptor};

const FIELD_SEPARATOR: char = '|';
const ESCAPE: char = '\\';
const LOCAL_MAP_TAG: &str = "[local_map]";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("{channel} descriptor is missing required field '{field}'")]
    MissingIdentityField {
        channel: ChannelKind,
        field: &'static str,
    },
    #[error("entity key must not be empty")]
    EmptyKey,
}

/// Stable identity of one tracked (channel, locator, brand) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    /// Wraps a key that was produced by [`resolve`] earlier, e.g. one read back
    /// from storage or typed by an operator.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        if raw.trim().is_empty() {
            return Err(IdentityError::EmptyKey);
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn resolve(descriptor: &QueryDescriptor) -> Result<EntityKey, IdentityError> {
    let channel = descriptor.channel();
    let key = match descriptor {
        QueryDescriptor::OrganicListing {
            brand_name,
            area_name,
            service_keyword,
            ..
        } => join_fields(&[
            required(channel, "brand_name", brand_name)?,
            required(channel, "area_name", area_name)?,
            service_keyword,
        ]),
        QueryDescriptor::FeaturePage {
            brand_name,
            feature_page_url,
            ..
        } => join_fields(&[
            required(channel, "brand_name", brand_name)?,
            required(channel, "feature_page_url", feature_page_url)?,
        ]),
        QueryDescriptor::LocalMap {
            brand_name,
            search_location,
            keyword,
        } => join_fields(&[
            LOCAL_MAP_TAG,
            required(channel, "brand_name", brand_name)?,
            required(channel, "search_location", search_location)?,
            required(channel, "keyword", keyword)?,
        ]),
    };

    Ok(EntityKey(key))
}

fn required<'a>(
    channel: ChannelKind,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, IdentityError> {
    if value.trim().is_empty() {
        return Err(IdentityError::MissingIdentityField { channel, field });
    }
    Ok(value)
}

// Escaping keeps the join injective: a separator inside a field can never be
// mistaken for a field boundary, so the field count also tells channels apart.
fn join_fields(fields: &[&str]) -> String {
    let mut out = String::new();
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push(FIELD_SEPARATOR);
        }
        for ch in field.chars() {
            if ch == FIELD_SEPARATOR || ch == ESCAPE {
                out.push(ESCAPE);
            }
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AreaCodes;

    fn organic(brand: &str, area: &str, keyword: &str) -> QueryDescriptor {
        QueryDescriptor::OrganicListing {
            brand_name: brand.to_owned(),
            area_name: area.to_owned(),
            area_codes: AreaCodes::default(),
            service_keyword: keyword.to_owned(),
        }
    }

    #[test]
    fn equal_descriptors_resolve_to_equal_keys() {
        let left = organic("KATE stage LASH", "西口・北口・目白", "まつげパーマ");
        let right = organic("KATE stage LASH", "西口・北口・目白", "まつげパーマ");
        assert_eq!(
            resolve(&left).expect("resolve left"),
            resolve(&right).expect("resolve right")
        );
    }

    #[test]
    fn area_codes_do_not_change_identity() {
        let plain = organic("brand", "福岡", "");
        let QueryDescriptor::OrganicListing {
            brand_name,
            area_name,
            service_keyword,
            ..
        } = plain.clone()
        else {
            unreachable!("organic fixture");
        };
        let with_codes = QueryDescriptor::OrganicListing {
            brand_name,
            area_name,
            area_codes: AreaCodes {
                service_area: "SJ".to_owned(),
                middle_area: Some("GA".to_owned()),
                small_area: None,
            },
            service_keyword,
        };

        assert_eq!(
            resolve(&plain).expect("resolve plain"),
            resolve(&with_codes).expect("resolve with codes")
        );
    }

    #[test]
    fn separators_inside_fields_do_not_collide() {
        let first = organic("a|b", "c", "d");
        let second = organic("a", "b|c", "d");
        assert_ne!(
            resolve(&first).expect("resolve first"),
            resolve(&second).expect("resolve second")
        );

        let escaped = organic("a\\", "b", "");
        let plain = organic("a", "\\b", "");
        assert_ne!(
            resolve(&escaped).expect("resolve escaped"),
            resolve(&plain).expect("resolve plain")
        );
    }

    #[test]
    fn channels_never_share_keys() {
        let feature = QueryDescriptor::FeaturePage {
            brand_name: "brand".to_owned(),
            feature_page_url: "area".to_owned(),
            feature_page_name: None,
        };
        let organic = organic("brand", "area", "");
        let map = QueryDescriptor::LocalMap {
            brand_name: "brand".to_owned(),
            search_location: "area".to_owned(),
            keyword: "kw".to_owned(),
        };

        let keys = [
            resolve(&feature).expect("feature"),
            resolve(&organic).expect("organic"),
            resolve(&map).expect("map"),
        ];
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
        assert_ne!(keys[0], keys[2]);
    }

    #[test]
    fn empty_service_keyword_is_a_distinct_entity() {
        let brand_only = resolve(&organic("brand", "area", "")).expect("brand only");
        let with_keyword = resolve(&organic("brand", "area", "kw")).expect("keyword");
        assert_ne!(brand_only, with_keyword);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = resolve(&organic("  ", "area", "kw")).expect_err("blank brand");
        assert_eq!(
            err,
            IdentityError::MissingIdentityField {
                channel: ChannelKind::OrganicListing,
                field: "brand_name",
            }
        );

        let map = QueryDescriptor::LocalMap {
            brand_name: "brand".to_owned(),
            search_location: "福山駅".to_owned(),
            keyword: String::new(),
        };
        assert!(matches!(
            resolve(&map),
            Err(IdentityError::MissingIdentityField {
                field: "keyword",
                ..
            })
        ));
    }

    #[test]
    fn feature_page_title_is_not_part_of_identity() {
        let untitled = QueryDescriptor::FeaturePage {
            brand_name: "brand".to_owned(),
            feature_page_url: "https://example.test/f/1".to_owned(),
            feature_page_name: None,
        };
        let titled = untitled.with_feature_page_name(Some("Campaign A"));
        assert_eq!(
            resolve(&untitled).expect("untitled"),
            resolve(&titled).expect("titled")
        );
    }
}
