use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use rankboard_core::{ChannelKind, HistoryEntry, QueryDescriptor};
use serde::{Deserialize, Serialize};

use crate::LabelCollator;

const GROUP_KEY_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayGroup {
    pub channel: ChannelKind,
    pub group_key: String,
    pub display_name: String,
    pub members: Vec<HistoryEntry>,
    pub table_hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

impl MoveDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl std::str::FromStr for MoveDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("invalid direction '{other}', expected up or down")),
        }
    }
}

/// Group key of a single descriptor. Feature pages are keyed by their title,
/// falling back to the URL; [`SeriesGrouper::group`] settles the title across
/// every entry sharing a URL first.
pub fn group_key_for(descriptor: &QueryDescriptor) -> String {
    match descriptor {
        QueryDescriptor::OrganicListing {
            brand_name,
            area_name,
            ..
        } => format!("{area_name}{GROUP_KEY_SEPARATOR}{brand_name}"),
        QueryDescriptor::FeaturePage {
            feature_page_url,
            feature_page_name,
            ..
        } => feature_page_name
            .clone()
            .unwrap_or_else(|| feature_page_url.clone()),
        QueryDescriptor::LocalMap {
            brand_name,
            search_location,
            ..
        } => format!("{search_location}{GROUP_KEY_SEPARATOR}{brand_name}"),
    }
}

/// Swaps `group_key` with its neighbour in `displayed`. Moving past either end
/// returns the sequence unchanged; an unknown key returns `None`.
pub fn move_group(
    displayed: &[String],
    group_key: &str,
    direction: MoveDirection,
) -> Option<Vec<String>> {
    let index = displayed.iter().position(|key| key == group_key)?;
    let mut order = displayed.to_vec();
    match direction {
        MoveDirection::Up if index > 0 => order.swap(index, index - 1),
        MoveDirection::Down if index + 1 < order.len() => order.swap(index, index + 1),
        _ => {}
    }
    Some(order)
}

#[derive(Debug)]
pub struct SeriesGrouper {
    collator: LabelCollator,
    exclusions: BTreeMap<String, Vec<String>>,
}

impl SeriesGrouper {
    pub fn new(collator: LabelCollator) -> Self {
        Self {
            collator,
            exclusions: BTreeMap::new(),
        }
    }

    /// Brand names to leave out of specific groups, keyed by group key.
    pub fn with_exclusions(mut self, exclusions: BTreeMap<String, Vec<String>>) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Buckets the entries of one channel into display groups, in display
    /// order. Groups named in `saved_order` come first, in that order.
    pub fn group(
        &self,
        entries: &[HistoryEntry],
        channel: ChannelKind,
        saved_order: &[String],
    ) -> Vec<DisplayGroup> {
        let mut buckets: BTreeMap<String, Vec<&HistoryEntry>> = BTreeMap::new();
        for entry in entries.iter().filter(|entry| entry.channel() == channel) {
            let bucket_key = match &entry.descriptor {
                QueryDescriptor::FeaturePage {
                    feature_page_url, ..
                } => feature_page_url.clone(),
                descriptor => group_key_for(descriptor),
            };
            buckets.entry(bucket_key).or_default().push(entry);
        }

        let mut grouped: BTreeMap<String, Vec<HistoryEntry>> = BTreeMap::new();
        for (bucket_key, members) in buckets {
            let group_key = match channel {
                ChannelKind::FeaturePage => latest_title(&members).unwrap_or(bucket_key),
                ChannelKind::OrganicListing | ChannelKind::LocalMap => bucket_key,
            };
            grouped
                .entry(group_key)
                .or_default()
                .extend(members.into_iter().cloned());
        }

        let mut groups = Vec::with_capacity(grouped.len());
        for (group_key, mut members) in grouped {
            if let Some(excluded) = self.exclusions.get(&group_key) {
                members.retain(|entry| {
                    !excluded
                        .iter()
                        .any(|brand| brand == entry.descriptor.brand_name())
                });
            }
            if members.is_empty() {
                continue;
            }
            members.sort_by(|left, right| self.compare_members(left, right));
            groups.push(DisplayGroup {
                channel,
                display_name: group_key.clone(),
                group_key,
                members,
                table_hidden: false,
            });
        }

        self.order_groups(&mut groups, saved_order);
        groups
    }

    fn order_groups(&self, groups: &mut [DisplayGroup], saved_order: &[String]) {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (position, key) in saved_order.iter().enumerate() {
            positions.entry(key.as_str()).or_insert(position);
        }

        groups.sort_by(|left, right| {
            match (
                positions.get(left.group_key.as_str()),
                positions.get(right.group_key.as_str()),
            ) {
                (Some(left), Some(right)) => left.cmp(right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => self
                    .collator
                    .compare(&left.display_name, &right.display_name)
                    .then_with(|| left.group_key.cmp(&right.group_key)),
            }
        });
    }

    // Brand-only measurements have an empty label and lead the group.
    fn compare_members(&self, left: &HistoryEntry, right: &HistoryEntry) -> Ordering {
        let left_label = left.descriptor.member_label();
        let right_label = right.descriptor.member_label();
        match (left_label.is_empty(), right_label.is_empty()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self
                .collator
                .compare(left_label, right_label)
                .then_with(|| left.entity_key.cmp(&right.entity_key)),
        }
    }
}

fn latest_title(members: &[&HistoryEntry]) -> Option<String> {
    members
        .iter()
        .filter_map(|entry| {
            entry
                .descriptor
                .feature_page_name()
                .map(|title| (entry.title_recency(), &entry.entity_key, title))
        })
        .max_by(|left, right| left.0.cmp(&right.0).then_with(|| left.1.cmp(right.1)))
        .map(|(_, _, title)| title.to_owned())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rankboard_core::{AreaCodes, Observation, Rank, resolve};

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date")
    }

    fn entry(descriptor: QueryDescriptor, days: &[u32]) -> HistoryEntry {
        HistoryEntry {
            entity_key: resolve(&descriptor).expect("resolve"),
            descriptor,
            log: days
                .iter()
                .map(|day| Observation {
                    date: date(*day),
                    rank: Rank::Position(10),
                    screenshot_ref: None,
                })
                .collect(),
            title_observed_on: None,
        }
    }

    fn organic(area: &str, brand: &str, keyword: &str) -> HistoryEntry {
        entry(
            QueryDescriptor::OrganicListing {
                brand_name: brand.to_owned(),
                area_name: area.to_owned(),
                area_codes: AreaCodes::default(),
                service_keyword: keyword.to_owned(),
            },
            &[1],
        )
    }

    fn feature(brand: &str, url: &str, title: Option<&str>, days: &[u32]) -> HistoryEntry {
        entry(
            QueryDescriptor::FeaturePage {
                brand_name: brand.to_owned(),
                feature_page_url: url.to_owned(),
                feature_page_name: title.map(str::to_owned),
            },
            days,
        )
    }

    fn grouper() -> SeriesGrouper {
        SeriesGrouper::new(LabelCollator::new("ja"))
    }

    fn keys(groups: &[DisplayGroup]) -> Vec<&str> {
        groups.iter().map(|group| group.group_key.as_str()).collect()
    }

    #[test]
    fn group_keys_follow_channel_rules() {
        let map = entry(
            QueryDescriptor::LocalMap {
                brand_name: "brand".to_owned(),
                search_location: "福山駅".to_owned(),
                keyword: "まつげパーマ".to_owned(),
            },
            &[1],
        );
        assert_eq!(group_key_for(&map.descriptor), "福山駅 - brand");
        assert_eq!(
            group_key_for(&organic("池袋", "brand", "").descriptor),
            "池袋 - brand"
        );
        assert_eq!(
            group_key_for(&feature("b", "https://x.test/1", None, &[1]).descriptor),
            "https://x.test/1"
        );
    }

    #[test]
    fn members_sort_with_brand_only_row_first() {
        let entries = vec![
            organic("池袋", "brand", "まつげパーマ"),
            organic("池袋", "brand", "アイブロウ"),
            organic("池袋", "brand", ""),
        ];

        let groups = grouper().group(&entries, ChannelKind::OrganicListing, &[]);
        assert_eq!(groups.len(), 1);
        let labels = groups[0]
            .members
            .iter()
            .map(|member| member.descriptor.member_label())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["", "アイブロウ", "まつげパーマ"]);
    }

    #[test]
    fn channels_are_grouped_separately() {
        let entries = vec![
            organic("池袋", "brand", ""),
            feature("brand", "https://x.test/1", Some("Campaign"), &[1]),
        ];
        let groups = grouper().group(&entries, ChannelKind::FeaturePage, &[]);
        assert_eq!(keys(&groups), vec!["Campaign"]);
        assert!(grouper().group(&entries, ChannelKind::LocalMap, &[]).is_empty());
    }

    #[test]
    fn feature_page_bucket_follows_latest_title() {
        let entries = vec![
            feature("brand a", "https://x.test/1", Some("Campaign A"), &[1]),
            feature("brand b", "https://x.test/1", Some("Campaign A (updated)"), &[1, 2]),
            feature("brand c", "https://x.test/1", None, &[3]),
        ];

        let groups = grouper().group(&entries, ChannelKind::FeaturePage, &[]);
        assert_eq!(keys(&groups), vec!["Campaign A (updated)"]);
        assert_eq!(groups[0].display_name, "Campaign A (updated)");
        assert_eq!(groups[0].members.len(), 3);
    }

    #[test]
    fn feature_page_name_follows_title_date_not_log_end() {
        let url = "https://example.test/f/1";
        let mut stale = feature("brand a", url, Some("Old"), &[1, 3]);
        stale.title_observed_on = Some(date(1));
        let mut fresh = feature("brand b", url, Some("New"), &[2]);
        fresh.title_observed_on = Some(date(2));

        let groups = grouper().group(&[stale, fresh], ChannelKind::FeaturePage, &[]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].display_name, "New");
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn untitled_feature_page_falls_back_to_url() {
        let entries = vec![feature("brand", "https://x.test/2", None, &[1])];
        let groups = grouper().group(&entries, ChannelKind::FeaturePage, &[]);
        assert_eq!(keys(&groups), vec!["https://x.test/2"]);
    }

    #[test]
    fn exclusions_drop_members_and_empty_groups() {
        let entries = vec![
            feature("elua 横川店", "https://x.test/1", Some("中区"), &[1]),
            feature("KATE", "https://x.test/1", Some("中区"), &[1]),
            feature("elua 緑井店", "https://x.test/2", Some("西区"), &[1]),
        ];
        let exclusions = BTreeMap::from([
            ("中区".to_owned(), vec!["elua 横川店".to_owned()]),
            ("西区".to_owned(), vec!["elua 緑井店".to_owned()]),
        ]);

        let groups = grouper()
            .with_exclusions(exclusions)
            .group(&entries, ChannelKind::FeaturePage, &[]);
        assert_eq!(keys(&groups), vec!["中区"]);
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].descriptor.brand_name(), "KATE");
    }

    #[test]
    fn saved_order_leads_and_unseen_groups_are_collated() {
        let entries = vec![
            organic("b-area", "brand", ""),
            organic("a-area", "brand", ""),
            organic("d-area", "brand", ""),
            organic("C-area", "brand", ""),
        ];
        let saved = vec![
            "d-area - brand".to_owned(),
            "gone - brand".to_owned(),
            "b-area - brand".to_owned(),
        ];

        let groups = grouper().group(&entries, ChannelKind::OrganicListing, &saved);
        assert_eq!(
            keys(&groups),
            vec![
                "d-area - brand",
                "b-area - brand",
                "a-area - brand",
                "C-area - brand"
            ]
        );
    }

    #[test]
    fn move_swaps_neighbours_and_round_trips() {
        let order = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];

        let moved = move_group(&order, "b", MoveDirection::Up).expect("known key");
        assert_eq!(moved, vec!["b", "a", "c"]);
        let back = move_group(&moved, "b", MoveDirection::Down).expect("known key");
        assert_eq!(back, order);
    }

    #[test]
    fn move_past_either_end_is_a_no_op() {
        let order = vec!["a".to_owned(), "b".to_owned()];
        assert_eq!(move_group(&order, "a", MoveDirection::Up), Some(order.clone()));
        assert_eq!(move_group(&order, "b", MoveDirection::Down), Some(order.clone()));
        assert_eq!(move_group(&order, "z", MoveDirection::Up), None);
    }

    #[test]
    fn move_direction_parses() {
        assert_eq!("up".parse::<MoveDirection>(), Ok(MoveDirection::Up));
        assert!("left".parse::<MoveDirection>().is_err());
    }
}
