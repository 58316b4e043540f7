use std::collections::BTreeSet;

use chrono::NaiveDate;
use rankboard_core::{EntityKey, HistoryEntry, Rank};
use serde::Serialize;

use crate::{DisplayGroup, to_score};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub rank: Option<Rank>,
    /// `None` for a gap: no observation that day, or an unplottable marker.
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartLine {
    pub entity_key: EntityKey,
    pub label: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub group_key: String,
    pub display_name: String,
    pub dates: Vec<NaiveDate>,
    pub lines: Vec<ChartLine>,
}

/// One line per group member over the union of the members' dates.
pub fn chart_series(group: &DisplayGroup) -> ChartSeries {
    let dates = group_dates(&group.members);
    let lines = group
        .members
        .iter()
        .map(|member| ChartLine {
            entity_key: member.entity_key.clone(),
            label: member.descriptor.member_label().to_owned(),
            points: dates
                .iter()
                .map(|date| match member.observation_on(*date) {
                    Some(observation) => ChartPoint {
                        date: *date,
                        rank: Some(observation.rank.clone()),
                        score: Some(to_score(&observation.rank)).filter(|score| !score.is_nan()),
                        screenshot_ref: observation.screenshot_ref.clone(),
                    },
                    None => ChartPoint {
                        date: *date,
                        rank: None,
                        score: None,
                        screenshot_ref: None,
                    },
                })
                .collect(),
        })
        .collect();

    ChartSeries {
        group_key: group.group_key.clone(),
        display_name: group.display_name.clone(),
        dates,
        lines,
    }
}

pub(crate) fn group_dates(members: &[HistoryEntry]) -> Vec<NaiveDate> {
    members
        .iter()
        .flat_map(|member| member.log.iter().map(|observation| observation.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use rankboard_core::{AreaCodes, ChannelKind, Observation, QueryDescriptor, resolve};

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date")
    }

    fn member(keyword: &str, log: &[(u32, Rank)]) -> HistoryEntry {
        let descriptor = QueryDescriptor::OrganicListing {
            brand_name: "brand".to_owned(),
            area_name: "池袋".to_owned(),
            area_codes: AreaCodes::default(),
            service_keyword: keyword.to_owned(),
        };
        HistoryEntry {
            entity_key: resolve(&descriptor).expect("resolve"),
            descriptor,
            log: log
                .iter()
                .map(|(day, rank)| Observation {
                    date: date(*day),
                    rank: rank.clone(),
                    screenshot_ref: None,
                })
                .collect(),
            title_observed_on: None,
        }
    }

    fn group(members: Vec<HistoryEntry>) -> DisplayGroup {
        DisplayGroup {
            channel: ChannelKind::OrganicListing,
            group_key: "池袋 - brand".to_owned(),
            display_name: "池袋 - brand".to_owned(),
            members,
            table_hidden: false,
        }
    }

    #[test]
    fn series_spans_union_of_member_dates() {
        let series = chart_series(&group(vec![
            member("", &[(1, Rank::Position(12)), (3, Rank::Position(8))]),
            member("まつげ", &[(2, Rank::OutOfRange)]),
        ]));

        assert_eq!(series.dates, vec![date(1), date(2), date(3)]);
        assert_eq!(series.lines.len(), 2);

        let first = &series.lines[0];
        assert_eq!(first.label, "");
        assert_eq!(first.points[1].rank, None);
        assert_eq!(first.points[1].score, None);
        assert_eq!(first.points[2].rank, Some(Rank::Position(8)));

        let second = &series.lines[1];
        assert_eq!(second.points[1].score, Some(1.5));
    }

    #[test]
    fn unrecognized_marker_plots_as_gap_but_keeps_rank() {
        let series = chart_series(&group(vec![member(
            "",
            &[(1, Rank::Unrecognized("エラー".to_owned()))],
        )]));

        let point = &series.lines[0].points[0];
        assert_eq!(point.rank, Some(Rank::Unrecognized("エラー".to_owned())));
        assert_eq!(point.score, None);

        let json = serde_json::to_value(&series).expect("serialize series");
        assert!(json["lines"][0]["points"][0]["score"].is_null());
    }
}
