use chrono::NaiveDate;
use rankboard_core::{EntityKey, Rank};
use serde::Serialize;

use crate::chart::group_dates;
use crate::{Delta, DisplayGroup, classify};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaCell {
    pub date: NaiveDate,
    pub rank: Option<Rank>,
    pub delta: Option<Delta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaRow {
    pub entity_key: EntityKey,
    pub label: String,
    pub cells: Vec<DeltaCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaTable {
    pub group_key: String,
    pub display_name: String,
    pub hidden: bool,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<DeltaRow>,
}

/// Rank table for a group. Each cell is compared with the same member's rank
/// in the previous column, so a member missing that column gets no delta.
pub fn delta_table(group: &DisplayGroup) -> DeltaTable {
    let dates = group_dates(&group.members);
    let rows = group
        .members
        .iter()
        .map(|member| {
            let mut previous: Option<&Rank> = None;
            let cells = dates
                .iter()
                .map(|date| {
                    let observation = member.observation_on(*date);
                    let rank = observation.map(|observation| &observation.rank);
                    let cell = DeltaCell {
                        date: *date,
                        rank: rank.cloned(),
                        delta: classify(previous, rank),
                        screenshot_ref: observation
                            .and_then(|observation| observation.screenshot_ref.clone()),
                    };
                    previous = rank;
                    cell
                })
                .collect();
            DeltaRow {
                entity_key: member.entity_key.clone(),
                label: member.descriptor.member_label().to_owned(),
                cells,
            }
        })
        .collect();

    DeltaTable {
        group_key: group.group_key.clone(),
        display_name: group.display_name.clone(),
        hidden: group.table_hidden,
        dates,
        rows,
    }
}
