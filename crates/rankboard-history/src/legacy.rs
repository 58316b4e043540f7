use chrono::NaiveDate;
use rankboard_core::{AreaCodes, Observation, ObservationRecord, QueryDescriptor, Rank, resolve};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::HistoryError;

const LEGACY_OUT_OF_RANGE: &str = "圏外";
const LEGACY_DATE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%Y-%m-%d"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTask {
    pub id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub tasks_read: usize,
    pub observations_read: usize,
    pub observations_imported: usize,
    pub skipped_observations: usize,
    pub skipped_tasks: Vec<SkippedTask>,
    /// Entities in the collection after the import was merged in.
    pub entities_after_import: usize,
}

#[derive(Debug, Deserialize)]
struct LegacyEntry {
    #[serde(default)]
    id: Option<Value>,
    task: LegacyTask,
    #[serde(default)]
    log: Vec<LegacyLogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTask {
    #[serde(rename = "type")]
    kind: Option<String>,
    salon_name: Option<String>,
    area_name: Option<String>,
    area_codes: Option<Value>,
    service_keyword: Option<String>,
    feature_page_url: Option<String>,
    feature_page_name: Option<String>,
    search_location: Option<String>,
    keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyLogEntry {
    date: String,
    #[serde(default)]
    rank: Value,
    #[serde(default)]
    screenshot: Option<String>,
}

/// Reads a legacy JSON history file into resolved records. Rows that cannot be
/// attributed to an entity are counted in the report and left out.
pub fn parse_legacy_history(
    raw: &str,
) -> Result<(Vec<ObservationRecord>, ImportReport), HistoryError> {
    let entries: Vec<LegacyEntry> = serde_json::from_str(raw)?;
    let mut report = ImportReport {
        tasks_read: entries.len(),
        ..ImportReport::default()
    };
    let mut records = Vec::new();

    for entry in entries {
        report.observations_read += entry.log.len();
        let id = entry.id.as_ref().map(value_label);

        let descriptor = legacy_descriptor(&entry.task).and_then(|descriptor| {
            resolve(&descriptor.normalized())
                .map(|_| descriptor)
                .map_err(|err| err.to_string())
        });
        let descriptor = match descriptor {
            Ok(descriptor) => descriptor,
            Err(reason) => {
                tracing::warn!(id = ?id, %reason, "skipping legacy task");
                report.skipped_observations += entry.log.len();
                report.skipped_tasks.push(SkippedTask { id, reason });
                continue;
            }
        };

        for row in entry.log {
            let Some(observation) = legacy_observation(&row) else {
                tracing::warn!(id = ?id, date = %row.date, rank = %row.rank, "skipping legacy log row");
                report.skipped_observations += 1;
                continue;
            };
            match ObservationRecord::new(&descriptor, observation) {
                Ok(record) => {
                    records.push(record);
                    report.observations_imported += 1;
                }
                Err(err) => {
                    tracing::warn!(id = ?id, error = %err, "skipping legacy log row");
                    report.skipped_observations += 1;
                }
            }
        }
    }

    Ok((records, report))
}

fn legacy_descriptor(task: &LegacyTask) -> Result<QueryDescriptor, String> {
    let brand_name = text(&task.salon_name);
    match task.kind.as_deref().unwrap_or("normal") {
        "normal" => Ok(QueryDescriptor::OrganicListing {
            brand_name,
            area_name: text(&task.area_name),
            area_codes: task
                .area_codes
                .as_ref()
                .map(legacy_area_codes)
                .unwrap_or_default(),
            service_keyword: text(&task.service_keyword),
        }),
        "special" => Ok(QueryDescriptor::FeaturePage {
            brand_name,
            feature_page_url: text(&task.feature_page_url),
            feature_page_name: task.feature_page_name.clone(),
        }),
        "google" => Ok(QueryDescriptor::LocalMap {
            brand_name,
            search_location: text(&task.search_location),
            keyword: text(&task.keyword),
        }),
        other => Err(format!("unsupported task type '{other}'")),
    }
}

// Area codes were stored either as an object or as its JSON text.
fn legacy_area_codes(value: &Value) -> AreaCodes {
    let parsed;
    let object = match value {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).unwrap_or(Value::Null);
            &parsed
        }
        other => other,
    };
    let code = |field: &str| {
        object
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .filter(|code| !code.trim().is_empty())
    };
    AreaCodes {
        service_area: code("serviceAreaCd").unwrap_or_default(),
        middle_area: code("middleAreaCd"),
        small_area: code("smallAreaCd"),
    }
}

fn legacy_observation(row: &LegacyLogEntry) -> Option<Observation> {
    let date = LEGACY_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(row.date.trim(), format).ok())?;
    Some(Observation {
        date,
        rank: legacy_rank(&row.rank)?,
        screenshot_ref: row
            .screenshot
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_owned),
    })
}

fn legacy_rank(value: &Value) -> Option<Rank> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .and_then(|position| u32::try_from(position).ok())
            .and_then(Rank::position),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else if text == LEGACY_OUT_OF_RANGE {
                Some(Rank::OutOfRange)
            } else if let Ok(position) = text.parse::<u32>() {
                Rank::position(position)
            } else {
                Some(Rank::Unrecognized(text.to_owned()))
            }
        }
        _ => None,
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
