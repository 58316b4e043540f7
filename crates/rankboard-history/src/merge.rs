use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::NaiveDate;
use rankboard_core::{EntityKey, HistoryEntry, Observation, ObservationRecord, Rank, resolve};

use crate::HistoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    KeptExisting,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::KeptExisting => "kept_existing",
        }
    }
}

/// Same-date conflict rule: a numeric rank beats anything non-numeric, the
/// lower of two numeric ranks wins, and every tie keeps what is already there.
pub fn prefer_incoming(existing: &Rank, incoming: &Rank) -> bool {
    match (existing, incoming) {
        (Rank::Position(current), Rank::Position(candidate)) => candidate < current,
        (_, Rank::Position(_)) => true,
        _ => false,
    }
}

/// Folds one observation into a date-sorted log in place.
pub fn merge_into(log: &mut Vec<Observation>, observation: Observation) -> MergeOutcome {
    match log.binary_search_by(|existing| existing.date.cmp(&observation.date)) {
        Ok(index) => {
            if prefer_incoming(&log[index].rank, &observation.rank) {
                log[index] = observation;
                MergeOutcome::Replaced
            } else {
                MergeOutcome::KeptExisting
            }
        }
        Err(index) => {
            log.insert(index, observation);
            MergeOutcome::Inserted
        }
    }
}

pub fn merge(existing_log: &[Observation], observation: Observation) -> Vec<Observation> {
    let mut log = existing_log.to_vec();
    merge_into(&mut log, observation);
    log
}

/// Folds a batch of resolved observations into the collection. Entries come
/// back ordered by entity key.
pub fn merge_all(
    existing: Vec<HistoryEntry>,
    records: impl IntoIterator<Item = ObservationRecord>,
) -> Vec<HistoryEntry> {
    let mut index: BTreeMap<EntityKey, HistoryEntry> = BTreeMap::new();
    for entry in existing {
        absorb_entry(&mut index, entry);
    }
    for record in records {
        apply_record(&mut index, record);
    }
    index.into_values().collect()
}

pub(crate) fn apply_record(
    index: &mut BTreeMap<EntityKey, HistoryEntry>,
    record: ObservationRecord,
) -> MergeOutcome {
    let ObservationRecord {
        entity_key,
        descriptor,
        observation,
    } = record;

    match index.entry(entity_key) {
        Entry::Vacant(slot) => {
            tracing::debug!(entity_key = %slot.key(), date = %observation.date, "new history entry");
            let entity_key = slot.key().clone();
            let title_observed_on = descriptor.feature_page_name().map(|_| observation.date);
            slot.insert(HistoryEntry {
                entity_key,
                descriptor,
                log: vec![observation],
                title_observed_on,
            });
            MergeOutcome::Inserted
        }
        Entry::Occupied(mut slot) => {
            let entry = slot.get_mut();
            refresh_descriptor(entry, descriptor.feature_page_name(), observation.date);
            let date = observation.date;
            let outcome = merge_into(&mut entry.log, observation);
            tracing::debug!(
                entity_key = %entry.entity_key,
                %date,
                outcome = outcome.as_str(),
                "merged observation"
            );
            outcome
        }
    }
}

fn absorb_entry(index: &mut BTreeMap<EntityKey, HistoryEntry>, entry: HistoryEntry) {
    match index.entry(entry.entity_key.clone()) {
        Entry::Vacant(slot) => {
            let mut entry = entry;
            let mut log = Vec::with_capacity(entry.log.len());
            for observation in std::mem::take(&mut entry.log) {
                merge_into(&mut log, observation);
            }
            entry.log = log;
            slot.insert(entry);
        }
        Entry::Occupied(mut slot) => {
            let existing = slot.get_mut();
            for observation in entry.log {
                merge_into(&mut existing.log, observation);
            }
        }
    }
}

// A feature page title seen on or after the stored title's date replaces it;
// a backfilled older title only fills a gap.
fn refresh_descriptor(entry: &mut HistoryEntry, title: Option<&str>, date: NaiveDate) {
    let Some(title) = title else {
        return;
    };
    let is_newest = entry.title_recency().is_none_or(|seen| date >= seen);
    if is_newest || entry.descriptor.feature_page_name().is_none() {
        entry.descriptor = entry.descriptor.with_feature_page_name(Some(title));
        entry.title_observed_on = Some(date);
    }
}

/// Moves every observation of `source` onto `target` and drops `source`.
/// Nothing changes unless the whole relabel succeeds.
pub fn reconcile(
    entries: &[HistoryEntry],
    source: &EntityKey,
    target: &EntityKey,
) -> Result<Vec<HistoryEntry>, HistoryError> {
    if source == target {
        return Err(HistoryError::InvalidInput(format!(
            "cannot reconcile '{source}' onto itself"
        )));
    }

    let source_entry = find_entry(entries, source)?;
    let target_entry = find_entry(entries, target)?;

    if source_entry.channel() != target_entry.channel() {
        return Err(HistoryError::AmbiguousReconciliation(format!(
            "'{source}' is a {} entry but '{target}' is a {} entry",
            source_entry.channel(),
            target_entry.channel()
        )));
    }

    for observation in &source_entry.log {
        let Some(existing) = target_entry.observation_on(observation.date) else {
            continue;
        };
        if existing.rank == observation.rank
            && let (Some(left), Some(right)) = (&existing.screenshot_ref, &observation.screenshot_ref)
            && left != right
        {
            return Err(HistoryError::AmbiguousReconciliation(format!(
                "'{source}' and '{target}' both rank {} on {} with different screenshots",
                observation.rank, observation.date
            )));
        }
    }

    let mut merged = target_entry.clone();
    for observation in &source_entry.log {
        merge_into(&mut merged.log, observation.clone());
    }
    if source_entry.title_recency() > target_entry.title_recency() {
        merged.descriptor = merged
            .descriptor
            .with_feature_page_name(source_entry.descriptor.feature_page_name());
        merged.title_observed_on = source_entry.title_recency();
    }

    tracing::info!(
        source = %source,
        target = %target,
        moved = source_entry.log.len(),
        merged_len = merged.log.len(),
        "reconciled history entries"
    );

    let mut merged = Some(merged);
    let mut result = Vec::with_capacity(entries.len() - 1);
    for entry in entries {
        if entry.entity_key == *source {
            continue;
        }
        if entry.entity_key == *target
            && let Some(merged) = merged.take()
        {
            result.push(merged);
            continue;
        }
        result.push(entry.clone());
    }
    Ok(result)
}

/// Relabels the brand of `source`. If the renamed entity already exists the
/// two are reconciled, otherwise the entry is re-keyed in place. Returns the
/// updated collection and the key the history now lives under.
pub fn rename_brand(
    entries: &[HistoryEntry],
    source: &EntityKey,
    new_brand: &str,
) -> Result<(Vec<HistoryEntry>, EntityKey), HistoryError> {
    let source_entry = find_entry(entries, source)?;
    let renamed = source_entry.descriptor.with_brand_name(new_brand.trim());
    let new_key = resolve(&renamed)?;

    if new_key == *source {
        return Err(HistoryError::InvalidInput(format!(
            "'{source}' already uses brand name '{}'",
            new_brand.trim()
        )));
    }

    if entries.iter().any(|entry| entry.entity_key == new_key) {
        let merged = reconcile(entries, source, &new_key)?;
        return Ok((merged, new_key));
    }

    tracing::info!(source = %source, target = %new_key, "re-keyed history entry");
    let updated = entries
        .iter()
        .map(|entry| {
            if entry.entity_key == *source {
                HistoryEntry {
                    entity_key: new_key.clone(),
                    descriptor: renamed.clone(),
                    log: entry.log.clone(),
                    title_observed_on: entry.title_observed_on,
                }
            } else {
                entry.clone()
            }
        })
        .collect();
    Ok((updated, new_key))
}

fn find_entry<'a>(
    entries: &'a [HistoryEntry],
    key: &EntityKey,
) -> Result<&'a HistoryEntry, HistoryError> {
    entries
        .iter()
        .find(|entry| entry.entity_key == *key)
        .ok_or_else(|| HistoryError::UnknownEntity(key.to_string()))
}
