use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use rankboard_config::{RankboardConfig, load_workspace_config};
use rankboard_core::{
    ChannelKind, EntityKey, HistoryEntry, ObservationRecord, QueryDescriptor, resolve,
};
use rankboard_store::{SqliteStore, Store};

use crate::{
    ChartSeries, DeltaTable, DisplayGroup, HistoryError, ImportReport, LabelCollator,
    Measurement, MoveDirection, RankProbe, SeriesGrouper, TaskOutcome, TaskStatus, chart_series,
    delta_table, merge, merge_all, parse_legacy_history,
};

const HIDDEN_TABLES_PREFERENCE: &str = "hidden_tables";

/// Entry point for everything that reads or rewrites rank history. Each write
/// runs its full load, merge and save cycle inside one exclusive store
/// transaction, so writers in other services or processes queue behind it.
pub struct RankHistoryService<S = SqliteStore> {
    store: S,
    config: RankboardConfig,
}

impl RankHistoryService<SqliteStore> {
    pub fn open(workspace: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let workspace = workspace.as_ref();
        let config = load_workspace_config(workspace)?;
        let store = SqliteStore::open(workspace, &config)?;
        Ok(Self::with_store(store, config))
    }
}

impl<S: Store> RankHistoryService<S> {
    pub fn with_store(store: S, config: RankboardConfig) -> Self {
        Self { store, config }
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self.store.load_history()?)
    }

    /// Records one measurement. A feature page's title, when the backend
    /// reports one, becomes the entity's name.
    pub fn record(
        &self,
        descriptor: &QueryDescriptor,
        date: NaiveDate,
        measurement: Measurement,
    ) -> Result<HistoryEntry, HistoryError> {
        let descriptor = descriptor.with_feature_page_name(measurement.page_title.as_deref());
        let observation = measurement.into_observation(date)?;
        let record = ObservationRecord::new(&descriptor, observation)?;
        let entity_key = record.entity_key.clone();
        let rank = record.observation.rank.clone();

        let updated = self.ingest(vec![record])?;
        tracing::info!(entity_key = %entity_key, %date, %rank, "recorded observation");
        take_entry(updated, &entity_key)
    }

    /// Measures every task through `probe` and records each success as it
    /// arrives. Failed tasks are reported and the batch moves on; a storage
    /// failure stops the batch.
    pub fn run_measurements(
        &self,
        probe: &dyn RankProbe,
        tasks: &[QueryDescriptor],
        date: NaiveDate,
        on_status: &mut dyn FnMut(usize, &str),
    ) -> Result<Vec<TaskOutcome>, HistoryError> {
        let mut outcomes = Vec::with_capacity(tasks.len());

        for (task_index, task) in tasks.iter().enumerate() {
            let status = match resolve(&task.normalized()) {
                Err(err) => TaskStatus::Rejected {
                    message: err.to_string(),
                },
                Ok(_) => {
                    let measured =
                        probe.measure(task, &mut |line: &str| on_status(task_index, line));
                    match measured {
                        Err(err) => {
                            tracing::warn!(
                                task_index,
                                channel = %task.channel(),
                                brand = task.brand_name(),
                                error = %err,
                                "measurement failed"
                            );
                            TaskStatus::UpstreamFailed {
                                message: err.message,
                            }
                        }
                        Ok(measurement) => {
                            let rank = measurement.rank.clone();
                            match self.record(task, date, measurement) {
                                Ok(entry) => TaskStatus::Recorded {
                                    entity_key: entry.entity_key,
                                    rank,
                                },
                                Err(err @ HistoryError::Store(_)) => return Err(err),
                                Err(err) => TaskStatus::Rejected {
                                    message: err.to_string(),
                                },
                            }
                        }
                    }
                }
            };

            outcomes.push(TaskOutcome {
                task_index,
                channel: task.channel(),
                brand_name: task.brand_name().to_owned(),
                status,
            });
        }

        Ok(outcomes)
    }

    pub fn display_groups(&self, channel: ChannelKind) -> Result<Vec<DisplayGroup>, HistoryError> {
        let (entries, saved_order, hidden) = self.store.read_snapshot(|store| {
            Ok::<_, HistoryError>((
                store.load_history()?,
                store.load_group_order(channel)?,
                self.hidden_tables(channel)?,
            ))
        })?;

        let mut groups = self.grouper().group(&entries, channel, &saved_order);
        for group in &mut groups {
            group.table_hidden = hidden.get(&group.group_key).copied().unwrap_or(false);
        }
        Ok(groups)
    }

    pub fn display_group(
        &self,
        channel: ChannelKind,
        group_key: &str,
    ) -> Result<DisplayGroup, HistoryError> {
        self.display_groups(channel)?
            .into_iter()
            .find(|group| group.group_key == group_key)
            .ok_or_else(|| HistoryError::UnknownGroup {
                channel,
                group_key: group_key.to_owned(),
            })
    }

    pub fn chart_series(
        &self,
        channel: ChannelKind,
        group_key: &str,
    ) -> Result<ChartSeries, HistoryError> {
        Ok(chart_series(&self.display_group(channel, group_key)?))
    }

    pub fn delta_table(
        &self,
        channel: ChannelKind,
        group_key: &str,
    ) -> Result<DeltaTable, HistoryError> {
        Ok(delta_table(&self.display_group(channel, group_key)?))
    }

    /// Moves a group one step in the displayed order and persists the whole
    /// resulting sequence. Returns the new order.
    pub fn move_group(
        &self,
        channel: ChannelKind,
        group_key: &str,
        direction: MoveDirection,
    ) -> Result<Vec<String>, HistoryError> {
        let order = self.store.write_exclusive(|store| {
            let displayed = self
                .display_groups(channel)?
                .into_iter()
                .map(|group| group.group_key)
                .collect::<Vec<_>>();
            let order = crate::move_group(&displayed, group_key, direction).ok_or_else(|| {
                HistoryError::UnknownGroup {
                    channel,
                    group_key: group_key.to_owned(),
                }
            })?;
            store.save_group_order(channel, &order)?;
            Ok::<_, HistoryError>(order)
        })?;

        tracing::info!(%channel, group_key, direction = direction.as_str(), "moved display group");
        Ok(order)
    }

    pub fn reconcile(
        &self,
        channel: ChannelKind,
        source: &EntityKey,
        target: &EntityKey,
    ) -> Result<HistoryEntry, HistoryError> {
        let updated = self.store.write_exclusive(|store| {
            let entries = store.load_history()?;
            for key in [source, target] {
                if let Some(entry) = entries.iter().find(|entry| entry.entity_key == *key)
                    && entry.channel() != channel
                {
                    return Err(HistoryError::InvalidInput(format!(
                        "'{key}' is a {} entry, not {channel}",
                        entry.channel()
                    )));
                }
            }

            let updated = merge::reconcile(&entries, source, target)?;
            store.save_history(&updated)?;
            Ok(updated)
        })?;
        take_entry(updated, target)
    }

    /// Relabels an entity's brand. Returns the key its history now lives under.
    pub fn rename_brand(
        &self,
        source: &EntityKey,
        new_brand: &str,
    ) -> Result<EntityKey, HistoryError> {
        self.store.write_exclusive(|store| {
            let entries = store.load_history()?;
            let (updated, new_key) = merge::rename_brand(&entries, source, new_brand)?;
            store.save_history(&updated)?;
            Ok::<_, HistoryError>(new_key)
        })
    }

    pub fn set_table_hidden(
        &self,
        channel: ChannelKind,
        group_key: &str,
        hidden: bool,
    ) -> Result<(), HistoryError> {
        self.store.write_exclusive(|_| {
            self.display_group(channel, group_key)?;

            let mut state = self.hidden_tables(channel)?;
            state.insert(group_key.to_owned(), hidden);
            self.save_hidden_tables(channel, &state)
        })
    }

    /// Hides or shows the table of every group currently displayed for
    /// `channel`. Returns how many groups were updated.
    pub fn set_all_tables_hidden(
        &self,
        channel: ChannelKind,
        hidden: bool,
    ) -> Result<usize, HistoryError> {
        self.store.write_exclusive(|_| {
            let groups = self.display_groups(channel)?;

            let mut state = self.hidden_tables(channel)?;
            for group in &groups {
                state.insert(group.group_key.clone(), hidden);
            }
            self.save_hidden_tables(channel, &state)?;
            Ok(groups.len())
        })
    }

    pub fn import_legacy(&self, path: impl AsRef<Path>) -> Result<ImportReport, HistoryError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let (records, mut report) = parse_legacy_history(&raw)?;

        let updated = self.ingest(records)?;
        report.entities_after_import = updated.len();
        tracing::info!(
            path = %path.display(),
            imported = report.observations_imported,
            skipped = report.skipped_observations,
            entities = report.entities_after_import,
            "imported legacy history"
        );
        Ok(report)
    }

    fn ingest(&self, records: Vec<ObservationRecord>) -> Result<Vec<HistoryEntry>, HistoryError> {
        self.store.write_exclusive(|store| {
            let existing = store.load_history()?;
            let updated = merge_all(existing, records);
            store.save_history(&updated)?;
            Ok::<_, HistoryError>(updated)
        })
    }

    fn grouper(&self) -> SeriesGrouper {
        SeriesGrouper::new(LabelCollator::new(&self.config.display.collation_locale))
            .with_exclusions(self.config.display.exclusions.clone())
    }

    fn hidden_tables(&self, channel: ChannelKind) -> Result<BTreeMap<String, bool>, HistoryError> {
        let key = hidden_tables_key(channel);
        let Some(raw) = self.store.load_preference(&key)? else {
            return Ok(BTreeMap::new());
        };
        serde_json::from_str(&raw)
            .map_err(|source| HistoryError::UnreadablePreference { key, source })
    }

    fn save_hidden_tables(
        &self,
        channel: ChannelKind,
        state: &BTreeMap<String, bool>,
    ) -> Result<(), HistoryError> {
        let raw = serde_json::to_string(state)?;
        self.store
            .save_preference(&hidden_tables_key(channel), &raw)?;
        Ok(())
    }
}

fn hidden_tables_key(channel: ChannelKind) -> String {
    format!("{HIDDEN_TABLES_PREFERENCE}.{}", channel.as_str())
}

fn take_entry(entries: Vec<HistoryEntry>, key: &EntityKey) -> Result<HistoryEntry, HistoryError> {
    entries
        .into_iter()
        .find(|entry| entry.entity_key == *key)
        .ok_or_else(|| HistoryError::UnknownEntity(key.to_string()))
}
