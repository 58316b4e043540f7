use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;
use rankboard_config::{config_path, ensure_workspace_config, validate_config};
use rankboard_core::EntityKey;
use rankboard_history::{Measurement, RankHistoryService};
use serde::Serialize;

use crate::cli::{Cli, Commands, HideTableArgs, OutputFormat, RecordArgs};
use crate::render;

pub fn run(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            config_path(&workspace).display()
        )
    })?;
    for warning in validate_config(&config) {
        eprintln!(
            "rankboard config warning [{}]: {}",
            warning.code, warning.message
        );
    }

    let service = RankHistoryService::open(&workspace)
        .with_context(|| format!("failed to open rank history in {}", workspace.display()))?;
    tracing::debug!(workspace = %workspace.display(), command = ?cli.command, "dispatching command");

    match &cli.command {
        Commands::Record(args) => run_record(&service, args, cli.output, out),
        Commands::Groups(args) => {
            let groups = service.display_groups(args.channel)?;
            match cli.output {
                OutputFormat::Json => write_json(out, &groups),
                OutputFormat::Table => render::groups(out, &groups),
            }
        }
        Commands::Chart(args) => {
            let series = service
                .chart_series(args.channel, &args.group_key)
                .with_context(|| format!("failed to build chart for '{}'", args.group_key))?;
            match cli.output {
                OutputFormat::Json => write_json(out, &series),
                OutputFormat::Table => render::chart(out, &series),
            }
        }
        Commands::Table(args) => {
            let table = service
                .delta_table(args.channel, &args.group_key)
                .with_context(|| format!("failed to build table for '{}'", args.group_key))?;
            match cli.output {
                OutputFormat::Json => write_json(out, &table),
                OutputFormat::Table => render::delta_table(out, &table),
            }
        }
        Commands::Move(args) => {
            let order = service.move_group(args.channel, &args.group_key, args.direction)?;
            match cli.output {
                OutputFormat::Json => write_json(out, &order),
                OutputFormat::Table => render::lines(out, &order),
            }
        }
        Commands::Reconcile(args) => {
            let source = parse_key(&args.source)?;
            let target = parse_key(&args.target)?;
            let entry = service
                .reconcile(args.channel, &source, &target)
                .with_context(|| format!("failed to reconcile '{source}' into '{target}'"))?;
            match cli.output {
                OutputFormat::Json => write_json(out, &entry),
                OutputFormat::Table => {
                    writeln!(
                        out,
                        "reconciled {source} into {} ({} observations)",
                        entry.entity_key,
                        entry.log.len()
                    )?;
                    Ok(())
                }
            }
        }
        Commands::Rename(args) => {
            let source = parse_key(&args.source)?;
            let new_key = service
                .rename_brand(&source, &args.new_brand)
                .with_context(|| format!("failed to rename brand of '{source}'"))?;
            match cli.output {
                OutputFormat::Json => write_json(out, &RenameOutput { source, new_key }),
                OutputFormat::Table => {
                    writeln!(out, "{source} -> {new_key}")?;
                    Ok(())
                }
            }
        }
        Commands::HideTable(args) => run_hide_table(&service, args, out),
        Commands::ImportLegacy(args) => {
            let report = service.import_legacy(&args.path).with_context(|| {
                format!("failed to import legacy history {}", args.path.display())
            })?;
            match cli.output {
                OutputFormat::Json => write_json(out, &report),
                OutputFormat::Table => render::import_report(out, &report),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RenameOutput {
    source: EntityKey,
    new_key: EntityKey,
}

fn run_record(
    service: &RankHistoryService,
    args: &RecordArgs,
    output: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let measurement = Measurement {
        rank: args.rank.clone(),
        screenshot_ref: args.screenshot.clone(),
        page_title: args.title.clone(),
    };

    let entry = service
        .record(&args.descriptor(), date, measurement)
        .context("failed to record measurement")?;
    match output {
        OutputFormat::Json => write_json(out, &entry),
        OutputFormat::Table => {
            writeln!(
                out,
                "recorded {} on {date} for {} ({} observations)",
                args.rank,
                entry.entity_key,
                entry.log.len()
            )?;
            Ok(())
        }
    }
}

fn run_hide_table(
    service: &RankHistoryService,
    args: &HideTableArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let hidden = !args.show;
    let verb = if hidden { "hidden" } else { "shown" };
    match args.group_key.as_deref() {
        Some(group_key) => {
            service.set_table_hidden(args.channel, group_key, hidden)?;
            writeln!(out, "table {verb}: {group_key}")?;
        }
        None => {
            let count = service.set_all_tables_hidden(args.channel, hidden)?;
            writeln!(out, "tables {verb}: {count}")?;
        }
    }
    Ok(())
}

fn parse_key(raw: &str) -> Result<EntityKey> {
    EntityKey::parse(raw).with_context(|| format!("invalid entity key '{raw}'"))
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to serialize output")?;
    writeln!(out)?;
    Ok(())
}
