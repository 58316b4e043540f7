use std::io::Write;

use anyhow::Result;
use rankboard_history::{ChartSeries, DeltaTable, DisplayGroup, ImportReport};

const MISSING: &str = "-";

pub(crate) fn groups(out: &mut dyn Write, groups: &[DisplayGroup]) -> Result<()> {
    writeln!(out, "GROUP\tMEMBERS\tTABLE")?;
    for group in groups {
        writeln!(
            out,
            "{}\t{}\t{}",
            group.display_name,
            group.members.len(),
            if group.table_hidden { "hidden" } else { "shown" }
        )?;
    }
    Ok(())
}

pub(crate) fn chart(out: &mut dyn Write, series: &ChartSeries) -> Result<()> {
    writeln!(out, "{}", series.display_name)?;
    write_date_header(out, &series.dates)?;
    for line in &series.lines {
        write!(out, "{}", label_or_brand_only(&line.label))?;
        for point in &line.points {
            match point.score {
                Some(score) => write!(out, "\t{score:.2}")?,
                None => write!(out, "\t{MISSING}")?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub(crate) fn delta_table(out: &mut dyn Write, table: &DeltaTable) -> Result<()> {
    writeln!(out, "{}", table.display_name)?;
    if table.hidden {
        writeln!(out, "(table hidden)")?;
        return Ok(());
    }
    write_date_header(out, &table.dates)?;
    for row in &table.rows {
        write!(out, "{}", label_or_brand_only(&row.label))?;
        for cell in &row.cells {
            match (&cell.rank, cell.delta) {
                (Some(rank), Some(delta)) => write!(out, "\t{}{rank}", delta.direction.arrow())?,
                (Some(rank), None) => write!(out, "\t{rank}")?,
                (None, _) => write!(out, "\t{MISSING}")?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub(crate) fn lines(out: &mut dyn Write, values: &[String]) -> Result<()> {
    for value in values {
        writeln!(out, "{value}")?;
    }
    Ok(())
}

pub(crate) fn import_report(out: &mut dyn Write, report: &ImportReport) -> Result<()> {
    writeln!(
        out,
        "tasks={} observations={} imported={} skipped={} entities={}",
        report.tasks_read,
        report.observations_read,
        report.observations_imported,
        report.skipped_observations,
        report.entities_after_import
    )?;
    for skipped in &report.skipped_tasks {
        writeln!(
            out,
            "skipped task {}: {}",
            skipped.id.as_deref().unwrap_or(MISSING),
            skipped.reason
        )?;
    }
    Ok(())
}

fn write_date_header(out: &mut dyn Write, dates: &[chrono::NaiveDate]) -> Result<()> {
    write!(out, "LABEL")?;
    for date in dates {
        write!(out, "\t{}", date.format("%m/%d"))?;
    }
    writeln!(out)?;
    Ok(())
}

fn label_or_brand_only(label: &str) -> &str {
    if label.is_empty() { "(brand only)" } else { label }
}
