use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rankboard_core::{AreaCodes, ChannelKind, QueryDescriptor, Rank};
use rankboard_history::MoveDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid output format '{other}', expected one of: table, json"
            )),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Rank history dashboard backend")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding the .rankboard directory"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(
        long,
        global = true,
        default_value = "table",
        value_parser = parse_output_format,
        help = "Output format: table or json"
    )]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Record one measurement taken outside the batch runner
    Record(RecordArgs),
    /// List display groups for a channel in display order
    Groups(ChannelArgs),
    /// Print chart series for one group
    Chart(GroupArgs),
    /// Print the rank delta table for one group
    Table(GroupArgs),
    /// Move a group up or down in the saved display order
    Move(MoveArgs),
    /// Fold one entity's history into another
    Reconcile(ReconcileArgs),
    /// Change the brand name of an entity, reconciling if the new name exists
    Rename(RenameArgs),
    /// Hide or show the delta table of one group or all groups
    HideTable(HideTableArgs),
    /// Import a legacy JSON history file
    ImportLegacy(ImportLegacyArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ChannelArgs {
    #[arg(
        long,
        value_parser = parse_channel,
        help = "Channel: organic_listing, feature_page, or local_map"
    )]
    pub channel: ChannelKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct GroupArgs {
    #[arg(long, value_parser = parse_channel)]
    pub channel: ChannelKind,

    #[arg(long = "group", help = "Group key as shown by `groups`")]
    pub group_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct MoveArgs {
    #[arg(long, value_parser = parse_channel)]
    pub channel: ChannelKind,

    #[arg(long = "group")]
    pub group_key: String,

    #[arg(long, value_parser = parse_direction, help = "up or down")]
    pub direction: MoveDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ReconcileArgs {
    #[arg(long, value_parser = parse_channel)]
    pub channel: ChannelKind,

    #[arg(long, help = "Entity key whose history is moved and then dropped")]
    pub source: String,

    #[arg(long, help = "Entity key that receives the history")]
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RenameArgs {
    #[arg(long)]
    pub source: String,

    #[arg(long = "brand", help = "New brand name")]
    pub new_brand: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct HideTableArgs {
    #[arg(long, value_parser = parse_channel)]
    pub channel: ChannelKind,

    #[arg(long = "group", conflicts_with = "all", required_unless_present = "all")]
    pub group_key: Option<String>,

    #[arg(long, help = "Apply to every group of the channel")]
    pub all: bool,

    #[arg(long, help = "Show the table instead of hiding it")]
    pub show: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ImportLegacyArgs {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RecordArgs {
    #[arg(long, value_parser = parse_channel)]
    pub channel: ChannelKind,

    #[arg(long)]
    pub brand: String,

    #[arg(long, help = "Area name (organic listing)")]
    pub area: Option<String>,

    #[arg(long, help = "Service area code (organic listing)")]
    pub service_area: Option<String>,

    #[arg(long, help = "Middle area code (organic listing)")]
    pub middle_area: Option<String>,

    #[arg(long, help = "Small area code (organic listing)")]
    pub small_area: Option<String>,

    #[arg(long, help = "Service keyword (organic listing) or map keyword (local map)")]
    pub keyword: Option<String>,

    #[arg(long, help = "Feature page URL")]
    pub url: Option<String>,

    #[arg(long, help = "Feature page title")]
    pub title: Option<String>,

    #[arg(long, help = "Search location (local map)")]
    pub location: Option<String>,

    #[arg(long, value_parser = parse_rank, help = "Position, or out_of_range")]
    pub rank: Rank,

    #[arg(long, value_parser = parse_date, help = "Observation date, YYYY-MM-DD; defaults to today")]
    pub date: Option<NaiveDate>,

    #[arg(long)]
    pub screenshot: Option<String>,
}

impl RecordArgs {
    pub fn descriptor(&self) -> QueryDescriptor {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        match self.channel {
            ChannelKind::OrganicListing => QueryDescriptor::OrganicListing {
                brand_name: self.brand.clone(),
                area_name: text(&self.area),
                area_codes: AreaCodes {
                    service_area: text(&self.service_area),
                    middle_area: self.middle_area.clone(),
                    small_area: self.small_area.clone(),
                },
                service_keyword: text(&self.keyword),
            },
            ChannelKind::FeaturePage => QueryDescriptor::FeaturePage {
                brand_name: self.brand.clone(),
                feature_page_url: text(&self.url),
                feature_page_name: self.title.clone(),
            },
            ChannelKind::LocalMap => QueryDescriptor::LocalMap {
                brand_name: self.brand.clone(),
                search_location: text(&self.location),
                keyword: text(&self.keyword),
            },
        }
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    value.parse()
}

fn parse_channel(value: &str) -> Result<ChannelKind, String> {
    value.parse()
}

fn parse_direction(value: &str) -> Result<MoveDirection, String> {
    value.parse()
}

fn parse_rank(value: &str) -> Result<Rank, String> {
    let trimmed = value.trim();
    if trimmed == rankboard_core::OUT_OF_RANGE_LABEL || trimmed == "圏外" {
        return Ok(Rank::OutOfRange);
    }
    trimmed
        .parse::<u32>()
        .ok()
        .and_then(Rank::position)
        .ok_or_else(|| format!("invalid rank '{trimmed}', expected a position >= 1 or out_of_range"))
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    let trimmed = value.trim();
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| format!("invalid date '{trimmed}', expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn record_subcommand_builds_map_descriptor() {
        let cli = Cli::try_parse_from([
            "rankboardd",
            "record",
            "--channel",
            "map",
            "--brand",
            "KATE stage LASH",
            "--location",
            "福山駅",
            "--keyword",
            "まつげパーマ",
            "--rank",
            "圏外",
            "--date",
            "2024/01/02",
        ])
        .expect("record should parse");

        let args = match cli.command {
            Commands::Record(args) => args,
            other => panic!("unexpected command: {other:?}"),
        };
        assert_eq!(args.rank, Rank::OutOfRange);
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(
            args.descriptor(),
            QueryDescriptor::LocalMap {
                brand_name: "KATE stage LASH".to_owned(),
                search_location: "福山駅".to_owned(),
                keyword: "まつげパーマ".to_owned(),
            }
        );
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rankboardd",
            "groups",
            "--channel",
            "feature_page",
            "--output",
            "json",
            "--log-format",
            "json",
            "--workspace",
            "/tmp/ws",
        ])
        .expect("groups should parse");

        assert_eq!(cli.output.as_str(), "json");
        assert_eq!(cli.log_format.as_str(), "json");
        assert_eq!(cli.workspace, PathBuf::from("/tmp/ws"));
        assert_eq!(
            cli.command,
            Commands::Groups(ChannelArgs {
                channel: ChannelKind::FeaturePage
            })
        );
    }

    #[test]
    fn invalid_rank_and_hide_table_without_target_are_rejected() {
        assert!(
            Cli::try_parse_from([
                "rankboardd",
                "record",
                "--channel",
                "organic",
                "--brand",
                "b",
                "--rank",
                "0",
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["rankboardd", "hide-table", "--channel", "organic"]).is_err());
    }
}
