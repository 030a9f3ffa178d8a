use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

pub use crate::cli_ops::*;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "cadence")]
#[command(bin_name = "cadence")]
#[command(version)]
#[command(about = "Local-first lesson and activity planner for music classes")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "CADENCE_DB_PATH",
        global = true,
        help = "Path to the local SQLite cache (defaults to .cadence/cache/state.sqlite)."
    )]
    pub db: Option<PathBuf>,

    #[arg(
        short = 'C',
        long,
        env = "CADENCE_ROOT",
        default_value = ".",
        global = true,
        help = "Workspace root that contains .cadence/."
    )]
    pub root: PathBuf,

    #[arg(
        short = 'c',
        long = "class",
        env = "CADENCE_CLASS",
        global = true,
        help = "Class whose collections are read and changed."
    )]
    pub class_id: Option<String>,

    #[arg(
        short = 'r',
        long,
        env = "CADENCE_REMOTE",
        global = true,
        help = "Remote store path; overrides store.remote_path from config."
    )]
    pub remote: Option<PathBuf>,

    #[arg(long, global = true, help = "Print results as JSON.")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Manage the activity library.")]
    Activity(ActivityArgs),
    #[command(about = "Inspect and edit numbered lessons.")]
    Lesson(LessonArgs),
    #[command(name = "half-term", about = "Assign lessons to half-terms.")]
    HalfTerm(HalfTermArgs),
    #[command(about = "Group lessons into units.")]
    Unit(UnitArgs),
    #[command(about = "Draft, finalize, and delete lesson plans.")]
    Plan(PlanArgs),
    #[command(about = "Bulk import activities from a JSONL row file.")]
    Import(ImportArgs),
    #[command(about = "Show load sources, sync state, and recent imports.")]
    Status,
    #[command(about = "Re-push collections whose remote write failed.")]
    Sync(SyncArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[arg(help = "JSONL file with one validated row per line.")]
    pub file: String,

    #[arg(long, help = "Validate and report without writing anything.")]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[arg(long, help = "Push every collection, not only pending ones.")]
    pub all: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, HalfTermSubcommands, LessonSubcommands};
    use crate::domain::lesson_number::LessonNumber;

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "cadence",
            "half-term",
            "assign",
            "7",
            "A2",
            "--class",
            "y3",
            "--json",
        ])
        .expect("arguments should parse");
        assert_eq!(cli.class_id.as_deref(), Some("y3"));
        assert!(cli.json);
        match cli.command {
            Commands::HalfTerm(args) => match args.command {
                HalfTermSubcommands::Assign(assign) => {
                    assert_eq!(assign.lesson, LessonNumber::new(7).expect("seven"));
                    assert_eq!(assign.half_term, "A2");
                }
                other => panic!("unexpected half-term command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn lesson_zero_is_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["cadence", "lesson", "delete", "0"]).is_err());
        let cli = Cli::try_parse_from(["cadence", "lesson", "delete", "3"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Lesson(args) if matches!(args.command, LessonSubcommands::Delete(_))
        ));
    }
}
