use clap::{Args, Subcommand};

use crate::domain::activity::ResourceKind;
use crate::domain::lesson_number::LessonNumber;
use crate::domain::plan::PlanStatus;

fn parse_resource(raw: &str) -> Result<(ResourceKind, String), String> {
    let (kind, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=URL, got '{raw}'"))?;
    let kind = ResourceKind::parse(kind).ok_or_else(|| {
        format!(
            "unknown resource kind '{}'; expected one of: {}",
            kind,
            ResourceKind::ALL.map(ResourceKind::as_str).join(", ")
        )
    })?;
    Ok((kind, url.trim().to_string()))
}

#[derive(Debug, Args)]
pub struct ActivityArgs {
    #[command(subcommand)]
    pub command: ActivitySubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ActivitySubcommands {
    #[command(about = "Add an activity to the library.")]
    Add(ActivityAddArgs),
    #[command(about = "Edit a library activity.")]
    Update(ActivityUpdateArgs),
    #[command(about = "List library activities.")]
    List(ActivityListArgs),
    #[command(about = "Remove an activity from the library.")]
    Delete(IdArgs),
}

#[derive(Debug, Args)]
pub struct ActivityAddArgs {
    #[arg(help = "Activity name.")]
    pub name: String,

    #[arg(short = 'k', long, help = "Category, for example 'Welcome'.")]
    pub category: String,

    #[arg(short = 't', long = "time", default_value_t = 0, help = "Duration in minutes.")]
    pub minutes: u32,

    #[arg(long = "desc", help = "Description text.")]
    pub description: Option<String>,

    #[arg(long, help = "Level, for example 'LKG' or 'Reception'.")]
    pub level: Option<String>,

    #[arg(long = "unit", help = "Unit name the activity belongs to.")]
    pub unit_name: Option<String>,

    #[arg(
        short = 'l',
        long,
        help = "Also file the activity into this lesson (existing or the next number)."
    )]
    pub lesson: Option<LessonNumber>,

    #[arg(long = "resource", value_parser = parse_resource, help = "Resource as KIND=URL; repeatable.")]
    pub resources: Vec<(ResourceKind, String)>,

    #[arg(long = "standard", help = "Curriculum standard; repeatable.")]
    pub standards: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ActivityUpdateArgs {
    #[arg(help = "Activity id.")]
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long = "desc")]
    pub description: Option<String>,

    #[arg(short = 'k', long)]
    pub category: Option<String>,

    #[arg(short = 't', long = "time")]
    pub minutes: Option<u32>,

    #[arg(long)]
    pub level: Option<String>,

    #[arg(long = "unit")]
    pub unit_name: Option<String>,

    #[arg(long = "resource", value_parser = parse_resource, help = "Set KIND=URL; an empty URL clears it.")]
    pub resources: Vec<(ResourceKind, String)>,

    #[arg(long = "add-standard")]
    pub add_standards: Vec<String>,

    #[arg(long = "remove-standard")]
    pub remove_standards: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ActivityListArgs {
    #[arg(short = 'k', long, help = "Only this category.")]
    pub category: Option<String>,

    #[arg(short = 'l', long, help = "Only activities labelled with this lesson.")]
    pub lesson: Option<LessonNumber>,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Debug, Args)]
pub struct LessonArgs {
    #[command(subcommand)]
    pub command: LessonSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum LessonSubcommands {
    #[command(about = "List lessons with their half-term and total time.")]
    List,
    #[command(about = "Show one lesson grouped by category.")]
    Show(LessonRefArgs),
    #[command(about = "Create an empty lesson at the next number.")]
    New(LessonNewArgs),
    #[command(about = "Print the next lesson number.")]
    Next,
    #[command(about = "Delete a lesson and renumber the ones after it.")]
    Delete(LessonRefArgs),
    #[command(about = "Copy a library activity into a lesson.")]
    AddActivity(LessonActivityArgs),
    #[command(about = "Remove an activity copy from a lesson.")]
    RemoveActivity(LessonActivityArgs),
    #[command(about = "Set or clear a lesson title.")]
    Title(LessonTitleArgs),
    #[command(about = "Replace the standards recorded for a lesson.")]
    Standards(LessonStandardsArgs),
}

#[derive(Debug, Args)]
pub struct LessonRefArgs {
    #[arg(help = "Lesson number.")]
    pub lesson: LessonNumber,
}

#[derive(Debug, Args)]
pub struct LessonNewArgs {
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Args)]
pub struct LessonActivityArgs {
    pub lesson: LessonNumber,
    pub activity_id: String,
}

#[derive(Debug, Args)]
pub struct LessonTitleArgs {
    pub lesson: LessonNumber,
    #[arg(help = "New title; omit to clear.")]
    pub title: Option<String>,
}

#[derive(Debug, Args)]
pub struct LessonStandardsArgs {
    pub lesson: LessonNumber,
    #[arg(help = "Standards; none clears them.")]
    pub standards: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HalfTermArgs {
    #[command(subcommand)]
    pub command: HalfTermSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum HalfTermSubcommands {
    #[command(about = "List half-terms and their lessons.")]
    List,
    #[command(about = "Assign a lesson to a half-term.")]
    Assign(HalfTermAssignArgs),
    #[command(about = "Remove a lesson from its half-term.")]
    Unassign(LessonRefArgs),
    #[command(about = "Mark a half-term complete (or not, with --undo).")]
    Complete(HalfTermCompleteArgs),
}

#[derive(Debug, Args)]
pub struct HalfTermAssignArgs {
    pub lesson: LessonNumber,
    #[arg(help = "Half-term id, for example A1 or SP2.")]
    pub half_term: String,
}

#[derive(Debug, Args)]
pub struct HalfTermCompleteArgs {
    pub half_term: String,
    #[arg(long)]
    pub undo: bool,
}

#[derive(Debug, Args)]
pub struct UnitArgs {
    #[command(subcommand)]
    pub command: UnitSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum UnitSubcommands {
    List,
    #[command(about = "Create a unit.")]
    Add(UnitAddArgs),
    #[command(about = "Replace the lessons a unit covers.")]
    Assign(UnitAssignArgs),
    Delete(IdArgs),
}

#[derive(Debug, Args)]
pub struct UnitAddArgs {
    pub name: String,
    #[arg(long, default_value = "#6b7280")]
    pub color: String,
    #[arg(long, help = "Half-term id the unit is taught in.")]
    pub term: Option<String>,
}

#[derive(Debug, Args)]
pub struct UnitAssignArgs {
    pub id: String,
    pub lessons: Vec<LessonNumber>,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub command: PlanSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum PlanSubcommands {
    List,
    #[command(about = "Start a draft plan.")]
    New(PlanNewArgs),
    #[command(about = "Copy a library activity into a plan.")]
    AddActivity(PlanActivityArgs),
    RemoveActivity(PlanActivityArgs),
    #[command(about = "Move a plan through draft, planned, completed, cancelled.")]
    Status(PlanStatusArgs),
    #[command(about = "Give a plan a lesson number and project it into the lessons.")]
    Finalize(IdArgs),
    #[command(about = "Delete a plan; a numbered plan takes its lesson with it.")]
    Delete(IdArgs),
}

#[derive(Debug, Args)]
pub struct PlanNewArgs {
    pub title: String,
    #[arg(long, help = "Teaching date, YYYY-MM-DD.")]
    pub date: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlanActivityArgs {
    pub plan_id: String,
    pub activity_id: String,
}

#[derive(Debug, Args)]
pub struct PlanStatusArgs {
    pub plan_id: String,
    pub status: PlanStatus,
    #[arg(long, help = "Allow leaving the completed state.")]
    pub force: bool,
}
