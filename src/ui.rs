use std::io::{self, IsTerminal};

use crate::app::{App, StatusReport};
use crate::domain::activity::{Activity, ResourceKind};
use crate::domain::half_term::HalfTerm;
use crate::domain::lesson::LessonRecord;
use crate::domain::lesson_number::LessonNumber;
use crate::domain::plan::{LessonPlan, PlanStatus};
use crate::domain::unit::Unit;
use crate::persistence::{RemoteOutcome, SaveReport};

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub category: Option<String>,
    pub lesson: Option<LessonNumber>,
}

impl ActivityFilter {
    pub fn matches(&self, activity: &Activity) -> bool {
        let category_ok = self
            .category
            .as_deref()
            .and_then(non_empty)
            .map_or(true, |category| activity.category.eq_ignore_ascii_case(category));
        let lesson_ok = self
            .lesson
            .map_or(true, |lesson| activity.lesson_number == Some(lesson));
        category_ok && lesson_ok
    }
}

pub fn print_activities(activities: &[&Activity], filter: &ActivityFilter) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Activities"));
    if let Some(summary) = filter_summary(filter) {
        println!("{}", palette.dim(&format!("filters: {summary}")));
    }
    if activities.is_empty() {
        println!("{}", palette.dim("no activities matched"));
        return;
    }
    for activity in activities {
        println!("{}", format_activity_row(activity, &palette));
    }
    println!("{}", palette.dim(&format!("{} activity(ies)", activities.len())));
}

fn format_activity_row(activity: &Activity, palette: &Palette) -> String {
    let mut line = format!(
        "{} {} {} {}",
        palette.id(activity.stable_id()),
        palette.category(&activity.category),
        activity.name,
        palette.dim(&format!("{}m", activity.duration_minutes))
    );
    if let Some(number) = activity.lesson_number {
        line.push(' ');
        line.push_str(&palette.lesson(number));
    }
    if !activity.level.is_empty() {
        line.push(' ');
        line.push_str(&palette.dim(&format!("level={}", activity.level)));
    }
    line
}

fn filter_summary(filter: &ActivityFilter) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(category) = filter.category.as_deref().and_then(non_empty) {
        parts.push(format!("category={category}"));
    }
    if let Some(lesson) = filter.lesson {
        parts.push(format!("lesson={lesson}"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

pub fn print_lesson_list(app: &App) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Lessons"));
    let numbers = app.lesson_numbers();
    if numbers.is_empty() {
        println!("{}", palette.dim("no lessons yet"));
        return;
    }
    for number in numbers {
        let Some(record) = app.lesson(number) else {
            continue;
        };
        let term = app
            .half_term_of(number)
            .map(|term| {
                let position = term.position_of(number).unwrap_or_default();
                format!("{} #{}", term.id, position)
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} {} {}",
            palette.lesson(number),
            record.title.as_deref().unwrap_or("(untitled)"),
            palette.dim(&format!("{} activities, {}m", record.activity_count(), record.total_time)),
            palette.term(&term)
        );
    }
    println!("{}", palette.dim(&format!("next lesson: {}", app.next_lesson_number())));
}

pub fn print_lesson(number: LessonNumber, record: &LessonRecord, half_term: Option<&HalfTerm>) {
    let palette = Palette::auto();
    let title = record.title.as_deref().unwrap_or("(untitled)");
    println!("{} {}", palette.lesson(number), palette.heading(title));
    if let Some(term) = half_term {
        println!(
            "{}",
            palette.term(&format!(
                "{} ({}), lesson {} of that half-term",
                term.name,
                term.id,
                term.position_of(number).unwrap_or_default()
            ))
        );
    }
    for category in &record.category_order {
        let Some(activities) = record.grouped.get(category) else {
            continue;
        };
        println!("  {}", palette.category(category));
        for activity in activities {
            println!(
                "    {} {} {}",
                palette.id(activity.stable_id()),
                activity.name,
                palette.dim(&format!("{}m", activity.duration_minutes))
            );
            for kind in ResourceKind::ALL {
                if let Some(url) = activity.resource(kind) {
                    println!("      {}", palette.dim(&format!("{kind}: {url}")));
                }
            }
        }
    }
    if !record.standards.is_empty() {
        println!("  {}", palette.dim(&format!("standards: {}", record.standards.join(", "))));
    }
    println!("  {}", palette.dim(&format!("total {}m", record.total_time)));
}

pub fn print_half_terms(terms: &[HalfTerm]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Half-terms"));
    for term in terms {
        let lessons = crate::domain::lesson_number::sorted_unique(term.lessons.iter().copied())
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let done = if term.is_complete { " [COMPLETE]" } else { "" };
        println!(
            "{} {}{} {}",
            palette.term(&term.id),
            term.name,
            palette.done(done),
            palette.dim(&format!("[{lessons}]"))
        );
    }
}

pub fn print_units(units: &[Unit]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Units"));
    if units.is_empty() {
        println!("{}", palette.dim("no units"));
        return;
    }
    for unit in units {
        let lessons = unit
            .lesson_numbers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{} {} {} {}",
            palette.id(&unit.id),
            unit.name,
            palette.dim(&unit.color),
            palette.dim(&format!("[{lessons}]"))
        );
    }
}

pub fn print_plans(plans: &[LessonPlan]) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Lesson plans"));
    if plans.is_empty() {
        println!("{}", palette.dim("no plans"));
        return;
    }
    for plan in plans {
        let lesson = plan
            .lesson_number
            .map(|number| palette.lesson(number))
            .unwrap_or_else(|| palette.dim("unnumbered"));
        println!(
            "{} {} {} {} {}",
            palette.id(&plan.id),
            palette.status(plan.status),
            plan.title,
            lesson,
            palette.dim(&format!("{} activities", plan.activities.len()))
        );
    }
}

pub fn print_status(report: &StatusReport) {
    let palette = Palette::auto();
    println!("{} {}", palette.heading("Class"), report.class_id);
    println!("remote: {}", report.remote);
    if let Some(version) = report.cache_schema_version.as_deref() {
        println!("{}", palette.dim(&format!("cache schema v{version}")));
    }
    println!(
        "lessons: {} (next {})",
        report.lesson_count, report.next_lesson_number
    );
    for (collection, source) in &report.loaded_from {
        let source = serde_json::to_string(source).unwrap_or_default();
        println!("  loaded {} from {}", collection, source.trim_matches('"'));
    }
    for error in &report.remote_errors {
        println!(
            "  {}",
            palette.warn(&format!("remote read of {} failed: {}", error.collection, error.error))
        );
    }
    for record in &report.collections {
        let mut line = format!("  sync {} {}", record.collection, record.state);
        if let Some(synced) = record.last_synced_at.as_deref() {
            line.push_str(&format!(" last_synced={synced}"));
        }
        if let Some(error) = record.last_error.as_deref() {
            line.push_str(&format!(" error={error}"));
        }
        println!("{}", line);
    }
    for violation in &report.violations {
        println!("  {}", palette.warn(&format!("violation: {violation}")));
    }
    for import in &report.imports {
        println!(
            "  import {} {} processed={} imported={} skipped={} errors={}",
            import.source_ref,
            import.status,
            import.processed_count,
            import.imported_count,
            import.skipped_count,
            import.error_count
        );
    }
}

pub fn print_saves(saves: &[SaveReport]) {
    let palette = Palette::auto();
    for save in saves {
        match &save.remote {
            RemoteOutcome::Failed(reason) => eprintln!(
                "{}",
                palette.warn(&format!(
                    "saved {} locally; remote write failed ({}); run `cadence sync` to retry",
                    save.collection, reason
                ))
            ),
            RemoteOutcome::Synced => println!("{}", palette.dim(&format!("synced {}", save.collection))),
            RemoteOutcome::LocalOnly => {
                println!("{}", palette.dim(&format!("saved {} locally", save.collection)))
            }
            RemoteOutcome::Skipped => {}
        }
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn lesson(&self, number: LessonNumber) -> String {
        self.paint("1;33", &format!("L{number}"))
    }

    fn category(&self, text: &str) -> String {
        self.paint("35", &format!("({text})"))
    }

    fn term(&self, text: &str) -> String {
        self.paint("36", text)
    }

    fn done(&self, text: &str) -> String {
        self.paint("32", text)
    }

    fn warn(&self, text: &str) -> String {
        self.paint("31", text)
    }

    fn status(&self, status: PlanStatus) -> String {
        let upper = status.as_str().to_ascii_uppercase();
        self.paint(status_color_code(status), &format!("[{upper}]"))
    }
}

fn status_color_code(status: PlanStatus) -> &'static str {
    match status {
        PlanStatus::Draft => "34",
        PlanStatus::Planned => "33",
        PlanStatus::Completed => "32",
        PlanStatus::Cancelled => "90",
    }
}

#[cfg(test)]
mod tests {
    use super::{filter_summary, ActivityFilter};
    use crate::domain::activity::Activity;
    use crate::domain::lesson_number::LessonNumber;

    #[test]
    fn filter_summary_formats_only_active_filters() {
        let filter = ActivityFilter {
            category: Some(" Welcome ".to_string()),
            lesson: LessonNumber::new(4),
        };
        assert_eq!(
            filter_summary(&filter).expect("summary should exist"),
            "category=Welcome lesson=4"
        );
        assert!(filter_summary(&ActivityFilter::default()).is_none());
    }

    #[test]
    fn filter_matches_category_case_insensitively_and_lesson_exactly() {
        let mut activity = Activity::new("Hello", "Welcome", 5);
        activity.lesson_number = LessonNumber::new(2);

        let by_category = ActivityFilter {
            category: Some("welcome".to_string()),
            lesson: None,
        };
        assert!(by_category.matches(&activity));

        let other_lesson = ActivityFilter {
            category: None,
            lesson: LessonNumber::new(3),
        };
        assert!(!other_lesson.matches(&activity));
        assert!(ActivityFilter::default().matches(&activity));
    }
}
