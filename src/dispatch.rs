use serde::Serialize;

use crate::app::{App, AppError, Outcome};
use crate::cli::{
    ActivitySubcommands, HalfTermSubcommands, LessonSubcommands, PlanSubcommands, UnitSubcommands,
};
use crate::domain::activity::Activity;
use crate::engine::{ActivityPatch, AssignOutcome, Renumbering};
use crate::print_json;
use crate::ui;

/// Prints `outcome` as JSON, or the human line followed by any save warnings.
fn report<T: Serialize>(outcome: &Outcome<T>, json: bool, line: impl FnOnce(&T) -> String) {
    if json {
        print_json(outcome);
    } else {
        println!("{}", line(&outcome.value));
        ui::print_saves(&outcome.saves);
    }
}

fn describe_renumbering(renumbering: &Renumbering) -> String {
    let deleted = renumbering
        .deleted
        .map(|number| format!("deleted lesson {number}"))
        .unwrap_or_else(|| "deleted plan".to_string());
    if renumbering.mapping.is_empty() {
        return deleted;
    }
    let moves = renumbering
        .mapping
        .iter()
        .map(|(old, new)| format!("{old}->{new}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{deleted}; renumbered {moves}")
}

pub fn run_activity(app: &mut App, command: ActivitySubcommands, json: bool) -> Result<(), AppError> {
    match command {
        ActivitySubcommands::Add(args) => {
            let mut activity = Activity::new(args.name, args.category, args.minutes);
            activity.description = args.description.unwrap_or_default();
            activity.level = args.level.unwrap_or_default();
            activity.unit_name = args.unit_name.unwrap_or_default();
            activity.lesson_number = args.lesson;
            for (kind, url) in &args.resources {
                activity.set_resource(*kind, url);
            }
            activity.standards.extend(args.standards);
            let outcome = app.add_activity(activity)?;
            report(&outcome, json, |id| format!("added activity {id}"));
        }
        ActivitySubcommands::Update(args) => {
            let patch = ActivityPatch {
                name: args.name,
                description: args.description,
                category: args.category,
                duration_minutes: args.minutes,
                level: args.level,
                unit_name: args.unit_name,
                resources: args.resources,
                add_standards: args.add_standards,
                remove_standards: args.remove_standards,
            };
            let outcome = app.update_activity(&args.id, patch)?;
            report(&outcome, json, |activity| {
                format!("updated activity {} {}", activity.stable_id(), activity.name)
            });
        }
        ActivitySubcommands::List(args) => {
            let filter = ui::ActivityFilter {
                category: args.category,
                lesson: args.lesson,
            };
            let activities: Vec<&Activity> = app
                .activities()
                .iter()
                .filter(|activity| filter.matches(activity))
                .collect();
            if json {
                print_json(&activities);
            } else {
                ui::print_activities(&activities, &filter);
            }
        }
        ActivitySubcommands::Delete(args) => {
            let outcome = app.delete_activity(&args.id)?;
            report(&outcome, json, |activity| {
                format!("deleted activity {} {}", activity.stable_id(), activity.name)
            });
        }
    }
    Ok(())
}

pub fn run_lesson(app: &mut App, command: LessonSubcommands, json: bool) -> Result<(), AppError> {
    match command {
        LessonSubcommands::List => {
            if json {
                print_json(app.all_lessons_data());
            } else {
                ui::print_lesson_list(app);
            }
        }
        LessonSubcommands::Show(args) => {
            let record = app.lesson(args.lesson).ok_or_else(|| {
                AppError::InvalidArgument(format!("lesson {} not found", args.lesson))
            })?;
            if json {
                print_json(record);
            } else {
                ui::print_lesson(args.lesson, record, app.half_term_of(args.lesson));
            }
        }
        LessonSubcommands::New(args) => {
            let outcome = app.create_lesson(args.title)?;
            report(&outcome, json, |number| format!("created lesson {number}"));
        }
        LessonSubcommands::Next => {
            let next = app.next_lesson_number();
            if json {
                print_json(&next);
            } else {
                println!("{next}");
            }
        }
        LessonSubcommands::Delete(args) => {
            let outcome = app.delete_lesson(args.lesson)?;
            report(&outcome, json, describe_renumbering);
        }
        LessonSubcommands::AddActivity(args) => {
            let outcome = app.add_activity_to_lesson(args.lesson, &args.activity_id)?;
            report(&outcome, json, |copy_id| {
                format!("added {} to lesson {} as {}", args.activity_id, args.lesson, copy_id)
            });
        }
        LessonSubcommands::RemoveActivity(args) => {
            let outcome = app.remove_activity_from_lesson(args.lesson, &args.activity_id)?;
            report(&outcome, json, |removed| {
                format!("removed {} from lesson {}", removed.name, args.lesson)
            });
        }
        LessonSubcommands::Title(args) => {
            let outcome = app.set_lesson_title(args.lesson, args.title)?;
            report(&outcome, json, |_| format!("updated title of lesson {}", args.lesson));
        }
        LessonSubcommands::Standards(args) => {
            let count = args.standards.len();
            let outcome = app.set_lesson_standards(args.lesson, args.standards)?;
            report(&outcome, json, |_| {
                format!("set {} standard(s) on lesson {}", count, args.lesson)
            });
        }
    }
    Ok(())
}

pub fn run_half_term(
    app: &mut App,
    command: HalfTermSubcommands,
    json: bool,
) -> Result<(), AppError> {
    match command {
        HalfTermSubcommands::List => {
            if json {
                print_json(app.half_terms());
            } else {
                ui::print_half_terms(app.half_terms());
            }
        }
        HalfTermSubcommands::Assign(args) => {
            let outcome = app.assign_half_term(args.lesson, &args.half_term)?;
            report(&outcome, json, |result| match result {
                AssignOutcome::Assigned => {
                    format!("assigned lesson {} to {}", args.lesson, args.half_term)
                }
                AssignOutcome::AlreadyAssigned => {
                    format!("lesson {} is already in {}", args.lesson, args.half_term)
                }
            });
        }
        HalfTermSubcommands::Unassign(args) => {
            let outcome = app.unassign_half_term(args.lesson)?;
            report(&outcome, json, |removed| match removed {
                Some(id) => format!("removed lesson {} from {}", args.lesson, id),
                None => format!("lesson {} was not in any half-term", args.lesson),
            });
        }
        HalfTermSubcommands::Complete(args) => {
            let outcome = app.set_half_term_complete(&args.half_term, !args.undo)?;
            report(&outcome, json, |_| {
                let state = if args.undo { "open" } else { "complete" };
                format!("half-term {} marked {}", args.half_term, state)
            });
        }
    }
    Ok(())
}

pub fn run_unit(app: &mut App, command: UnitSubcommands, json: bool) -> Result<(), AppError> {
    match command {
        UnitSubcommands::List => {
            if json {
                print_json(app.units());
            } else {
                ui::print_units(app.units());
            }
        }
        UnitSubcommands::Add(args) => {
            let outcome = app.create_unit(&args.name, &args.color, args.term)?;
            report(&outcome, json, |unit| format!("created unit {} {}", unit.id, unit.name));
        }
        UnitSubcommands::Assign(args) => {
            let outcome = app.assign_unit_lessons(&args.id, &args.lessons)?;
            report(&outcome, json, |unit| {
                format!("unit {} now covers {} lesson(s)", unit.id, unit.lesson_numbers.len())
            });
        }
        UnitSubcommands::Delete(args) => {
            let outcome = app.delete_unit(&args.id)?;
            report(&outcome, json, |unit| format!("deleted unit {} {}", unit.id, unit.name));
        }
    }
    Ok(())
}

pub fn run_plan(app: &mut App, command: PlanSubcommands, json: bool) -> Result<(), AppError> {
    match command {
        PlanSubcommands::List => {
            if json {
                print_json(app.plans());
            } else {
                ui::print_plans(app.plans());
            }
        }
        PlanSubcommands::New(args) => {
            let outcome = app.create_plan(&args.title, args.date)?;
            report(&outcome, json, |plan| format!("created plan {} {}", plan.id, plan.title));
        }
        PlanSubcommands::AddActivity(args) => {
            let outcome = app.add_plan_activity(&args.plan_id, &args.activity_id)?;
            report(&outcome, json, |copy_id| {
                format!("added {} to plan {} as {}", args.activity_id, args.plan_id, copy_id)
            });
        }
        PlanSubcommands::RemoveActivity(args) => {
            let outcome = app.remove_plan_activity(&args.plan_id, &args.activity_id)?;
            report(&outcome, json, |_| {
                format!("removed {} from plan {}", args.activity_id, args.plan_id)
            });
        }
        PlanSubcommands::Status(args) => {
            let outcome = app.set_plan_status(&args.plan_id, args.status, args.force)?;
            report(&outcome, json, |plan| {
                format!("plan {} -> {}", plan.id, plan.status.as_str())
            });
        }
        PlanSubcommands::Finalize(args) => {
            let outcome = app.finalize_plan(&args.id)?;
            report(&outcome, json, |number| {
                format!("plan {} is lesson {}", args.id, number)
            });
        }
        PlanSubcommands::Delete(args) => {
            let outcome = app.delete_plan(&args.id)?;
            report(&outcome, json, describe_renumbering);
        }
    }
    Ok(())
}
