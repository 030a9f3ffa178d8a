use crate::domain::lesson::LessonRecord;
use crate::domain::lesson_number::LessonNumber;
use crate::domain::plan::{LessonPlan, PlanStatus};
use crate::persistence::CollectionKey;

use super::{Change, Engine, Scratch, ValidationError};

impl Engine {
    pub fn create_plan(
        &mut self,
        title: &str,
        date: Option<String>,
    ) -> Result<Change<LessonPlan>, ValidationError> {
        self.transact(|scratch| {
            if title.trim().is_empty() {
                return Err(ValidationError::MissingField("title"));
            }
            let plan = LessonPlan::new(&scratch.state.class_id, title, date, &scratch.now);
            scratch.state.plans.push(plan.clone());
            Ok(Change::new(plan, [CollectionKey::LessonPlans]))
        })
    }

    pub fn add_plan_activity(
        &mut self,
        plan_id: &str,
        activity_id: &str,
    ) -> Result<Change<String>, ValidationError> {
        self.transact(|scratch| {
            let activity = scratch
                .state
                .find_activity(activity_id)
                .cloned()
                .ok_or_else(|| ValidationError::ActivityNotFound(activity_id.to_string()))?;
            let plan = scratch.plan_mut(plan_id)?;
            let copy_id = plan.add_activity(&activity);
            let touched = scratch.reproject(plan_id);
            Ok(Change::new(copy_id, touched))
        })
    }

    pub fn remove_plan_activity(
        &mut self,
        plan_id: &str,
        activity_id: &str,
    ) -> Result<Change<()>, ValidationError> {
        self.transact(|scratch| {
            scratch
                .plan_mut(plan_id)?
                .remove_activity(activity_id)
                .ok_or_else(|| ValidationError::ActivityNotFound(activity_id.to_string()))?;
            let touched = scratch.reproject(plan_id);
            Ok(Change::new((), touched))
        })
    }

    pub fn set_plan_status(
        &mut self,
        plan_id: &str,
        status: PlanStatus,
        force: bool,
    ) -> Result<Change<LessonPlan>, ValidationError> {
        self.transact(|scratch| {
            let plan = scratch.plan_mut(plan_id)?;
            plan.status.validate_transition(status, force)?;
            if plan.status == status {
                return Ok(Change::untouched(plan.clone()));
            }
            plan.status = status;
            Ok(Change::new(plan.clone(), [CollectionKey::LessonPlans]))
        })
    }

    /// Gives the plan a lesson number (the next one, if it has none yet) and
    /// projects it into the lesson records.
    pub fn finalize_plan(&mut self, plan_id: &str) -> Result<Change<LessonNumber>, ValidationError> {
        self.transact(|scratch| {
            let next = scratch.state.next_lesson_number();
            let plan = scratch.plan_mut(plan_id)?;
            plan.status.validate_transition(PlanStatus::Planned, false)?;
            let number = plan.lesson_number.unwrap_or(next);
            plan.set_lesson_number(Some(number));
            plan.status = PlanStatus::Planned;
            let mut touched = scratch.reproject(plan_id);
            touched.push(CollectionKey::LessonPlans);
            Ok(Change::new(number, touched))
        })
    }
}

impl Scratch<'_> {
    fn plan_mut(&mut self, plan_id: &str) -> Result<&mut LessonPlan, ValidationError> {
        self.state
            .plans
            .iter_mut()
            .find(|plan| plan.id == plan_id)
            .ok_or_else(|| ValidationError::PlanNotFound(plan_id.to_string()))
    }

    /// Rebuilds the lesson record of a numbered plan from the plan's activities.
    fn reproject(&mut self, plan_id: &str) -> Vec<CollectionKey> {
        let now = self.now.clone();
        let categories = self.categories;
        let Some(plan) = self.state.plans.iter_mut().find(|plan| plan.id == plan_id) else {
            return Vec::new();
        };
        plan.updated_at = now;
        let Some(number) = plan.lesson_number else {
            return vec![CollectionKey::LessonPlans];
        };

        let standards = self
            .state
            .lessons
            .get(&number)
            .map(|record| record.standards.clone())
            .unwrap_or_default();
        let mut record = LessonRecord::new(Some(plan.title.clone()));
        record.standards = standards;
        for activity in &plan.activities {
            record.add_activity(activity.clone(), number, categories);
        }
        record.recompute(categories);
        self.state.lessons.insert(number, record);
        vec![CollectionKey::LessonPlans, CollectionKey::Lessons]
    }
}
