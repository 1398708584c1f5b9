//! Pure views over a planning snapshot. Nothing here mutates its inputs;
//! every function builds fresh lists and maps.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::reservation::UnassignedReservation;
use crate::models::task::DeliveryTask;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentFilter {
    #[default]
    All,
    Unassigned,
    Assigned,
}

pub fn tasks_for_date(tasks: &[DeliveryTask], date: NaiveDate) -> Vec<DeliveryTask> {
    tasks
        .iter()
        .filter(|task| task.scheduled_date == date)
        .cloned()
        .collect()
}

pub fn filter_by_assignment(tasks: &[DeliveryTask], filter: AssignmentFilter) -> Vec<DeliveryTask> {
    tasks
        .iter()
        .filter(|task| match filter {
            AssignmentFilter::All => true,
            AssignmentFilter::Unassigned => !task.is_assigned(),
            AssignmentFilter::Assigned => task.is_assigned(),
        })
        .cloned()
        .collect()
}

/// Technician id (or `__unassigned__`) to that technician's tasks, each list
/// ordered by `scheduled_time`. Times are zero-padded `HH:MM`, so string order
/// is chronological.
pub fn group_by_technician(tasks: &[DeliveryTask]) -> BTreeMap<String, Vec<DeliveryTask>> {
    let mut groups: BTreeMap<String, Vec<DeliveryTask>> = BTreeMap::new();
    for task in tasks {
        groups
            .entry(task.group_key().to_string())
            .or_default()
            .push(task.clone());
    }

    for group in groups.values_mut() {
        group.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
    }
    groups
}

/// Reservations starting on `date` that have no task at all among
/// `existing_tasks`. A reservation whose task exists but is unassigned shows
/// up through the task list instead.
pub fn unassigned_reservations_for_date(
    reservations: &[UnassignedReservation],
    date: NaiveDate,
    existing_tasks: &[DeliveryTask],
) -> Vec<UnassignedReservation> {
    let with_task: HashSet<&str> = existing_tasks
        .iter()
        .map(|task| task.reservation_id.as_str())
        .collect();

    reservations
        .iter()
        .filter(|reservation| reservation.start_date == date)
        .filter(|reservation| !with_task.contains(reservation.id.as_str()))
        .cloned()
        .collect()
}

/// `YYYY-MM-DD` to the tasks scheduled that day.
pub fn group_all_tasks_by_date(tasks: &[DeliveryTask]) -> BTreeMap<String, Vec<DeliveryTask>> {
    let mut by_date: BTreeMap<String, Vec<DeliveryTask>> = BTreeMap::new();
    for task in tasks {
        by_date
            .entry(date_key(task.scheduled_date))
            .or_default()
            .push(task.clone());
    }
    by_date
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
