use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::engine::derive::date_key;
use crate::error::AppError;
use crate::models::task::DeliveryTask;

const DENSE_GRID_CELLS: usize = 42;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl WeekStart {
    fn leading_cells(self, first_of_month: NaiveDate) -> usize {
        let weekday = first_of_month.weekday();
        match self {
            WeekStart::Sunday => weekday.num_days_from_sunday() as usize,
            WeekStart::Monday => weekday.num_days_from_monday() as usize,
        }
    }
}

/// `Sparse` leaves blanks before the 1st and stops at the last day of the
/// month. `Dense` fills a 6x7 grid with neighbouring-month days.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    #[default]
    Sparse,
    Dense,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarDay {
    pub date: Option<NaiveDate>,
    pub date_key: Option<String>,
    pub in_current_month: bool,
    pub tasks: Vec<DeliveryTask>,
}

impl CalendarDay {
    fn blank() -> Self {
        Self {
            date: None,
            date_key: None,
            in_current_month: false,
            tasks: Vec::new(),
        }
    }

    fn for_date(
        date: NaiveDate,
        in_current_month: bool,
        tasks_by_date: &BTreeMap<String, Vec<DeliveryTask>>,
    ) -> Self {
        let key = date_key(date);
        let tasks = tasks_by_date.get(&key).cloned().unwrap_or_default();
        Self {
            date: Some(date),
            date_key: Some(key),
            in_current_month,
            tasks,
        }
    }
}

pub fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, AppError> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::BadRequest(format!("invalid month {year}-{month:02}")))
}

pub fn last_of_month(year: i32, month: u32) -> Result<NaiveDate, AppError> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let next_first = first_of_month(next_year, next_month)?;
    next_first
        .pred_opt()
        .ok_or_else(|| AppError::BadRequest(format!("invalid month {year}-{month:02}")))
}

pub fn build_calendar_days(
    year: i32,
    month: u32,
    week_start: WeekStart,
    fill: FillMode,
    tasks_by_date: &BTreeMap<String, Vec<DeliveryTask>>,
) -> Result<Vec<CalendarDay>, AppError> {
    let first = first_of_month(year, month)?;
    let last = last_of_month(year, month)?;
    let leading = week_start.leading_cells(first);

    let mut days = Vec::with_capacity(DENSE_GRID_CELLS);

    match fill {
        FillMode::Sparse => days.extend((0..leading).map(|_| CalendarDay::blank())),
        FillMode::Dense => {
            for offset in (1..=leading).rev() {
                let date = first - Duration::days(offset as i64);
                days.push(CalendarDay::for_date(date, false, tasks_by_date));
            }
        }
    }

    for date in first.iter_days().take_while(|date| *date <= last) {
        days.push(CalendarDay::for_date(date, true, tasks_by_date));
    }

    if fill == FillMode::Dense {
        let mut next = last;
        while days.len() < DENSE_GRID_CELLS {
            next = next
                .succ_opt()
                .ok_or_else(|| AppError::Internal("calendar overflow".to_string()))?;
            days.push(CalendarDay::for_date(next, false, tasks_by_date));
        }
    }

    Ok(days)
}

pub fn weekday_labels(week_start: WeekStart) -> [Weekday; 7] {
    let first = match week_start {
        WeekStart::Sunday => Weekday::Sun,
        WeekStart::Monday => Weekday::Mon,
    };
    let mut labels = [first; 7];
    for index in 1..7 {
        labels[index] = labels[index - 1].succ();
    }
    labels
}
