use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use edgeside_bindings::Env;

/// Type-erased scheduled handler stored on a worker.
pub type ScheduledHandler =
    Arc<dyn Fn(ScheduledEvent, Env) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A five-field cron expression (minute, hour, day-of-month, month, day-of-week)
/// evaluated against UTC wall-clock time at one-minute granularity.
///
/// Supported field syntax: `*`, plain numbers, comma lists (`1,15,30`),
/// ranges (`9-17`), and step expressions over the whole range (`*/5`).
/// Day-of-week runs Sunday=0 through Saturday=6, with 7 accepted as an
/// alias for Sunday.
#[derive(Clone, Debug)]
pub struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

#[derive(Clone, Debug)]
enum CronField {
    Any,
    Step(u32),
    Values(Vec<u32>),
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Step(step) => value % step == 0,
            CronField::Values(values) => values.contains(&value),
        }
    }

    fn is_restricted(&self) -> bool {
        !matches!(self, CronField::Any)
    }
}

impl CronSchedule {
    /// Parses a cron expression.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ScheduleError::FieldCount {
                expr: expr.to_owned(),
                found: parts.len(),
            });
        }

        Ok(Self {
            minute: parse_field(parts[0], "minute", 0, 59)?,
            hour: parse_field(parts[1], "hour", 0, 23)?,
            day_of_month: parse_field(parts[2], "day-of-month", 1, 31)?,
            month: parse_field(parts[3], "month", 1, 12)?,
            day_of_week: parse_field(parts[4], "day-of-week", 0, 7)?,
        })
    }

    /// Returns whether the schedule fires at the given instant, truncated to
    /// the containing minute.
    ///
    /// Follows classic cron semantics for the two day fields: when both
    /// day-of-month and day-of-week are restricted, either one matching is
    /// enough.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !self.minute.matches(at.minute()) || !self.hour.matches(at.hour()) {
            return false;
        }
        if !self.month.matches(at.month()) {
            return false;
        }

        let dom_ok = self.day_of_month.matches(at.day());
        let dow_ok = self.day_of_week.matches(at.weekday().num_days_from_sunday());

        if self.day_of_month.is_restricted() && self.day_of_week.is_restricted() {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        }
    }
}

fn parse_field(raw: &str, name: &'static str, min: u32, max: u32) -> Result<CronField, ScheduleError> {
    let invalid = || ScheduleError::InvalidField {
        field: name,
        value: raw.to_owned(),
    };

    if raw == "*" {
        return Ok(CronField::Any);
    }

    if let Some(step) = raw.strip_prefix("*/") {
        let step: u32 = step.parse().map_err(|_| invalid())?;
        if step == 0 || step > max {
            return Err(invalid());
        }
        return Ok(CronField::Step(step));
    }

    let mut values = Vec::new();
    for part in raw.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| invalid())?;
            let hi: u32 = hi.parse().map_err(|_| invalid())?;
            if lo > hi || lo < min || hi > max {
                return Err(invalid());
            }
            values.extend(lo..=hi);
        } else {
            let value: u32 = part.parse().map_err(|_| invalid())?;
            if value < min || value > max {
                return Err(invalid());
            }
            values.push(value);
        }
    }

    if values.is_empty() {
        return Err(invalid());
    }

    // Cron allows 7 as an alias for Sunday in the day-of-week field.
    if name == "day-of-week" {
        for value in &mut values {
            if *value == 7 {
                *value = 0;
            }
        }
    }

    Ok(CronField::Values(values))
}

/// Errors from parsing a cron expression.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("cron expression `{expr}` must have 5 fields, found {found}")]
    FieldCount { expr: String, found: usize },
    #[error("invalid cron {field} field: `{value}`")]
    InvalidField { field: &'static str, value: String },
}

/// A single firing of a cron trigger, handed to the worker's scheduled handler.
#[derive(Clone, Debug)]
pub struct ScheduledEvent {
    /// The cron expression that fired.
    pub cron: String,
    /// The minute boundary the firing was scheduled for.
    pub scheduled_for: DateTime<Utc>,
}

/// A parsed trigger paired with its source expression.
#[derive(Clone, Debug)]
pub(crate) struct ScheduledTrigger {
    pub(crate) schedule: CronSchedule,
    pub(crate) expr: String,
}

/// Wakes at every minute boundary and fires the handler for each matching
/// trigger. Handler invocations run as detached tasks so a slow handler
/// cannot delay the next tick.
pub(crate) async fn drive(triggers: Vec<ScheduledTrigger>, handler: ScheduledHandler, env: Env) {
    loop {
        let now = Utc::now();
        let boundary = match next_minute_boundary(now) {
            Some(boundary) => boundary,
            None => {
                error!("cron driver cannot compute the next minute boundary, stopping");
                return;
            }
        };

        let wait = (boundary - now)
            .to_std()
            .unwrap_or(Duration::from_secs(60));
        tokio::time::sleep(wait).await;

        for trigger in &triggers {
            if trigger.schedule.matches(boundary) {
                debug!(cron = %trigger.expr, at = %boundary, "cron trigger fired");
                let event = ScheduledEvent {
                    cron: trigger.expr.clone(),
                    scheduled_for: boundary,
                };
                tokio::spawn(handler(event, env.clone()));
            }
        }
    }
}

fn next_minute_boundary(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let truncated = now
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))?;
    let boundary = truncated + chrono::Duration::minutes(1);
    if boundary <= now {
        warn!("clock went backwards while computing the next cron tick");
    }
    Some(boundary)
}
