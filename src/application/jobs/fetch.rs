//! Periodic refresh of the plan cache from the upstream source.

use std::collections::BTreeMap;

use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::application::source::{FetchRequest, SourceError, SourceKind};
use crate::cache::CacheError;
use crate::domain::date::{DateKey, DateKeyError};
use crate::domain::plans::PlanRecord;
use crate::util::timezone::today_in;

use super::context::FetchJobContext;

/// Plans dated this many days (or more) before today are not stored; such
/// dates almost always come from a misparsed month or year upstream.
pub const PLAN_AGE_MAXIMUM_DAYS: i64 = 10;

pub(crate) const METRIC_FETCH_STORED_TOTAL: &str = "mensa_fetch_stored_total";

#[derive(Debug, Error)]
pub enum FetchJobError {
    #[error("failed to fetch plans from the {kind} source")]
    Source {
        kind: SourceKind,
        #[source]
        source: SourceError,
    },
    #[error("failed to determine today's date")]
    Clock(#[source] DateKeyError),
}

/// Summary of one fetch run.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub stored: Vec<DateKey>,
    /// Dates dropped for being implausibly old.
    pub rejected: Vec<DateKey>,
    pub failures: Vec<(DateKey, CacheError)>,
    /// Absent markers dropped from the cache's presence tracker.
    pub forgotten: usize,
}

/// `today` followed by the next `future_days` dates.
pub fn fetch_dates(today: DateKey, future_days: u32) -> Vec<DateKey> {
    std::iter::successors(Some(today), DateKey::next_day)
        .take(future_days as usize + 1)
        .collect()
}

/// Group plans by their date, keeping upstream order within each date.
pub fn group_by_date(plans: Vec<PlanRecord>) -> BTreeMap<DateKey, Vec<PlanRecord>> {
    let mut grouped: BTreeMap<DateKey, Vec<PlanRecord>> = BTreeMap::new();
    for plan in plans {
        grouped.entry(plan.date).or_default().push(plan);
    }
    grouped
}

fn request_for(kind: SourceKind, today: DateKey, future_days: u32) -> FetchRequest {
    match kind {
        SourceKind::SimpleSite => FetchRequest::Dates(fetch_dates(today, future_days)),
        SourceKind::JsonApi => FetchRequest::Current,
    }
}

/// Fetch plans once and store every plausible date.
///
/// A source failure ends the run before the cache is touched. Storage faults
/// for one date do not prevent the remaining dates from being stored.
pub async fn run_fetch_job(
    ctx: &FetchJobContext,
    today: DateKey,
) -> Result<FetchOutcome, FetchJobError> {
    let kind = ctx.source.kind();
    info!(target = "mensa::fetch", source = %kind, %today, "Fetching plans");

    let request = request_for(kind, today, ctx.future_days);
    let plans = ctx
        .source
        .fetch(&request)
        .await
        .map_err(|source| FetchJobError::Source { kind, source })?;

    let mut outcome = FetchOutcome::default();
    for (date, plans) in group_by_date(plans) {
        if today.days_since(&date) >= PLAN_AGE_MAXIMUM_DAYS {
            warn!(
                target = "mensa::fetch",
                %date,
                "Data will not be stored due to its age"
            );
            outcome.rejected.push(date);
            continue;
        }

        let canteens = plans
            .iter()
            .map(|plan| plan.id.as_deref().unwrap_or("null"))
            .collect::<Vec<_>>()
            .join(",");
        info!(
            target = "mensa::fetch",
            %date,
            count = plans.len(),
            canteens = %canteens,
            "Caching plans"
        );

        match ctx.cache.put(&date, &plans).await {
            Ok(()) => {
                counter!(METRIC_FETCH_STORED_TOTAL).increment(1);
                outcome.stored.push(date);
            }
            Err(err) => {
                error!(
                    target = "mensa::fetch",
                    %date,
                    error = %err,
                    "Failed to store fetched plans"
                );
                outcome.failures.push((date, err));
            }
        }
    }

    outcome.forgotten = ctx
        .cache
        .forget_absent(|date| within_window(today, ctx.future_days, date));

    Ok(outcome)
}

/// Whether `date` falls in the range a fetch run can store.
fn within_window(today: DateKey, future_days: u32, date: &DateKey) -> bool {
    today.days_since(date) < PLAN_AGE_MAXIMUM_DAYS
        && date.days_since(&today) <= i64::from(future_days)
}

/// Run the fetch job now and then once per configured interval, forever.
pub fn spawn_fetch_loop(ctx: FetchJobContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ctx.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let result = match today_in(ctx.timezone) {
                Ok(today) => run_fetch_job(&ctx, today).await,
                Err(err) => Err(FetchJobError::Clock(err)),
            };
            match result {
                Ok(outcome) => info!(
                    target = "mensa::fetch",
                    stored = outcome.stored.len(),
                    rejected = outcome.rejected.len(),
                    failures = outcome.failures.len(),
                    forgotten = outcome.forgotten,
                    "Fetch run finished"
                ),
                Err(err) => error!(
                    target = "mensa::fetch",
                    error = %err,
                    cause = ?std::error::Error::source(&err).map(|cause| cause.to_string()),
                    "Fetch run failed"
                ),
            }
        }
    })
}
