//! Cache reconciliation: fill in ids that were unknown when plans were stored.

use metrics::counter;
use tracing::{debug, info, warn};

use crate::application::catalog::ReferenceCatalog;
use crate::cache::{CacheError, PlanCache};
use crate::domain::date::DateKey;
use crate::domain::plans::{LineRecord, PlanRecord};

pub(crate) const METRIC_FIXUP_RECONCILED_TOTAL: &str = "mensa_fixup_reconciled_total";

/// A date whose entry could not be read or written during a pass.
#[derive(Debug)]
pub struct FixupFailure {
    pub date: DateKey,
    pub error: CacheError,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct FixupReport {
    /// Dates listed in the cache.
    pub scanned: usize,
    /// Dates whose plans changed and were handed to the decision callback.
    pub reconciled: Vec<DateKey>,
    /// Dates actually written back.
    pub written: Vec<DateKey>,
    pub failures: Vec<FixupFailure>,
}

impl FixupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rebuild one plan with any resolvable missing ids filled in.
///
/// A known canteen id is never replaced. Line ids are resolved only once the
/// canteen id is known, and only where they are missing. Nothing else changes.
pub fn fixup_plan(plan: &PlanRecord, catalog: &dyn ReferenceCatalog) -> PlanRecord {
    let canteen_id = match plan.id.as_deref() {
        Some(id) => Some(id.to_string()),
        None => catalog.match_canteen_by_name(&plan.name).map(str::to_string),
    };
    let Some(canteen_id) = canteen_id else {
        return plan.clone();
    };

    let lines = plan
        .lines
        .iter()
        .map(|line| match line.id {
            Some(_) => line.clone(),
            None => LineRecord {
                id: catalog
                    .match_line_by_name(&canteen_id, &line.name)
                    .map(str::to_string),
                ..line.clone()
            },
        })
        .collect();

    PlanRecord {
        id: Some(canteen_id),
        lines,
        ..plan.clone()
    }
}

/// Reconcile every cached date against `catalog`.
///
/// `decide` is called once for each date whose plans would change; returning
/// `false` skips the write (dry run). Dates that are already complete cause
/// neither a callback nor a write. A fault while listing aborts the pass;
/// faults on individual dates are collected in the report.
pub async fn fixup_cache<F>(
    cache: &PlanCache,
    catalog: &dyn ReferenceCatalog,
    mut decide: F,
) -> Result<FixupReport, CacheError>
where
    F: FnMut(&DateKey) -> bool,
{
    let dates = cache.list().await?;
    let mut report = FixupReport {
        scanned: dates.len(),
        ..FixupReport::default()
    };

    for date in dates {
        let plans = match cache.get(&date).await {
            Ok(Some(plans)) => plans,
            Ok(None) => continue,
            Err(error) => {
                warn!(
                    target = "mensa::fixup",
                    %date,
                    error = %error,
                    "Skipping unreadable cache entry"
                );
                report.failures.push(FixupFailure { date, error });
                continue;
            }
        };

        let fixed: Vec<PlanRecord> = plans
            .iter()
            .map(|plan| fixup_plan(plan, catalog))
            .collect();
        if fixed == plans {
            debug!(target = "mensa::fixup", %date, "Cache entry already complete");
            continue;
        }

        report.reconciled.push(date);
        counter!(METRIC_FIXUP_RECONCILED_TOTAL).increment(1);
        if !decide(&date) {
            continue;
        }

        match cache.put(&date, &fixed).await {
            Ok(()) => report.written.push(date),
            Err(error) => {
                warn!(
                    target = "mensa::fixup",
                    %date,
                    error = %error,
                    "Failed to write reconciled cache entry"
                );
                report.failures.push(FixupFailure { date, error });
            }
        }
    }

    info!(
        target = "mensa::fixup",
        scanned = report.scanned,
        reconciled = report.reconciled.len(),
        written = report.written.len(),
        failures = report.failures.len(),
        "Cache reconciliation finished"
    );
    Ok(report)
}
