//! Plan lookups backing the `/plans` endpoints.

use std::sync::Arc;

use serde::Serialize;

use crate::application::catalog::CatalogService;
use crate::application::error::AppError;
use crate::cache::PlanCache;
use crate::domain::date::DateKey;
use crate::domain::error::DomainError;
use crate::domain::plans::{LineRecord, PlanRecord};

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub date: DateKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanteenRef {
    pub id: Option<String>,
    pub name: String,
}

/// A cached plan as presented to API clients.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    pub date: DateKey,
    pub canteen: CanteenRef,
    pub lines: Vec<LineRecord>,
}

impl From<PlanRecord> for PlanDetail {
    fn from(plan: PlanRecord) -> Self {
        Self {
            date: plan.date,
            canteen: CanteenRef {
                id: plan.id,
                name: plan.name,
            },
            lines: plan.lines,
        }
    }
}

/// Restriction of a plan to a set of canteens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanteenFilter {
    ids: Vec<String>,
}

impl CanteenFilter {
    /// Parse a comma list of unique canteen ids, each of which must be known.
    ///
    /// Duplicates collapse; empty items or unknown ids reject the whole filter.
    pub fn parse(raw: &str, catalog: &CatalogService) -> Result<Self, DomainError> {
        let invalid = || DomainError::validation("invalid filter: canteens");
        if raw.is_empty() {
            return Err(invalid());
        }
        let mut ids: Vec<String> = Vec::new();
        for item in raw.split(',') {
            if !catalog.is_known_canteen(item) {
                return Err(invalid());
            }
            if !ids.iter().any(|id| id == item) {
                ids.push(item.to_string());
            }
        }
        Ok(Self { ids })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    fn admits(&self, plan: &PlanRecord) -> bool {
        plan.id
            .as_ref()
            .is_some_and(|id| self.ids.iter().any(|wanted| wanted == id))
    }
}

#[derive(Clone)]
pub struct PlansService {
    cache: Arc<PlanCache>,
}

impl PlansService {
    pub fn new(cache: Arc<PlanCache>) -> Self {
        Self { cache }
    }

    /// One summary per cached date, oldest first.
    pub async fn summaries(&self) -> Result<Vec<PlanSummary>, AppError> {
        let dates = self.cache.list().await?;
        Ok(dates.into_iter().map(|date| PlanSummary { date }).collect())
    }

    /// The cached plans for `date`, optionally restricted to some canteens.
    pub async fn plan(
        &self,
        date: &DateKey,
        filter: Option<&CanteenFilter>,
    ) -> Result<Vec<PlanDetail>, AppError> {
        let plans = self
            .cache
            .get(date)
            .await?
            .ok_or_else(|| DomainError::not_found("plan"))?;

        Ok(plans
            .into_iter()
            .filter(|plan| filter.is_none_or(|filter| filter.admits(plan)))
            .map(PlanDetail::from)
            .collect())
    }
}
