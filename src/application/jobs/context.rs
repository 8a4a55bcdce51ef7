use std::{sync::Arc, time::Duration};

use chrono_tz::Tz;

use crate::{application::source::PlanSource, cache::PlanCache};

/// Everything the fetch job needs to refresh the plan cache.
#[derive(Clone)]
pub struct FetchJobContext {
    pub cache: Arc<PlanCache>,
    pub source: Arc<dyn PlanSource>,
    /// Days after today to request from date-addressed sources.
    pub future_days: u32,
    pub timezone: Tz,
    pub interval: Duration,
}
