mod context;
mod fetch;

pub use context::FetchJobContext;
pub use fetch::{
    FetchJobError, FetchOutcome, PLAN_AGE_MAXIMUM_DAYS, fetch_dates, group_by_date,
    run_fetch_job, spawn_fetch_loop,
};

pub(crate) use fetch::METRIC_FETCH_STORED_TOTAL;
