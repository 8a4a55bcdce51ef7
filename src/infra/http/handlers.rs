use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::{Map, Value};

use crate::application::error::AppError;
use crate::application::plans::{CanteenFilter, PlanDetail, PlanSummary};
use crate::domain::catalog::{Canteen, LegendItem, Line};
use crate::domain::date::DateKey;
use crate::domain::error::DomainError;

use super::response::{ApiSuccess, ok};
use super::state::HttpState;

type ApiResult<T> = Result<Json<ApiSuccess<T>>, AppError>;

const CANTEENS_QUERY_KEY: &str = "canteens";

pub async fn index() -> Json<ApiSuccess<Map<String, Value>>> {
    ok(Map::new())
}

pub async fn legend(State(state): State<HttpState>) -> Json<ApiSuccess<Vec<LegendItem>>> {
    ok(state.catalog.legend().to_vec())
}

pub async fn list_canteens(State(state): State<HttpState>) -> Json<ApiSuccess<Vec<Canteen>>> {
    ok(state.catalog.canteens().to_vec())
}

pub async fn get_canteen(
    State(state): State<HttpState>,
    Path(canteen_id): Path<String>,
) -> ApiResult<Canteen> {
    Ok(ok(state.catalog.canteen(&canteen_id)?.clone()))
}

pub async fn list_lines(
    State(state): State<HttpState>,
    Path(canteen_id): Path<String>,
) -> ApiResult<Vec<Line>> {
    Ok(ok(state.catalog.lines(&canteen_id)?.to_vec()))
}

pub async fn get_line(
    State(state): State<HttpState>,
    Path((canteen_id, line_id)): Path<(String, String)>,
) -> ApiResult<Line> {
    Ok(ok(state.catalog.line(&canteen_id, &line_id)?.clone()))
}

pub async fn list_plans(State(state): State<HttpState>) -> ApiResult<Vec<PlanSummary>> {
    Ok(ok(state.plans.summaries().await?))
}

pub async fn get_plan(
    State(state): State<HttpState>,
    Path(date): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApiResult<Vec<PlanDetail>> {
    // Only `YYYY-MM-DD`-shaped segments belong to this route.
    if !DateKey::has_canonical_shape(&date) {
        return Err(route_not_found_error());
    }
    let date: DateKey = date
        .parse()
        .map_err(|_| DomainError::validation("malformed date"))?;
    let filter = canteens_filter(&state, &query)?;

    Ok(ok(state.plans.plan(&date, filter.as_ref()).await?))
}

fn canteens_filter(
    state: &HttpState,
    query: &[(String, String)],
) -> Result<Option<CanteenFilter>, DomainError> {
    let mut values = query
        .iter()
        .filter(|(key, _)| key == CANTEENS_QUERY_KEY)
        .map(|(_, value)| value.as_str());
    match (values.next(), values.next()) {
        (None, _) => Ok(None),
        (Some(raw), None) => CanteenFilter::parse(raw, &state.catalog).map(Some),
        (Some(_), Some(_)) => Err(DomainError::validation("invalid filter: canteens")),
    }
}

fn route_not_found_error() -> AppError {
    AppError::from(DomainError::not_found("route"))
}

pub async fn route_not_found() -> AppError {
    route_not_found_error()
}
