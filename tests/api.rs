use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use mensa::application::catalog::CatalogService;
use mensa::application::plans::PlansService;
use mensa::cache::{MemoryStorage, PlanCache, entry_name};
use mensa::config::ServerSettings;
use mensa::domain::date::DateKey;
use mensa::domain::plans::{LineRecord, PlanRecord};
use mensa::infra::catalog::StaticCatalog;
use mensa::infra::http::{self, HttpState};

fn date(input: &str) -> DateKey {
    input.parse().expect("valid date")
}

fn server(base: &str, cors_allow_origin: Option<&str>) -> ServerSettings {
    ServerSettings {
        addr: "127.0.0.1:0".parse().expect("addr"),
        base: base.to_string(),
        cors_allow_origin: cors_allow_origin.map(str::to_string),
    }
}

async fn seeded_cache() -> Arc<PlanCache> {
    let cache = Arc::new(PlanCache::new(Arc::new(MemoryStorage::new())));
    let day = date("2022-09-02");
    cache
        .put(
            &day,
            &[
                PlanRecord::new(day, "Mensa Am Adenauerring")
                    .with_id("adenauerring")
                    .with_lines(vec![LineRecord::new("Linie 1").with_id("l1").with_meals(vec![
                        json!({ "name": "Linsen mit Spätzle", "classifiers": ["VG"] }),
                    ])]),
                PlanRecord::new(day, "Mensa Moltkestraße").with_id("moltke"),
                PlanRecord::new(day, "Pop-up Mensa"),
            ],
        )
        .await
        .expect("seed plans");
    let later = date("2022-09-05");
    cache
        .put(&later, &[PlanRecord::new(later, "Mensa Moltkestraße").with_id("moltke")])
        .await
        .expect("seed plans");
    cache
}

fn router_with(cache: Arc<PlanCache>, settings: &ServerSettings) -> Router {
    let catalog = StaticCatalog::bundled().expect("bundled catalog");
    let state = HttpState {
        plans: PlansService::new(cache),
        catalog: CatalogService::new(Arc::new(catalog)),
    };
    http::build_router(state, settings).expect("router")
}

async fn router() -> Router {
    router_with(seeded_cache().await, &server("/", None))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = serde_json::from_slice(&body).expect("json body");
    (status, json)
}

#[tokio::test]
async fn index_returns_an_empty_object() {
    let app = router().await;
    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "data": {} }));
}

#[tokio::test]
async fn serves_the_legend() {
    let app = router().await;
    let (status, body) = get(&app, "/meta/legend").await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"].as_array().expect("legend array");
    assert!(items.iter().any(|item| item["short"] == "VG"));
}

#[tokio::test]
async fn serves_canteens_and_lines() {
    let app = router().await;

    let (status, body) = get(&app, "/canteens").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().expect("canteens").len(), 7);

    let (status, body) = get(&app, "/canteens/adenauerring").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Mensa Am Adenauerring");

    let (status, body) = get(&app, "/canteens/adenauerring/lines").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "l1");

    let (status, body) = get(&app, "/canteens/adenauerring/lines/l45").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Linie 4");
}

#[tokio::test]
async fn unknown_catalog_entries_are_not_found() {
    let app = router().await;

    for (uri, message) in [
        ("/canteens/nowhere", "canteen not found"),
        ("/canteens/nowhere/lines", "canteen not found"),
        ("/canteens/nowhere/lines/l1", "canteen not found"),
        ("/canteens/adenauerring/lines/l99", "line not found"),
    ] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, json!({ "error": message }), "{uri}");
    }
}

#[tokio::test]
async fn lists_cached_dates_in_order() {
    let app = router().await;
    let (status, body) = get(&app, "/plans").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([
            { "date": { "year": 2022, "month": 8, "day": 2 } },
            { "date": { "year": 2022, "month": 8, "day": 5 } },
        ])
    );
}

#[tokio::test]
async fn empty_cache_lists_no_plans() {
    let app = router_with(
        Arc::new(PlanCache::new(Arc::new(MemoryStorage::new()))),
        &server("/", None),
    );
    let (status, body) = get(&app, "/plans").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "data": [] }));
}

#[tokio::test]
async fn serves_all_plans_for_a_date() {
    let app = router().await;
    let (status, body) = get(&app, "/plans/2022-09-02").await;
    assert_eq!(status, StatusCode::OK);

    let plans = body["data"].as_array().expect("plans");
    assert_eq!(plans.len(), 3);
    assert_eq!(
        plans[0]["canteen"],
        json!({ "id": "adenauerring", "name": "Mensa Am Adenauerring" })
    );
    assert_eq!(plans[0]["date"], json!({ "year": 2022, "month": 8, "day": 2 }));
    assert_eq!(plans[0]["lines"][0]["meals"][0]["classifiers"], json!(["VG"]));
    assert_eq!(plans[2]["canteen"], json!({ "id": null, "name": "Pop-up Mensa" }));
}

#[tokio::test]
async fn canteen_filter_restricts_plans() {
    let app = router().await;

    let (status, body) = get(&app, "/plans/2022-09-02?canteens=moltke").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&Value> = body["data"]
        .as_array()
        .expect("plans")
        .iter()
        .map(|plan| &plan["canteen"]["id"])
        .collect();
    assert_eq!(ids, vec![&json!("moltke")]);

    let (status, body) = get(&app, "/plans/2022-09-02?canteens=moltke,adenauerring,moltke").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().expect("plans").len(), 2);

    let (status, body) = get(&app, "/plans/2022-09-02?canteens=erzberger").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn invalid_canteen_filters_are_rejected() {
    let app = router().await;

    for query in [
        "canteens=",
        "canteens=nowhere",
        "canteens=moltke,",
        "canteens=moltke,nowhere",
        "canteens=moltke&canteens=adenauerring",
    ] {
        let uri = format!("/plans/2022-09-02?{query}");
        let (status, body) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body, json!({ "error": "invalid filter: canteens" }), "{uri}");
    }

    // The filter is validated even when no plan exists for the date.
    let (status, body) = get(&app, "/plans/2022-09-03?canteens=nowhere").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "invalid filter: canteens" }));
}

#[tokio::test]
async fn date_errors_are_distinguished() {
    let app = router().await;

    let (status, body) = get(&app, "/plans/2022-02-30").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "malformed date" }));

    for uri in ["/plans/2022-9-2", "/plans/today", "/plans/2022-09-02x"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body, json!({ "error": "route not found" }), "{uri}");
    }

    let (status, body) = get(&app, "/plans/2022-09-03").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "plan not found" }));
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = router().await;
    let (status, body) = get(&app, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "route not found" }));
}

#[tokio::test]
async fn storage_faults_are_internal_errors() {
    let day = date("2022-09-02");
    let storage =
        MemoryStorage::with_entries([(entry_name(&day), Bytes::from_static(b"not a plan list"))]);
    let app = router_with(
        Arc::new(PlanCache::new(Arc::new(storage))),
        &server("/", None),
    );

    let (status, body) = get(&app, "/plans/2022-09-02").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "internal_server_error" }));
}

#[tokio::test]
async fn routes_mount_under_the_configured_base() {
    let app = router_with(seeded_cache().await, &server("/api", None));

    let (status, body) = get(&app, "/api/canteens/moltke").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "moltke");

    let (status, _) = get(&app, "/api/plans/2022-09-05").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/canteens/moltke").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "route not found" }));

    let (status, body) = get(&app, "/api/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "route not found" }));
}

#[tokio::test]
async fn cors_origin_is_advertised_when_configured() {
    let origin = "https://mensa.example.org";
    let app = router_with(seeded_cache().await, &server("/", Some(origin)));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/canteens")
        .header(header::ORIGIN, origin)
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok()),
        Some(origin)
    );
}

#[tokio::test]
async fn cors_headers_are_absent_by_default() {
    let app = router().await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/canteens")
        .header(header::ORIGIN, "https://mensa.example.org")
        .body(Body::empty())
        .expect("request should build");
    let response = app.oneshot(request).await.expect("router should respond");

    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = router().await;
    for uri in ["/canteens", "/nowhere"] {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = app.clone().oneshot(request).await.expect("router should respond");
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .expect("request id header");
        assert_eq!(request_id.len(), 36, "{uri}");
    }
}
