//! JSON routes over the statistics API.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};
use waza_core::TechniqueFilters;
use waza_storage::{JudokaStatsService, ResultCache, StatsService};
use waza_sync::CrawlPipeline;

pub const CRATE_NAME: &str = "waza-web";

pub const DEFAULT_TOP_LIMIT: u32 = 10;
pub const DEFAULT_PER_GROUP: usize = 5;

/// Query parameters that are not technique filters.
const PAGING_PARAMS: [&str; 2] = ["limit", "perGroup"];

#[derive(Clone)]
pub struct AppState {
    pub stats: StatsService,
    pub judoka: JudokaStatsService,
    /// Backs on-demand profile lookups; absent means stored profiles only.
    pub profiles: Option<Arc<CrawlPipeline>>,
}

impl AppState {
    pub fn new(pipeline: Arc<CrawlPipeline>, cache: Arc<ResultCache>) -> Self {
        let db = pipeline.database().clone();
        Self {
            stats: StatsService::new(db.clone(), cache.clone()),
            judoka: JudokaStatsService::new(db, cache),
            profiles: Some(pipeline),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/stats/overview", get(overview_handler))
        .route("/api/stats/top-techniques", get(top_techniques_handler))
        .route("/api/stats/score-groups", get(score_groups_handler))
        .route("/api/stats/score-groups/top", get(score_group_top_handler))
        .route("/api/stats/techniques", get(catalog_handler))
        .route("/api/filters/options", get(filter_options_handler))
        .route("/api/filters/height-ranges", get(height_ranges_handler))
        .route("/api/competitions", get(competitions_handler))
        .route("/api/judoka/{id}", get(judoka_handler))
        .route("/api/judoka/{id}/received", get(judoka_received_handler))
        .route("/api/judoka/{id}/profile", get(judoka_profile_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving waza api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub fn port_from_env() -> u16 {
    std::env::var("WAZA_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}

type Params = Query<HashMap<String, String>>;

async fn overview_handler(State(state): State<Arc<AppState>>, Query(params): Params) -> Response {
    let filters = match filters_from(&params) {
        Ok(filters) => filters,
        Err(resp) => return resp,
    };
    json_or_error(state.stats.overview(&filters).await)
}

async fn top_techniques_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Response {
    let filters = match filters_from(&params) {
        Ok(filters) => filters,
        Err(resp) => return resp,
    };
    let limit = match number_param(&params, "limit", DEFAULT_TOP_LIMIT) {
        Ok(limit) => limit,
        Err(resp) => return resp,
    };
    json_or_error(state.stats.top_techniques(&filters, limit).await)
}

async fn score_groups_handler(State(state): State<Arc<AppState>>, Query(params): Params) -> Response {
    let filters = match filters_from(&params) {
        Ok(filters) => filters,
        Err(resp) => return resp,
    };
    json_or_error(state.stats.score_group_counts(&filters).await)
}

async fn score_group_top_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Params,
) -> Response {
    let filters = match filters_from(&params) {
        Ok(filters) => filters,
        Err(resp) => return resp,
    };
    let per_group = match number_param(&params, "perGroup", DEFAULT_PER_GROUP) {
        Ok(per_group) => per_group,
        Err(resp) => return resp,
    };
    json_or_error(
        state
            .stats
            .top_techniques_by_score_group(&filters, per_group)
            .await,
    )
}

async fn catalog_handler(State(state): State<Arc<AppState>>, Query(params): Params) -> Response {
    let filters = match filters_from(&params) {
        Ok(filters) => filters,
        Err(resp) => return resp,
    };
    json_or_error(state.stats.technique_catalog(&filters).await)
}

async fn filter_options_handler(State(state): State<Arc<AppState>>) -> Response {
    json_or_error(state.stats.filter_options().await)
}

async fn height_ranges_handler(State(state): State<Arc<AppState>>) -> Response {
    json_or_error(state.stats.height_ranges().await)
}

async fn competitions_handler(State(state): State<Arc<AppState>>) -> Response {
    json_or_error(state.stats.list_competitions().await)
}

async fn judoka_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(params): Params,
) -> Response {
    let filters = match filters_from(&params) {
        Ok(filters) => filters,
        Err(resp) => return resp,
    };
    json_or_error(state.judoka.stats_for(&id, &filters).await)
}

async fn judoka_received_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(params): Params,
) -> Response {
    let filters = match filters_from(&params) {
        Ok(filters) => filters,
        Err(resp) => return resp,
    };
    json_or_error(state.judoka.received_stats_for(&id, &filters).await)
}

async fn judoka_profile_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(params): Params,
) -> Response {
    let Some(pipeline) = &state.profiles else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "profile lookup disabled");
    };
    let force = params
        .get("force")
        .is_some_and(|v| matches!(v.as_str(), "1" | "true"));
    match pipeline.lookup_profile(&id, force).await {
        Ok(Some(profile)) => Json(profile).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "judoka profile not found"),
        Err(err) => server_error(err),
    }
}

fn filters_from(params: &HashMap<String, String>) -> Result<TechniqueFilters, Response> {
    TechniqueFilters::from_pairs(
        params
            .iter()
            .filter(|(key, _)| !PAGING_PARAMS.contains(&key.as_str()) && key.as_str() != "force")
            .map(|(key, value)| (key.as_str(), value.as_str())),
    )
    .map_err(|err| error_response(StatusCode::BAD_REQUEST, &err.to_string()))
}

fn number_param<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, Response> {
    match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| error_response(StatusCode::BAD_REQUEST, &format!("invalid {key}: {raw}"))),
    }
}

fn json_or_error<T: Serialize>(result: anyhow::Result<T>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => server_error(err),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %format!("{err:#}"), "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;
    use waza_adapters::FixtureJudoApi;
    use waza_storage::{CacheConfig, Database};
    use waza_sync::CrawlOptions;

    async fn crawled_app() -> Router {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/ijf")
            .canonicalize()
            .expect("fixture root");
        let db = Database::in_memory().await.expect("db");
        let cache = Arc::new(ResultCache::new(CacheConfig::default()));
        let pipeline = CrawlPipeline::new(Arc::new(FixtureJudoApi::from_dir(root)), db)
            .with_cache(cache.clone());
        pipeline
            .run_crawl(&CrawlOptions::default())
            .await
            .expect("crawl");
        app(AppState::new(Arc::new(pipeline), cache))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = resp.status();
        let body = resp.into_body().collect().await.expect("body").to_bytes();
        (status, serde_json::from_slice(&body).expect("json body"))
    }

    #[tokio::test]
    async fn overview_and_top_techniques() {
        let app = crawled_app().await;

        let (status, overview) = get_json(&app, "/api/stats/overview").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(overview["totalTechniques"], 6);
        assert_eq!(overview["totalCompetitions"], 2);

        let (status, top) = get_json(&app, "/api/stats/top-techniques?limit=1").await;
        assert_eq!(status, StatusCode::OK);
        let top = top.as_array().expect("array");
        assert_eq!(top.len(), 1);
        assert_eq!(top[0]["name"], "uchi-mata");
        assert_eq!(top[0]["count"], 2);
    }

    #[tokio::test]
    async fn filters_are_parsed_from_camel_case_params() {
        let app = crawled_app().await;

        let (status, overview) =
            get_json(&app, "/api/stats/overview?gender=w&eventType=grand-slam").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(overview["totalTechniques"], 2);

        let (status, body) = get_json(&app, "/api/stats/overview?scoreGroup=Bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("message").contains("Bogus"));

        let (status, _) = get_json(&app, "/api/stats/top-techniques?limit=lots").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn judoka_routes_and_profile_lookup() {
        let app = crawled_app().await;

        let (status, stats) = get_json(&app, "/api/judoka/101").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalTechniques"], 3);

        let (status, received) = get_json(&app, "/api/judoka/102/received").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(received["totalTechniques"], 2);

        let (status, profile) = get_json(&app, "/api/judoka/102/profile").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["height"], 178);

        let (status, _) = get_json(&app, "/api/judoka/999/profile").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn catalog_and_reference_routes_respond() {
        let app = crawled_app().await;
        for uri in [
            "/api/stats/score-groups",
            "/api/stats/score-groups/top?perGroup=2",
            "/api/stats/techniques",
            "/api/filters/options",
            "/api/filters/height-ranges",
            "/api/competitions",
        ] {
            let (status, body) = get_json(&app, uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert!(body.is_array() || body.is_object(), "{uri}");
        }
    }
}
