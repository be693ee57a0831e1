use crate::cluster::{self, Cluster};
use crate::config::{BaseLayerConfig, ClusterConfig, MapConfig, SearchConfig};
use crate::context::AppContext;
use crate::export::{self, ExportKind};
use crate::layers::{self, FocusView, LayerSet};
use crate::search::{self, SearchHit};
use crate::stats::Legend;
use crate::types::{lookup_key, Category, PlaceDetail, PlaceId};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geo::{coord, Rect};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

pub type AppState = Arc<AppContext>;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn not_found(what: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, what.to_string())
}

fn bad_request(what: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, what.to_string())
}

pub fn create_router(state: AppState) -> Router {
    let tile_service = ServeDir::new(&state.config.output.tile_dir);
    let page_service = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/view", get(view_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/search", get(search_handler))
        .route("/api/places/:id", get(place_handler))
        .route("/api/focus", get(focus_handler))
        .route("/api/toggle", get(toggle_handler))
        .route("/api/layers/:category", get(layer_handler))
        .route("/api/clusters", get(clusters_handler))
        .route("/api/export/:kind", get(export_handler))
        .nest_service("/tiles", tile_service)
        .fallback_service(page_service)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(ctx: AppContext) -> Result<()> {
    let port = ctx.config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let app = create_router(Arc::new(ctx));

    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct CategoryView {
    category: Category,
    label: String,
    color: String,
    radius: f64,
    z_index: u32,
    status: &'static str,
}

#[derive(Serialize)]
struct ViewResponse {
    map: MapConfig,
    base: Option<BaseLayerConfig>,
    categories: Vec<CategoryView>,
    search: SearchConfig,
    clustering: ClusterConfig,
}

async fn view_handler(State(state): State<AppState>) -> Json<ViewResponse> {
    let config = &state.config;
    let categories = Category::ALL
        .into_iter()
        .map(|category| {
            let style = config.categories.style(category);
            CategoryView {
                category,
                label: style.label.clone(),
                color: style.color.clone(),
                radius: style.radius,
                z_index: style.z_index,
                status: category.status_text(),
            }
        })
        .collect();

    let base = layers::select_base(&config.map, &config.map.default_base).cloned();
    if base.is_none() {
        tracing::warn!("Default base layer '{}' is not configured", config.map.default_base);
    }

    Json(ViewResponse {
        map: config.map.clone(),
        base,
        categories,
        search: config.search.clone(),
        clustering: config.clustering.clone(),
    })
}

async fn stats_handler(State(state): State<AppState>) -> Json<Legend> {
    Json(Legend::new(&state.counts, &state.config.categories))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<SearchHit>> {
    Json(search::search(&state, &params.q))
}

async fn place_handler(
    State(state): State<AppState>,
    Path(id): Path<PlaceId>,
) -> ApiResult<PlaceDetail> {
    state
        .place(id)
        .map(|p| Json(PlaceDetail::from(p)))
        .ok_or_else(|| not_found(format!("no place with id {}", id)))
}

#[derive(Deserialize)]
struct LayersParam {
    layers: Option<String>,
}

fn parse_layers(raw: Option<&str>) -> Result<LayerSet, (StatusCode, String)> {
    match raw {
        Some(s) => s.parse().map_err(bad_request),
        None => Ok(LayerSet::default()),
    }
}

#[derive(Deserialize)]
struct FocusParams {
    name: String,
    #[serde(default)]
    province: String,
    layers: Option<String>,
}

async fn focus_handler(
    State(state): State<AppState>,
    Query(params): Query<FocusParams>,
) -> ApiResult<FocusView> {
    let visible = parse_layers(params.layers.as_deref())?;
    layers::focus_by_key(&state, &params.name, &params.province, visible)
        .map(Json)
        .ok_or_else(|| not_found(format!("no place {}", lookup_key(&params.name, &params.province))))
}

#[derive(Deserialize)]
struct ToggleParams {
    layers: Option<String>,
    category: String,
}

#[derive(Serialize)]
struct ToggleResponse {
    category: Category,
    visible: bool,
    layers: LayerSet,
}

async fn toggle_handler(Query(params): Query<ToggleParams>) -> ApiResult<ToggleResponse> {
    let mut layers = parse_layers(params.layers.as_deref())?;
    let category: Category = params.category.parse().map_err(bad_request)?;
    let visible = layers.toggle(category);
    Ok(Json(ToggleResponse { category, visible, layers }))
}

async fn layer_handler(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<FeatureCollection> {
    let category: Category = slug.parse().map_err(not_found)?;

    let features = state
        .in_category(category)
        .map(|p| {
            let mut properties = JsonObject::new();
            properties.insert("id".into(), p.id.into());
            properties.insert("name".into(), p.name.clone().into());
            properties.insert("province".into(), p.province.clone().into());
            properties.insert("category".into(), category.slug().into());
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::Point(vec![
                    p.longitude(),
                    p.latitude(),
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    Ok(Json(FeatureCollection { bbox: None, features, foreign_members: None }))
}

#[derive(Deserialize)]
struct ClusterParams {
    zoom: u8,
    /// west,south,east,north
    bbox: Option<String>,
    layers: Option<String>,
}

fn parse_bbox(raw: &str) -> Option<Rect<f64>> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [west, south, east, north] => Some(Rect::new(
            coord! { x: *west, y: *south },
            coord! { x: *east, y: *north },
        )),
        _ => None,
    }
}

async fn clusters_handler(
    State(state): State<AppState>,
    Query(params): Query<ClusterParams>,
) -> ApiResult<Vec<Cluster>> {
    let visible = parse_layers(params.layers.as_deref())?;
    let bounds = match params.bbox.as_deref() {
        Some(raw) => parse_bbox(raw).ok_or_else(|| bad_request("bbox must be west,south,east,north"))?,
        None => {
            let [[south, west], [north, east]] = state.config.map.max_bounds;
            Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north })
        }
    };
    Ok(Json(cluster::clusters(&state, params.zoom, &bounds, &visible)))
}

async fn export_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let kind: ExportKind = kind.parse().map_err(not_found)?;
    let body = export::render(kind, &state.places).map_err(|e| {
        tracing::error!("Export {} failed: {:#}", kind, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "export failed".to_string())
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", kind.filename()),
            ),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::types::{PlaceRecord, TierFlags};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn record(name: &str, province: &str, lat: f64, lon: f64, flags: TierFlags) -> PlaceRecord {
        PlaceRecord { name: name.into(), province: province.into(), latitude: lat, longitude: lon, flags }
    }

    fn setup_test_app() -> Router {
        let micro = TierFlags { micro_listed: true, short_listed: true, ..Default::default() };
        let ctx = AppContext::build(
            AppConfig::default(),
            vec![
                record("Saint-André", "QC", 47.67, -69.73, micro),
                record("St. Andrews", "NB", 45.07, -67.05, TierFlags::default()),
                record("Attawapiskat", "ON", 52.93, -82.43, TierFlags { indigenous: true, ..Default::default() }),
            ],
        );
        create_router(Arc::new(ctx))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_api_search_ranks_hits() {
        let (status, json) = get_json(setup_test_app(), "/api/search?q=st%20andr").await;
        assert_eq!(status, StatusCode::OK);
        let hits = json.as_array().unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["name"], "Saint-André");
        assert_eq!(hits[0]["category"], "micro");
        assert_eq!(hits[0]["score"], 60);
        assert_eq!(hits[1]["name"], "St. Andrews");
    }

    #[tokio::test]
    async fn test_api_search_short_query_is_empty() {
        let (status, json) = get_json(setup_test_app(), "/api/search?q=s").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_api_view_resolves_default_base() {
        let (status, json) = get_json(setup_test_app(), "/api/view").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["base"]["key"], "satellite");
        assert_eq!(json["map"]["focus_zoom"], 16);
        assert_eq!(json["search"]["debounce_ms"], 150);
        assert_eq!(json["categories"][2]["label"], "ShortList");
        assert_eq!(json["categories"][0]["z_index"], 630);
    }

    #[tokio::test]
    async fn test_api_stats_cumulative() {
        let (_, json) = get_json(setup_test_app(), "/api/stats").await;
        assert_eq!(json["total"], 3);
        let entries = json["entries"].as_array().unwrap();
        assert_eq!(entries[0]["category"], "indig");
        assert_eq!(entries[1]["cumulative"], 2);
        assert_eq!(entries[3]["count"], 1);
        assert_eq!(entries[3]["cumulative"], 3);
    }

    #[tokio::test]
    async fn test_api_place_detail_and_missing() {
        let (status, json) = get_json(setup_test_app(), "/api/places/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["province_name"], "Ontario");
        assert_eq!(json["status"], "First Nation, included in all lists");

        let (status, _) = get_json(setup_test_app(), "/api/places/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_focus_enables_layer() {
        let (status, json) =
            get_json(setup_test_app(), "/api/focus?name=Saint-Andr%C3%A9&province=QC&layers=full").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["place"]["id"], 0);
        assert_eq!(json["zoom"], 16);
        assert_eq!(json["layers"], serde_json::json!(["micro", "full"]));

        let (status, _) = get_json(setup_test_app(), "/api/focus?name=Saint-Andr%C3%A9&province=NB").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            get_json(setup_test_app(), "/api/focus?name=Saint-Andr%C3%A9&province=QC&layers=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_toggle_flips_one_layer() {
        let (status, json) = get_json(setup_test_app(), "/api/toggle?layers=indig,micro&category=micro").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["visible"], false);
        assert_eq!(json["layers"], serde_json::json!(["indig"]));

        let (_, json) = get_json(setup_test_app(), "/api/toggle?layers=&category=full").await;
        assert_eq!(json["visible"], true);
        assert_eq!(json["layers"], serde_json::json!(["full"]));

        let (status, _) = get_json(setup_test_app(), "/api/toggle?category=fn").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_layer_geojson() {
        let (status, json) = get_json(setup_test_app(), "/api/layers/indig").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["type"], "FeatureCollection");
        let features = json["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["geometry"]["coordinates"], serde_json::json!([-82.43, 52.93]));
        assert_eq!(features[0]["properties"]["name"], "Attawapiskat");

        let (status, _) = get_json(setup_test_app(), "/api/layers/fn").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_clusters_respect_layers() {
        let (status, json) = get_json(setup_test_app(), "/api/clusters?zoom=4&layers=full,indig").await;
        assert_eq!(status, StatusCode::OK);
        let clusters = json.as_array().unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0]["category"], "indig");
        assert_eq!(clusters[0]["icon_size"], 30);

        let (status, _) = get_json(setup_test_app(), "/api/clusters?zoom=4&bbox=1,2,3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_export_attachment() {
        let response = setup_test_app()
            .oneshot(
                Request::builder()
                    .uri("/api/export/names-short")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"names-shortlist.json\""
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "QC": ["Saint-André"] }));

        let (status, _) = get_json(setup_test_app(), "/api/export/names-indig").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
