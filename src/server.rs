use crate::config::AppConfig;
use crate::data::Dataset;
use crate::processing::{aggregate_condition_proportions, aggregate_steward_health};
use crate::render::{render_bar_chart_svg, render_heatmap_svg};
use crate::types::{Borough, HeatTable, ProportionTable};
use anyhow::{Context, Result};
use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub dataset: Dataset,
    pub config: AppConfig,
}

impl AppState {
    /// Species preselected in the dropdown: the configured default if the
    /// data has it, otherwise the first species seen.
    pub fn default_species(&self) -> Option<&str> {
        let configured = self.config.dashboard.default_species.as_str();
        if self.dataset.contains_species(configured) {
            Some(configured)
        } else {
            self.dataset.species().first().map(String::as_str)
        }
    }

    pub fn default_borough(&self) -> Borough {
        self.config.dashboard.borough().unwrap_or_else(|e| {
            warn!("Invalid default borough, using {}: {}", Borough::Brooklyn, e);
            Borough::Brooklyn
        })
    }
}

#[derive(Deserialize)]
pub struct SpeciesParams {
    species: String,
}

#[derive(Deserialize)]
pub struct SelectionParams {
    borough: String,
    species: String,
}

type ApiError = (StatusCode, String);

pub fn create_router(state: Arc<AppState>) -> Router {
    let chart_dir = ServeDir::new(&state.config.output.chart_dir);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/species", get(species_handler))
        .route("/api/boroughs", get(boroughs_handler))
        .route("/api/condition", get(condition_handler))
        .route("/api/steward", get(steward_handler))
        .route("/charts/condition.svg", get(condition_chart_handler))
        .route("/charts/steward.svg", get(steward_chart_handler))
        .nest_service("/static", chart_dir)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, dataset: Dataset) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState { dataset, config });
    let app = create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_borough(raw: &str) -> Result<Borough, ApiError> {
    raw.parse()
        .map_err(|e: crate::types::ParseError| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn condition_table(state: &AppState, species: &str) -> ProportionTable {
    aggregate_condition_proportions(state.dataset.filter_species(species))
}

fn steward_table(state: &AppState, borough: Borough, species: &str) -> HeatTable {
    aggregate_steward_health(state.dataset.filter_borough_species(borough, species))
}

fn svg_response(svg: String) -> Response {
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
}

async fn species_handler(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.dataset.species().to_vec())
}

async fn boroughs_handler() -> Json<Vec<&'static str>> {
    Json(Borough::ALL.iter().map(|b| b.label()).collect())
}

async fn condition_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SpeciesParams>,
) -> Json<ProportionTable> {
    Json(condition_table(&state, &params.species))
}

async fn steward_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SelectionParams>,
) -> Result<Json<HeatTable>, ApiError> {
    let borough = parse_borough(&params.borough)?;
    Ok(Json(steward_table(&state, borough, &params.species)))
}

async fn condition_chart_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SpeciesParams>,
) -> Response {
    let table = condition_table(&state, &params.species);
    svg_response(render_bar_chart_svg(&params.species, &table))
}

async fn steward_chart_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SelectionParams>,
) -> Result<Response, ApiError> {
    let borough = parse_borough(&params.borough)?;
    let table = steward_table(&state, borough, &params.species);
    Ok(svg_response(render_heatmap_svg(&table)))
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    index_page(&state)
        .render()
        .map(Html)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Template error: {}", e)))
}

pub struct SpeciesOption {
    pub name: String,
    pub selected: bool,
}

pub struct BoroughOption {
    pub label: &'static str,
    pub checked: bool,
}

/// Two side-by-side panes: species dropdown over the bar chart, borough
/// radio buttons over the heatmap. Either input reloads both charts.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub species: Vec<SpeciesOption>,
    pub boroughs: Vec<BoroughOption>,
}

pub fn index_page(state: &AppState) -> IndexTemplate {
    let selected_species = state.default_species().unwrap_or_default();
    let selected_borough = state.default_borough();

    IndexTemplate {
        species: state
            .dataset
            .species()
            .iter()
            .map(|name| SpeciesOption {
                name: name.clone(),
                selected: name == selected_species,
            })
            .collect(),
        boroughs: Borough::ALL
            .into_iter()
            .map(|b| BoroughOption {
                label: b.label(),
                checked: b == selected_borough,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Health, Steward, TreeRecord};

    fn state(default_species: &str) -> AppState {
        let mut config = AppConfig::from_toml(
            "[input]\ndata_dir = \"data\"\n[output]\nchart_dir = \"charts\"\n[server]\nport = 8050\n",
        )
        .unwrap();
        config.dashboard.default_species = default_species.to_string();
        let dataset = Dataset::new(vec![
            TreeRecord::new("honeylocust", Borough::Queens, Health::Good, Some(Steward::NoSteward)),
            TreeRecord::new("pin oak", Borough::Brooklyn, Health::Fair, None),
        ]);
        AppState { dataset, config }
    }

    #[test]
    fn test_default_species_falls_back_to_first_seen() {
        assert_eq!(state("pin oak").default_species(), Some("pin oak"));
        assert_eq!(state("ginkgo").default_species(), Some("honeylocust"));
    }

    #[test]
    fn test_index_page_preselects_defaults() {
        let page = index_page(&state("pin oak")).render().unwrap();
        assert!(page.contains(r#"<option value="pin oak" selected>"#));
        assert!(page.contains(r#"value="Brooklyn" checked"#));
        assert!(page.contains(r#"value="Staten Island""#));
    }

    #[test]
    fn test_index_page_escapes_species_names() {
        let mut app = state("pin oak");
        app.dataset = Dataset::new(vec![TreeRecord::new(
            "<oak & elm>",
            Borough::Bronx,
            Health::Good,
            None,
        )]);
        let page = index_page(&app).render().unwrap();
        assert!(page.contains("&lt;oak &amp; elm&gt;"));
        assert!(!page.contains("<oak"));
    }

    #[test]
    fn test_invalid_default_borough_falls_back_to_brooklyn() {
        let mut app = state("pin oak");
        app.config.dashboard.default_borough = "Hoboken".to_string();
        assert_eq!(app.default_borough(), Borough::Brooklyn);
        app.config.dashboard.default_borough = "Queens".to_string();
        assert_eq!(app.default_borough(), Borough::Queens);
    }

    #[test]
    fn test_parse_borough_rejects_unknown() {
        let (status, message) = parse_borough("Newark").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("Newark"));
    }
}
