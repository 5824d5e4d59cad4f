// HTTP API
// Routes under /api/v1.0, each handler a thin call into `ClimateStore`

use crate::climate::{
    ClimateStore, ObservationDate, PrecipitationRecord, TemperatureObservation, TemperatureStats,
};
use crate::error::{ApiError, Result};
use anyhow::Context;
use axum::extract::{Path, State};
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use tracing::debug;

pub const API_PREFIX: &str = "/api/v1.0";

/// Build the application router over an injected store
pub fn router(store: ClimateStore) -> Router {
    Router::new()
        .route("/", get(routes))
        .route("/api/v1.0/precipitation", get(precipitation))
        .route("/api/v1.0/stations", get(stations))
        .route("/api/v1.0/tobs", get(tobs))
        .route("/api/v1.0/:start", get(stats_from))
        .route("/api/v1.0/:start/:end", get(stats_between))
        .with_state(store)
}

/// Run a store query on the blocking pool. Queries scan in-memory tables
/// synchronously and must not hold up the async workers.
async fn query_store<T, F>(store: ClimateStore, query: F) -> Result<T>
where
    F: FnOnce(&ClimateStore) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || query(&store))
        .await
        .context("Store query task failed")?
        .map_err(ApiError::from)
}

/// List the available routes, with the dataset's first and last dates
/// filled into the date templates
async fn routes(State(store): State<ClimateStore>) -> Result<Html<String>> {
    let (first, last) = match query_store(store, |s| s.date_bounds()).await? {
        Some(bounds) => (bounds.first, bounds.last),
        None => ("<start>".to_string(), "<end>".to_string()),
    };

    Ok(Html(format!(
        "Available Routes:<br/>\
         {p}/precipitation<br/>\
         {p}/stations<br/>\
         {p}/tobs<br/>\
         {p}/{first}<br/>\
         {p}/{first}/{last}",
        p = API_PREFIX,
        first = first,
        last = last
    )))
}

async fn precipitation(State(store): State<ClimateStore>) -> Result<Json<Vec<PrecipitationRecord>>> {
    let records = query_store(store, |s| s.precipitation()).await?;
    debug!(records = records.len(), "precipitation");
    Ok(Json(records))
}

async fn stations(State(store): State<ClimateStore>) -> Result<Json<Vec<Option<String>>>> {
    Ok(Json(query_store(store, |s| s.stations()).await?))
}

async fn tobs(State(store): State<ClimateStore>) -> Result<Json<Vec<TemperatureObservation>>> {
    let observations = query_store(store, |s| s.temperature_observations()).await?;
    debug!(observations = observations.len(), "tobs");
    Ok(Json(observations))
}

async fn stats_from(
    State(store): State<ClimateStore>,
    Path(start): Path<String>,
) -> Result<Json<Vec<TemperatureStats>>> {
    let start: ObservationDate = start.parse()?;
    debug!(%start, "temperature stats from start");
    let stats = query_store(store, move |s| s.temperature_stats(start, None)).await?;
    Ok(Json(vec![stats]))
}

async fn stats_between(
    State(store): State<ClimateStore>,
    Path((start, end)): Path<(String, String)>,
) -> Result<Json<Vec<TemperatureStats>>> {
    let start: ObservationDate = start.parse()?;
    let end: ObservationDate = end.parse()?;
    debug!(%start, %end, "temperature stats between dates");
    let stats = query_store(store, move |s| s.temperature_stats(start, Some(end))).await?;
    Ok(Json(vec![stats]))
}
