// End-to-end checks of the HTTP API over a small Hawaii-shaped dump

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value as Json;
use surfsup::climate::{PrecipitationRecord, TemperatureObservation, TemperatureStats};
use surfsup::query::Query;
use surfsup::{load_script, router, ClimateStore, QueryExecutor, QueryParser, Value};
use std::sync::Arc;
use tower::ServiceExt;

const DUMP: &str = include_str!("fixtures/hawaii_sample.sql");
const CUTOFF: &str = "2016-04-04";
const MOST_ACTIVE: &str = "USC00519281";

fn setup() -> (Arc<QueryExecutor>, Router) {
    let executor = Arc::new(load_script(DUMP).unwrap());
    let app = router(ClimateStore::from_shared(executor.clone()));
    (executor, app)
}

async fn get_bytes(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

async fn get_json<T: serde::de::DeserializeOwned>(app: &Router, uri: &str) -> T {
    let (status, body) = get_bytes(app, uri).await;
    assert_eq!(status, StatusCode::OK, "GET {}", uri);
    serde_json::from_slice(&body).unwrap()
}

fn select(executor: &QueryExecutor, sql: &str) -> Vec<Vec<Value>> {
    match QueryParser::parse(sql).unwrap() {
        Query::Select(query) => executor
            .select(&query)
            .unwrap()
            .into_rows()
            .into_iter()
            .map(|row| row.values)
            .collect(),
        other => panic!("expected SELECT, got {:?}", other),
    }
}

#[tokio::test]
async fn routes_page_lists_dataset_bounds() {
    let (_, app) = setup();
    let (status, body) = get_bytes(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        "Available Routes:<br/>/api/v1.0/precipitation<br/>/api/v1.0/stations<br/>\
         /api/v1.0/tobs<br/>/api/v1.0/2015-12-01<br/>/api/v1.0/2015-12-01/2017-04-04"
    );
}

#[tokio::test]
async fn stations_match_station_table() {
    let (executor, app) = setup();
    let stations: Vec<String> = get_json(&app, "/api/v1.0/stations").await;

    assert_eq!(stations.len(), executor.get_table("station").unwrap().row_count());
    assert_eq!(stations[0], "USC00519397");
    assert_eq!(stations[4], "USC00516128");
}

#[tokio::test]
async fn precipitation_covers_trailing_year_in_order() {
    let (executor, app) = setup();
    let records: Vec<PrecipitationRecord> = get_json(&app, "/api/v1.0/precipitation").await;

    assert!(records.iter().all(|r| r.date.as_str() >= CUTOFF));
    assert!(records.windows(2).all(|w| w[0].date <= w[1].date));

    let in_window = select(
        &executor,
        &format!("SELECT COUNT(*) FROM measurement WHERE date >= '{}'", CUTOFF),
    );
    assert_eq!(in_window, vec![vec![Value::Integer(records.len() as i64)]]);
    assert!(records.iter().any(|r| r.prcp.is_none()));
}

#[tokio::test]
async fn tobs_belong_to_most_active_station() {
    let (executor, app) = setup();
    let observations: Vec<TemperatureObservation> = get_json(&app, "/api/v1.0/tobs").await;

    assert!(observations.windows(2).all(|w| w[0].date <= w[1].date));
    assert!(observations.iter().all(|o| o.date.as_str() >= CUTOFF));

    let expected: Vec<TemperatureObservation> = select(
        &executor,
        &format!(
            "SELECT date, tobs FROM measurement WHERE station = '{}' AND date >= '{}' ORDER BY date",
            MOST_ACTIVE, CUTOFF
        ),
    )
    .into_iter()
    .map(|values| TemperatureObservation {
        date: values[0].as_text().unwrap().to_string(),
        tobs: values[1].as_f64(),
    })
    .collect();
    assert_eq!(observations, expected);
    assert_eq!(observations.len(), 41);
}

#[tokio::test]
async fn stats_between_dates_match_manual_aggregation() {
    let (executor, app) = setup();
    let stats: Vec<TemperatureStats> = get_json(&app, "/api/v1.0/2016-08-01/2016-12-31").await;
    assert_eq!(stats.len(), 1);

    let temps: Vec<f64> = select(
        &executor,
        "SELECT tobs FROM measurement WHERE date >= '2016-08-01' AND date <= '2016-12-31'",
    )
    .into_iter()
    .filter_map(|values| values[0].as_f64())
    .collect();
    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = temps.iter().sum::<f64>() / temps.len() as f64;

    assert_eq!(stats[0].min, Some(min));
    assert_eq!(stats[0].max, Some(max));
    assert!((stats[0].avg.unwrap() - avg).abs() < 1e-9);
}

#[tokio::test]
async fn stats_from_start_include_latest_day() {
    let (_, app) = setup();
    let stats: Vec<TemperatureStats> = get_json(&app, "/api/v1.0/2017-04-04").await;

    assert_eq!(
        stats,
        vec![TemperatureStats {
            min: Some(84.0),
            avg: Some(84.0),
            max: Some(84.0),
        }]
    );
}

#[tokio::test]
async fn inverted_range_is_all_null() {
    let (_, app) = setup();
    let (status, body) = get_bytes(&app, "/api/v1.0/2017-01-01/2016-01-01").await;

    assert_eq!(status, StatusCode::OK);
    let body: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        body,
        serde_json::json!([{ "TMIN": null, "TAVG": null, "TMAX": null }])
    );
}

#[tokio::test]
async fn malformed_dates_are_rejected() {
    let (_, app) = setup();
    for uri in [
        "/api/v1.0/2017-1",
        "/api/v1.0/yesterday",
        "/api/v1.0/2016-01-01/tomorrow",
    ] {
        let (status, body) = get_bytes(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "GET {}", uri);
        let body: Json = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("invalid date"));
    }
}

#[tokio::test]
async fn repeated_requests_are_byte_identical() {
    let (_, app) = setup();
    for uri in [
        "/",
        "/api/v1.0/precipitation",
        "/api/v1.0/stations",
        "/api/v1.0/tobs",
        "/api/v1.0/2016-08-23",
        "/api/v1.0/2016-08-23/2017-04-04",
    ] {
        let first = get_bytes(&app, uri).await;
        let second = get_bytes(&app, uri).await;
        assert_eq!(first, second, "GET {}", uri);
    }
}
