use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::ingest::{ingest, RawReadingInput};
use crate::range::{resolve, RangeLabel};
use crate::series::{build_series, LogSnapshot, Series, SyntheticSource};
use crate::store::{LogHandle, LogStatus};
use axum::extract::{RawQuery, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use url::form_urlencoded;

pub const INGEST_SUCCESS: &str = "Success: Data logged successfully.";

#[derive(Clone)]
pub struct HttpState {
    pub log: LogHandle,
    pub clock: Arc<dyn Clock>,
    pub demo_when_empty: bool,
    pub demo_seed: u64,
    pub display_offset: FixedOffset,
}

#[derive(Debug, Serialize)]
struct LatestReading {
    timestamp: DateTime<Utc>,
    temperature: f64,
    humidity: f64,
    age_seconds: i64,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ingest_reading(
    State(state): State<HttpState>,
    RawQuery(raw): RawQuery,
) -> AppResult<&'static str> {
    let mut input = RawReadingInput::default();
    if let Some(raw) = raw {
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "temperature" => input.temperature = Some(value.into_owned()),
                "humidity" => input.humidity = Some(value.into_owned()),
                _ => {}
            }
        }
    }

    ingest(&state.log, state.clock.as_ref(), &input).await?;
    Ok(INGEST_SUCCESS)
}

async fn get_series(
    State(state): State<HttpState>,
    RawQuery(raw): RawQuery,
) -> AppResult<Json<Series>> {
    let mut range_raw: Option<String> = None;
    if let Some(raw) = raw {
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            if key == "range" {
                range_raw = Some(value.into_owned());
            }
        }
    }
    let spec = resolve(range_raw.as_deref().unwrap_or(RangeLabel::DEFAULT.as_str()));

    let snapshot = LogSnapshot::new(state.log.readings().await.map_err(AppError::storage)?);
    let now = state.clock.now();

    let series = if snapshot.is_empty() && state.demo_when_empty {
        let synthetic = SyntheticSource::new(state.demo_seed, state.display_offset);
        build_series(&spec, &synthetic, now, state.display_offset)
    } else {
        build_series(&spec, &snapshot, now, state.display_offset)
    };
    Ok(Json(series))
}

async fn get_latest(State(state): State<HttpState>) -> AppResult<Json<LatestReading>> {
    let latest = state
        .log
        .latest()
        .await
        .map_err(AppError::storage)?
        .ok_or_else(|| AppError::not_found("No readings logged yet"))?;
    let age_seconds = (state.clock.now() - latest.timestamp).num_seconds().max(0);
    Ok(Json(LatestReading {
        timestamp: latest.timestamp,
        temperature: latest.temperature,
        humidity: latest.humidity,
        age_seconds,
    }))
}

async fn get_status(State(state): State<HttpState>) -> AppResult<Json<LogStatus>> {
    let status = state.log.status().await.map_err(AppError::storage)?;
    Ok(Json(status))
}

pub fn router(state: HttpState, cors_permissive: bool) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(ingest_reading).post(ingest_reading))
        .route("/ingest", get(ingest_reading).post(ingest_reading))
        .route("/api/series", get(get_series))
        .route("/api/latest", get(get_latest))
        .route("/api/status", get(get_status))
        .with_state(state);

    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::test_support::FailingSink;
    use crate::store::{spawn_log_thread, CsvLog, RowSink};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, TimeZone};
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 14, 30, 0).unwrap()
    }

    fn app_with<S: RowSink>(sink: S, demo_when_empty: bool) -> Router {
        let state = HttpState {
            log: spawn_log_thread(sink).unwrap(),
            clock: Arc::new(FixedClock(now())),
            demo_when_empty,
            demo_seed: 42,
            display_offset: FixedOffset::east_opt(0).unwrap(),
        };
        router(state, false)
    }

    fn app(path: &Path) -> Router {
        app_with(CsvLog::new(path, false), false)
    }

    async fn send(app: &Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn data_rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn ingest_valid_reading_logs_one_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readings.csv");
        let app = app(&path);

        let (status, body) = send(&app, "/?temperature=22.3&humidity=48").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, INGEST_SUCCESS);
        assert_eq!(data_rows(&path), vec!["2026-10-16T14:30:00.000Z,22.3,48"]);
    }

    #[tokio::test]
    async fn ingest_formula_is_rejected_and_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readings.csv");
        let app = app(&path);

        // `=1+1` percent-encoded the way a URL-building client would send it.
        let (status, body) = send(&app, "/ingest?temperature=%3D1%2B1&humidity=48").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Error: Invalid numeric data (temperature)");
        assert!(data_rows(&path).is_empty());

        let (status, body) = send(&app, "/ingest?humidity=48").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Error: Missing or empty parameters"));
        assert!(data_rows(&path).is_empty());
    }

    #[tokio::test]
    async fn plus_sign_survives_url_decoding_only_when_encoded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readings.csv");
        let app = app(&path);

        let (status, _) = send(&app, "/?temperature=%2B25&humidity=50").await;
        assert_eq!(status, StatusCode::OK);
        // A bare `+` decodes to a space, which is not a numeric literal.
        let (status, _) = send(&app, "/?temperature=+25&humidity=50").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(data_rows(&path), vec!["2026-10-16T14:30:00.000Z,25,50"]);
    }

    #[tokio::test]
    async fn storage_failure_is_distinct_from_rejection() {
        let app = app_with(FailingSink { fail_init: false }, false);
        let (status, body) = send(&app, "/?temperature=20&humidity=40").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "Error: Failed to store reading");
    }

    #[tokio::test]
    async fn series_for_week_has_29_aligned_points() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir.path().join("readings.csv"));
        send(&app, "/?temperature=21&humidity=45").await;

        let (status, body) = send(&app, "/api/series?range=1w").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["range"], "1w");
        assert_eq!(json["source"], "recorded");
        for key in ["labels", "timestamps", "temperature", "humidity"] {
            assert_eq!(json[key].as_array().unwrap().len(), 29, "{key}");
        }
        assert_eq!(json["labels"][0], "Oct 9 14h");
        assert_eq!(json["labels"][28], "Oct 16 14h");
        assert!(json["temperature"][27].is_null());
        assert_eq!(json["temperature"][28], 21.0);
        assert_eq!(json["humidity"][28], 45.0);
    }

    #[tokio::test]
    async fn unknown_or_missing_range_uses_day_grid() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir.path().join("readings.csv"));
        for uri in ["/api/series?range=bogus", "/api/series"] {
            let (status, body) = send(&app, uri).await;
            assert_eq!(status, StatusCode::OK);
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(json["range"], "24h");
            assert_eq!(json["labels"].as_array().unwrap().len(), 25);
        }
    }

    #[tokio::test]
    async fn empty_log_serves_synthetic_series_only_when_enabled() {
        let dir = TempDir::new().unwrap();
        let demo = app_with(CsvLog::new(dir.path().join("a.csv"), false), true);
        let (_, body) = send(&demo, "/api/series?range=6h").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["source"], "synthetic");
        assert!(json["temperature"].as_array().unwrap().iter().all(|v| v.is_number()));

        let plain = app_with(CsvLog::new(dir.path().join("b.csv"), false), false);
        let (_, body) = send(&plain, "/api/series?range=6h").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["source"], "recorded");
        assert!(json["temperature"].as_array().unwrap().iter().all(|v| v.is_null()));

        // Synthetic values are never written to the log.
        let (_, body) = send(&demo, "/api/status").await;
        let status: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(status["readings"], 0);
    }

    #[tokio::test]
    async fn latest_reports_newest_reading() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("readings.csv");
        {
            let mut seed = CsvLog::new(&path, false);
            seed.append(&crate::store::Reading {
                timestamp: now() - Duration::minutes(10),
                temperature: 19.5,
                humidity: 60.0,
            })
            .unwrap();
        }
        let app = app(&path);

        let (status, body) = send(&app, "/api/latest").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["temperature"], 19.5);
        assert_eq!(json["age_seconds"], 600);

        let empty = app_with(CsvLog::new(dir.path().join("empty.csv"), false), true);
        let (status, body) = send(&empty, "/api/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Error: No readings logged yet");

        send(&app, "/?temperature=23.4&humidity=41").await;
        let (_, body) = send(&app, "/api/latest").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["temperature"], 23.4);
        assert_eq!(json["humidity"], 41.0);
        assert_eq!(json["age_seconds"], 0);
    }

    #[tokio::test]
    async fn latest_reports_storage_failure() {
        let app = app_with(FailingSink { fail_init: true }, false);
        let (status, body) = send(&app, "/api/latest").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "Error: Failed to access reading log");
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir.path().join("readings.csv"));
        assert_eq!(send(&app, "/healthz").await, (StatusCode::OK, "ok".to_string()));
    }
}
