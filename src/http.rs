//! REST control surface: start and stop the traffic loop.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

use crate::app::App;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/startLoop", get(start_loop).post(start_loop))
        .route("/stopLoop", get(stop_loop).post(stop_loop))
        .with_state(app)
}

/// `GET|POST /startLoop?tps=N`: publish a new rate, binding sessions
/// first when needed. A missing or malformed `tps` is a 400.
async fn start_loop(
    State(app): State<Arc<App>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let tps = match params.get("tps").map(|raw| raw.parse::<u32>()) {
        Some(Ok(tps)) => tps,
        _ => {
            warn!(tps = ?params.get("tps"), "rejecting start request");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid TPS parameter" })),
            );
        }
    };
    app.start_traffic(tps).await;
    (StatusCode::OK, Json(json!({ "status": "started", "tps": tps })))
}

/// `GET|POST /stopLoop`: zero the rate and tear sessions down.
async fn stop_loop(State(app): State<Arc<App>>) -> Json<Value> {
    app.stop_traffic().await;
    Json(json!({ "status": "stopped" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    // No servers configured; start/stop only touch the broker.
    fn empty_app() -> Arc<App> {
        let conf = ServiceConfig {
            smpp: Vec::new(),
            rest: Default::default(),
            log: Default::default(),
        };
        Arc::new(App::new(&conf))
    }

    #[tokio::test]
    async fn start_loop_accepts_numeric_tps() {
        let app = empty_app();
        let mut params = HashMap::new();
        params.insert("tps".to_string(), "40".to_string());
        let (status, Json(body)) = start_loop(State(app), Query(params)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "started");
        assert_eq!(body["tps"], 40);
    }

    #[tokio::test]
    async fn start_loop_rejects_missing_or_bad_tps() {
        let app = empty_app();
        let (status, Json(body)) =
            start_loop(State(Arc::clone(&app)), Query(HashMap::new())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid TPS parameter");

        let mut params = HashMap::new();
        params.insert("tps".to_string(), "fast".to_string());
        let (status, _) = start_loop(State(app), Query(params)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stop_loop_reports_stopped() {
        let app = empty_app();
        let Json(body) = stop_loop(State(app)).await;
        assert_eq!(body["status"], "stopped");
    }
}
