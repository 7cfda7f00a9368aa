//! Request routing and handlers.
//!
//! Three surfaces: the thermostat control endpoint (plain-text `burn-y` /
//! `burn-n` contract, with `/nest.php` kept as a legacy alias), the status
//! page with its override toggle, and a JSON health snapshot. Routes match
//! exactly; anything else is a 404.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{body::Body, Method, Request, Response, StatusCode};
use log::{error, info, warn};
use serde::Serialize;

use super::{view, AppState};

pub async fn handle<B: Body>(
    state: Arc<AppState>,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, B::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("{method} {path}");

    let response = match (method, path.as_str()) {
        (Method::GET, "/") | (Method::POST, "/") => status_page(&state, req).await?,
        (Method::GET, "/control")
        | (Method::POST, "/control")
        | (Method::GET, "/nest.php")
        | (Method::POST, "/nest.php") => control(&state, req).await?,
        (Method::GET, "/health") => health(&state).await,
        _ => not_found(&path),
    };

    Ok(response)
}

/// Decide for one thermostat reading. A missing or non-numeric parameter
/// answers `burn-n` without touching the engine, so a confused thermostat
/// can never flip the furnace or leave a history record.
async fn control<B: Body>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, B::Error> {
    let params = request_params(req).await?;

    let Some(temp) = param_f64(&params, "temp") else {
        warn!("Control request rejected: missing or non-numeric temp");
        return Ok(burn_response(false));
    };
    let Some(pressure) = param_f64(&params, "pressure") else {
        warn!("Control request rejected: missing or non-numeric pressure");
        return Ok(burn_response(false));
    };

    let burn = state.engine.decide(temp, pressure).await;
    Ok(burn_response(burn))
}

/// The status page, doubling as the override toggle target. A toggle
/// redirects back to a clean `/` so a reload never re-submits the form.
async fn status_page<B: Body>(
    state: &AppState,
    req: Request<B>,
) -> Result<Response<Full<Bytes>>, B::Error> {
    let params = request_params(req).await?;

    match param(&params, "override") {
        Some("on") => {
            if let Err(err) = state.engine.set_override(true).await {
                error!("Failed to enable override: {err:#}");
            }
            return Ok(redirect_to("/"));
        }
        Some("off") => {
            if let Err(err) = state.engine.set_override(false).await {
                error!("Failed to clear override: {err:#}");
            }
            return Ok(redirect_to("/"));
        }
        _ => {}
    }

    let show_graph = param(&params, "graph") == Some("on");
    let status = state.engine.status(show_graph).await;
    Ok(html_response(view::status_page(&status, show_graph)))
}

async fn health(state: &AppState) -> Response<Full<Bytes>> {
    let status = state.engine.status(false).await;
    json_response(StatusCode::OK, &status)
}

/// Collect form parameters from the body and the query string. Body
/// parameters come first so they win when both carry the same key.
async fn request_params<B: Body>(req: Request<B>) -> Result<Vec<(String, String)>, B::Error> {
    let query = req.uri().query().map(str::to_string);
    let body = req.into_body().collect().await?.to_bytes();

    let mut params: Vec<(String, String)> =
        serde_urlencoded::from_bytes(&body).unwrap_or_default();
    if let Some(query) = query {
        if let Ok(mut from_query) = serde_urlencoded::from_str::<Vec<(String, String)>>(&query) {
            params.append(&mut from_query);
        }
    }
    Ok(params)
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

fn param_f64(params: &[(String, String)], key: &str) -> Option<f64> {
    param(params, key)?.parse().ok()
}

fn burn_response(burn: bool) -> Response<Full<Bytes>> {
    let body = if burn { "burn-y" } else { "burn-n" };
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

fn html_response(page: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Full::new(Bytes::from(page)))
        .unwrap()
}

fn redirect_to(location: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::SEE_OTHER)
        .header("Location", location)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_string(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap(),
        Err(err) => {
            error!("Failed to serialize response body: {err}");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::new()))
                .unwrap()
        }
    }
}

fn not_found(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
