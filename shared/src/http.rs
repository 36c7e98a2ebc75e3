use crate::error::PipelineError;
use lambda_http::http::{header, StatusCode};
use lambda_http::{Body, Error, Request, RequestExt, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

const JSON: &str = "application/json; charset=utf-8";

pub fn request_id(req: &Request) -> &str {
    req.lambda_context_ref()
        .map(|ctx| ctx.request_id.as_str())
        .unwrap_or_default()
}

/// Request path as routed by the gateway, without any REST API stage prefix.
pub fn route_path(req: &Request) -> &str {
    match req.raw_http_path() {
        "" => req.uri().path(),
        raw => raw,
    }
}

pub fn create_response(status: StatusCode, body: Body) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, JSON)
        .body(body)?)
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    create_response(status, Body::Text(serde_json::to_string(body)?))
}

/// Logs the full cause, answers with the public message only.
pub fn error_response(err: &PipelineError) -> Result<Response<Body>, Error> {
    let class = err.class();
    tracing::error!(status = class.status().as_u16(), error = ?err, "request failed");

    json_response(class.status(), &json!({ "error": err.public_message() }))
}

pub fn redirect(location: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .body(Body::Empty)?)
}

pub fn no_content() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::Empty)?)
}

pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, PipelineError> {
    serde_json::from_slice(body)
        .map_err(|e| PipelineError::InvalidInput(format!("Error unmarshalling request body: {}", e)))
}
