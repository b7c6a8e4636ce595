use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;

pub mod auth;
pub mod game;
pub mod player;
pub mod rating;
pub mod stats;
pub mod system;

/// JSON response that may carry the `X-From-Cache` hint.
pub fn cached_json_response(body: String, from_cache: bool) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    if from_cache {
        builder = builder.header("X-From-Cache", "true");
    }
    builder.body(Body::from(body)).unwrap_or_else(|_| Response::new(Body::empty()))
}
