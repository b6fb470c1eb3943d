use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

fn request_id(request: &Request) -> String {
    request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// One line when a request arrives and one when it completes, levelled by
/// status class.
pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let req_id = request_id(&request);

    tracing::debug!(request_id = %req_id, method = %method, path = %path, "incoming request");

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    match status_class(status) {
        StatusClass::ServerError => tracing::error!(
            request_id = %req_id, method = %method, path = %path,
            status = status.as_u16(), duration_ms, content_type = %content_type,
            "request failed"
        ),
        StatusClass::ClientError => tracing::warn!(
            request_id = %req_id, method = %method, path = %path,
            status = status.as_u16(), duration_ms, content_type = %content_type,
            "request rejected"
        ),
        StatusClass::Success => tracing::info!(
            request_id = %req_id, method = %method, path = %path,
            status = status.as_u16(), duration_ms, content_type = %content_type,
            "request completed"
        ),
    }

    response
}

#[derive(Debug, PartialEq, Eq)]
enum StatusClass {
    Success,
    ClientError,
    ServerError,
}

fn status_class(status: StatusCode) -> StatusClass {
    if status.is_server_error() {
        StatusClass::ServerError
    } else if status.is_client_error() {
        StatusClass::ClientError
    } else {
        StatusClass::Success
    }
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
