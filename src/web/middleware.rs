use crate::utils::error::DetectError;
use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

/// 请求日志中间件
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let start_time = Instant::now();

    tracing::info!(
        "Request started: {} {} - User-Agent: {}",
        method,
        uri,
        user_agent
    );

    let response = next.run(req).await;

    tracing::info!(
        "Request completed: {} {} - {} - {}ms",
        method,
        uri,
        response.status(),
        start_time.elapsed().as_millis()
    );

    response
}

/// 安全头中间件
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    response
}

/// 将 tower-http 生成的 413 / 408 纯文本响应改写为统一的 JSON 错误
pub async fn json_error_bodies(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return response;
    }

    match response.status() {
        StatusCode::PAYLOAD_TOO_LARGE => DetectError::PayloadTooLarge.into_response(),
        StatusCode::REQUEST_TIMEOUT => DetectError::RequestTimeout.into_response(),
        _ => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn plain(status: StatusCode) -> Response {
        (status, "length limit exceeded").into_response()
    }

    #[tokio::test]
    async fn timeout_becomes_json() {
        let response = json_error_bodies(plain(StatusCode::REQUEST_TIMEOUT)).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body_json(response).await["code"], "REQUEST_TIMEOUT");
    }

    #[tokio::test]
    async fn oversized_body_becomes_json() {
        let response = json_error_bodies(plain(StatusCode::PAYLOAD_TOO_LARGE)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = body_json(response).await;
        assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(json["error"], "Request body too large");
    }

    #[tokio::test]
    async fn other_responses_pass_through() {
        let response = json_error_bodies(plain(StatusCode::NOT_FOUND)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = Response::builder()
            .status(StatusCode::PAYLOAD_TOO_LARGE)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"error":"kept","code":"X"}"#))
            .unwrap();
        let json = body_json(json_error_bodies(response).await).await;
        assert_eq!(json["error"], "kept");
    }
}
