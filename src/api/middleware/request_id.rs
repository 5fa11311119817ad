use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID: &str = "x-request-id";

/// Tag every request and its response with an `x-request-id`, keeping the
/// caller's own id when it is a valid header value.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    req.headers_mut().insert(REQUEST_ID, request_id.clone());

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID, request_id);
    response
}
