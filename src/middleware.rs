//! Response headers for the auth API.
//!
//! Every response is JSON or empty, and `verify` sets the session cookie, so
//! nothing is cacheable and nothing should render in a browser frame.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Adds no-store and anti-framing headers to every API response.
///
/// ```rust,no_run
/// use axum::middleware;
/// use predikt_auth::{auth::middleware::AppState, middleware::api_headers, routes};
///
/// let app = routes::api_router().layer(middleware::from_fn(api_headers));
/// # let _: axum::Router<AppState> = app;
/// ```
pub async fn api_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        middleware,
        response::IntoResponse,
        Router,
    };
    use tower::ServiceExt;

    async fn with_cookie() -> impl IntoResponse {
        (
            StatusCode::OK,
            [(header::SET_COOKIE, "predikt_session=abc; HttpOnly")],
            "{}",
        )
    }

    #[tokio::test]
    async fn test_api_headers_applied() {
        let app = Router::new()
            .route("/", axum::routing::post(with_cookie))
            .layer(middleware::from_fn(api_headers));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers.get("cache-control").unwrap(),
            "no-store",
            "Responses that set the session cookie must not be cached"
        );
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
        assert!(headers
            .get("content-security-policy")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("frame-ancestors 'none'"));

        // handler headers survive
        assert!(headers.get(header::SET_COOKIE).is_some());
    }
}
