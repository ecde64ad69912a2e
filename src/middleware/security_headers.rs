use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};

// JSON API plus uploaded images: nothing is allowed to execute or frame us.
const CSP: &str = "default-src 'none'; img-src 'self'; frame-ancestors 'none'; base-uri 'none'; form-action 'none'";

const HEADERS: [(&str, &str); 4] = [
    ("content-security-policy", CSP),
    ("referrer-policy", "no-referrer"),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
];

/// Add security headers to every response unless a handler already set them.
pub async fn security_headers(req: Request<Body>, next: Next) -> Response<Body> {
    let mut res = next.run(req).await;

    for (name, value) in HEADERS {
        if res.headers().get(name).is_none() {
            res.headers_mut().insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn sets_headers_without_overriding() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/custom",
                get(|| async { ([("referrer-policy", "same-origin")], "ok") }),
            )
            .layer(axum::middleware::from_fn(security_headers));

        let res = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");
        assert_eq!(res.headers()["content-security-policy"], CSP);

        let res = app
            .oneshot(Request::builder().uri("/custom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.headers()["referrer-policy"], "same-origin");
        assert_eq!(res.headers()["x-frame-options"], "DENY");
    }
}
