use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

use crate::model::RequestContext;

/// Axum extractor for the RequestContext handed to hooks
///
/// Captures the method, path and every header with a textual value. The
/// caller identity comes from `X-User-Id` when present.
#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut ctx = RequestContext::new(parts.method.as_str(), parts.uri.path());
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                ctx = ctx.with_header(name.as_str(), value);
            }
        }
        ctx.user_id = extract_header_value(&parts.headers, "x-user-id");
        Ok(ctx)
    }
}

fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_context_extraction() {
        let request = Request::builder()
            .method("PUT")
            .uri("/people/id/7?x=1")
            .header("X-User-Id", "user-123")
            .header("X-Trace", "abc")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.method, "PUT");
        assert_eq!(ctx.path, "/people/id/7");
        assert_eq!(ctx.user_id.as_deref(), Some("user-123"));
        assert_eq!(ctx.header("x-trace"), Some("abc"));
    }

    #[tokio::test]
    async fn test_anonymous_request() {
        let (mut parts, _) = Request::builder().uri("/people").body(()).unwrap().into_parts();
        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.method, "GET");
        assert_eq!(ctx.user_id, None);
        assert!(ctx.headers.is_empty());
    }
}
