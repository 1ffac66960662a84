use axum::http::{HeaderMap, header};
use url::Url;

/// Check the `Origin` header of a handshake against the allowlist
///
/// Requests without an `Origin` header come from non-browser clients and
/// are allowed. With an empty allowlist only same-origin requests pass.
pub fn origin_allowed(headers: &HeaderMap, allowed_origins: &[String]) -> bool {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };

    if allowed_origins.is_empty() {
        return same_origin(origin, headers);
    }

    allowed_origins
        .iter()
        .any(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(origin))
}

fn same_origin(origin: &str, headers: &HeaderMap) -> bool {
    let Some(host) = headers.get(header::HOST).and_then(|h| h.to_str().ok()) else {
        return false;
    };
    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    let Some(origin_host) = url.host_str() else {
        return false;
    };

    let authority = match url.port() {
        Some(port) => format!("{origin_host}:{port}"),
        None => origin_host.to_string(),
    };
    authority.eq_ignore_ascii_case(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(origin: Option<&str>, host: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(origin) = origin {
            headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        }
        if let Some(host) = host {
            headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        }
        headers
    }

    fn allowlist() -> Vec<String> {
        vec!["http://localhost:5173".to_string()]
    }

    #[test]
    fn test_listed_origin_allowed() {
        assert!(origin_allowed(
            &headers(Some("http://localhost:5173"), None),
            &allowlist()
        ));
    }

    #[test]
    fn test_unlisted_origin_rejected() {
        assert!(!origin_allowed(
            &headers(Some("http://evil.example"), None),
            &allowlist()
        ));
        assert!(!origin_allowed(
            &headers(Some("http://localhost:5174"), None),
            &allowlist()
        ));
    }

    #[test]
    fn test_missing_origin_allowed() {
        assert!(origin_allowed(&headers(None, None), &allowlist()));
    }

    #[test]
    fn test_trailing_slash_in_allowlist() {
        let allowed = vec!["https://app.example.com/".to_string()];
        assert!(origin_allowed(
            &headers(Some("https://app.example.com"), None),
            &allowed
        ));
    }

    #[test]
    fn test_empty_allowlist_means_same_origin() {
        assert!(origin_allowed(
            &headers(Some("http://127.0.0.1:8080"), Some("127.0.0.1:8080")),
            &[]
        ));
        assert!(origin_allowed(
            &headers(Some("https://chat.example.com"), Some("chat.example.com")),
            &[]
        ));
        assert!(!origin_allowed(
            &headers(Some("http://localhost:5173"), Some("127.0.0.1:8080")),
            &[]
        ));
    }
}
