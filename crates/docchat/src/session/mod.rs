//! Browser session handling
//!
//! The transport layer owns correlation tokens: every request routed through
//! [`ensure_session`] carries a [`CorrelationToken`] in its extensions, taken
//! from the session cookie or freshly issued (and then set on the response).

mod token;

pub use token::{CorrelationToken, TokenError};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};

use crate::config::SessionConfig;

/// Read the correlation token from the `Cookie` headers
///
/// Cookies with the right name but an invalid value are ignored.
pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<CorrelationToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == cookie_name)
        .find_map(|(_, value)| value.trim_matches('"').parse::<CorrelationToken>().ok())
}

/// Build the `Set-Cookie` value for a newly issued token
pub fn session_cookie(cookie_name: &str, token: &CorrelationToken) -> String {
    format!("{cookie_name}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// Middleware guaranteeing a correlation token on every request
pub async fn ensure_session(
    State(config): State<SessionConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let (token, issued) = match token_from_headers(request.headers(), &config.cookie_name) {
        Some(token) => (token, false),
        None => (CorrelationToken::generate(), true),
    };

    if issued {
        tracing::debug!(token = %token, "Issued new session token");
    }

    request.extensions_mut().insert(token);
    let mut response = next.run(request).await;

    if issued {
        match HeaderValue::from_str(&session_cookie(&config.cookie_name, &token)) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!("Failed to encode session cookie: {e}"),
        }
    }

    response
}
