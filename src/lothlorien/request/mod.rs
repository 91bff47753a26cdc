use axum::http::{header, HeaderMap};

use crate::dashboard::customcss::UPDATE_CUSTOM_CSS_ACTION;

/// Cookie carrying the dashboard session token.
pub const SESSION_COOKIE: &str = "customcss_session";

/// `action` value that fires the new-site lifecycle event from the dashboard.
pub const NEW_SITE_ACTION: &str = "new_site";

/// Actions accepted by the admin post endpoint.
#[derive(Clone, PartialEq, Debug)]
pub enum AdminAction {
    /// Save the Custom CSS screen.
    UpdateCustomCss,
    /// Fire the new-site lifecycle event.
    NewSite,
    Unknown(String),
}

impl AdminAction {
    pub fn from_name(name: &str) -> Self {
        match name {
            UPDATE_CUSTOM_CSS_ACTION => AdminAction::UpdateCustomCss,
            NEW_SITE_ACTION => AdminAction::NewSite,
            other => AdminAction::Unknown(other.to_string()),
        }
    }
}

/// Extracts the session token from the `customcss_session` cookie or an `Authorization: Bearer` header.
///
/// The cookie wins when both are present.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
    })
}
