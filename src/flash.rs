//! Flash messages carried across a redirect in a short-lived cookie.
//!
//! Rendering is the client's concern; the server only sets the cookie and
//! redirects.

use axum::{
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderValue,
    },
    response::{IntoResponse, Redirect, Response},
};
use base64ct::{Base64, Encoding};

pub const FLASH_COOKIE: &str = "flash";

/// Category prefix on the flash payload, mirroring success/error/info levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
    Info,
}

impl FlashKind {
    fn as_str(self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
            FlashKind::Info => "info",
        }
    }

    #[cfg(test)]
    fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FlashKind::Success),
            "error" => Some(FlashKind::Error),
            "info" => Some(FlashKind::Info),
            _ => None,
        }
    }
}

/// `flash=<kind>:<base64(message)>`, self-expiring after a minute.
pub fn flash_cookie(kind: FlashKind, message: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let payload = Base64::encode_string(message.as_bytes());
    HeaderValue::from_str(&format!(
        "{FLASH_COOKIE}={}:{payload}; Path=/; Max-Age=60; SameSite=Lax",
        kind.as_str()
    ))
}

/// Decode a flash cookie value back into kind and message.
#[cfg(test)]
pub fn decode_flash(value: &str) -> Option<(FlashKind, String)> {
    let (kind, payload) = value.split_once(':')?;
    let kind = FlashKind::parse(kind)?;
    let bytes = Base64::decode_vec(payload).ok()?;
    let message = String::from_utf8(bytes).ok()?;
    Some((kind, message))
}

/// See-other redirect with the message flashed on top.
pub fn redirect_with_flash(to: &str, kind: FlashKind, message: &str) -> Response {
    let mut response = Redirect::to(to).into_response();
    if let Ok(cookie) = flash_cookie(kind, message) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}
