//! Request/response shapes exchanged with the transport collaborators.
//!
//! The core never opens sockets. It builds multipart payloads, hands them to a
//! service trait, and interprets the `{status, body}` that comes back.

use thiserror::Error;

/// Multipart text field carrying the device identifier.
pub const DEVICE_ID_FIELD: &str = "device_ID";

/// Raw reply from a transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// File part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile {
    pub field: &'static str,
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// The transport could not complete the exchange (DNS, TLS, reset, ...).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport fault: {0}")]
pub struct TransportFault(pub String);

/// Join a possibly relative reference onto `base_url`.
pub fn resolve_url(base_url: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        reference.trim_start_matches('/')
    )
}
