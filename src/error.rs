//! Error type shared by the endpoint layer and every backend.
//!
//! Failures fall into a few families that callers are expected to tell apart:
//! - **unsupported operation**: the backend does not implement the method at all
//!   ([`GioError::Unsupported`]); never retried.
//! - **transport errors**: I/O, USB, HID or serial failures surfaced by a backend.
//! - **would block**: not an error in the read path; the buffered reader stops on it.
//! - **identifier mismatch**: no backend claimed the resource identifier.
//! - **descriptor problems**: a HID report is absent or does not define its size.

use std::io;

/// Errors produced by endpoints and backends.
#[derive(Debug, thiserror::Error)]
pub enum GioError {
    /// The backend has no implementation of the named operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// No backend in the registry recognised the identifier.
    #[error("unsupported resource identifier: {0}")]
    UnsupportedIdentifier(String),

    /// The identifier was recognised but its parameters could not be parsed.
    #[error("invalid resource identifier {identifier:?}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    /// A backend accepted the identifier but found no matching device.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The backend needs configuration that the descriptor does not provide.
    #[error("missing configuration: {0}")]
    MissingConfiguration(&'static str),

    /// The operation did not complete within its timeout.
    #[error("operation timed out")]
    TimedOut,

    /// No data is available right now.
    #[error("operation would block")]
    WouldBlock,

    /// The HID report descriptor does not mention the report.
    #[error("HID report {0:#04X} not found")]
    ReportNotFound(u8),

    /// The HID report exists but lacks a report count or report size.
    #[error("HID report {0:#04X} size not defined")]
    ReportSizeUndefined(u8),

    #[error("I/O: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "usb")]
    #[error("USB: {0}")]
    Usb(#[from] rusb::Error),

    #[cfg(feature = "hid")]
    #[error("HID: {0}")]
    Hid(#[from] hidapi::HidError),

    #[cfg(feature = "serial")]
    #[error("serial: {0}")]
    Serial(#[from] serialport::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl GioError {
    /// Returns whether the error is a result of a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::TimedOut => true,
            Self::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            #[cfg(feature = "usb")]
            Self::Usb(rusb::Error::Timeout) => true,
            #[cfg(feature = "serial")]
            Self::Serial(e) => matches!(
                e.kind(),
                serialport::ErrorKind::Io(io::ErrorKind::TimedOut)
            ),
            _ => false,
        }
    }

    /// Returns whether the error only means "no data yet".
    pub fn is_would_block(&self) -> bool {
        match self {
            Self::WouldBlock => true,
            Self::Io(e) => e.kind() == io::ErrorKind::WouldBlock,
            _ => false,
        }
    }

    /// Returns whether the error is [`GioError::Unsupported`].
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

pub type Result<T, E = GioError> = std::result::Result<T, E>;
