//! The per-transport connection interface.
//!
//! A [`Resource`] is what a backend hands back from `connect`: it owns the live transport
//! handle and implements whichever operations the transport supports. Every method has a
//! default that fails with [`GioError::Unsupported`], so a backend only writes what it has.
//! The set it actually implements is advertised separately through [`Methods`]; the endpoint
//! checks that set before calling in, which keeps "not implemented" distinct from transport
//! failures.

use crate::config::SerialParameters;
use crate::error::{GioError, Result};
use bitflags::bitflags;
use std::any::Any;
use std::fmt;
use std::time::Duration;

bitflags! {
    /// Operations a backend implements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Methods: u32 {
        const DISCONNECT          = 1 << 0;
        const RECONFIGURE         = 1 << 1;
        const READ_DATA           = 1 << 2;
        const WRITE_DATA          = 1 << 3;
        const AWAIT_INPUT         = 1 << 4;
        const MONITOR_INPUT       = 1 << 5;
        const TELL_RESOURCE       = 1 << 6;
        const ASK_RESOURCE        = 1 << 7;
        const HID_ITEMS           = 1 << 8;
        const SET_HID_REPORT      = 1 << 9;
        const GET_HID_REPORT      = 1 << 10;
        const SET_HID_FEATURE     = 1 << 11;
        const GET_HID_FEATURE     = 1 << 12;
        const RESOURCE_NAME       = 1 << 13;
        const RESOURCE_IDENTIFIER = 1 << 14;
        const RESOURCE_OBJECT     = 1 << 15;

        /// Plain byte stream.
        const STREAM = Self::DISCONNECT.bits()
            | Self::READ_DATA.bits()
            | Self::WRITE_DATA.bits()
            | Self::AWAIT_INPUT.bits();

        /// HID report access.
        const HID_REPORTS = Self::HID_ITEMS.bits()
            | Self::SET_HID_REPORT.bits()
            | Self::GET_HID_REPORT.bits()
            | Self::SET_HID_FEATURE.bits()
            | Self::GET_HID_FEATURE.bits();
    }
}

/// Which transport owns a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Null,
    Serial,
    Usb,
    Bluetooth,
    Hid,
    /// A backend registered by the application.
    Other(&'static str),
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceType::Null => "null",
            ResourceType::Serial => "serial",
            ResourceType::Usb => "usb",
            ResourceType::Bluetooth => "bluetooth",
            ResourceType::Hid => "hid",
            ResourceType::Other(name) => name,
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
}

/// Header of a control transfer (`tell`/`ask`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlRequest {
    pub recipient: Recipient,
    pub request_type: RequestType,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    pub fn vendor(recipient: Recipient, request: u8, value: u16, index: u16) -> Self {
        Self {
            recipient,
            request_type: RequestType::Vendor,
            request,
            value,
            index,
        }
    }

    pub fn class(recipient: Recipient, request: u8, value: u16, index: u16) -> Self {
        Self {
            recipient,
            request_type: RequestType::Class,
            request,
            value,
            index,
        }
    }
}

/// Called by a backend with native input monitoring whenever input arrives (or monitoring
/// fails). Returning `false` asks the backend to stop monitoring.
pub type MonitorCallback = Box<dyn FnMut(Option<&GioError>) -> bool + Send>;

/// A connected transport.
///
/// Timeouts of zero mean "do not block".
#[allow(unused_variables)]
pub trait Resource: Send + 'static {
    /// Release the transport. Called at most once, by the endpoint.
    fn disconnect(&mut self) -> Result<()> {
        Err(GioError::Unsupported("disconnect"))
    }

    fn reconfigure(&mut self, parameters: &SerialParameters) -> Result<()> {
        Err(GioError::Unsupported("reconfigure"))
    }

    /// Read whatever is available into `buffer`.
    ///
    /// Waits up to `initial` for the first byte, then up to `subsequent` between bytes.
    /// `Ok(0)` means nothing arrived in time.
    fn read_data(&mut self, buffer: &mut [u8], initial: Duration, subsequent: Duration) -> Result<usize> {
        Err(GioError::Unsupported("read data"))
    }

    fn write_data(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        Err(GioError::Unsupported("write data"))
    }

    /// Wait for input to become readable.
    fn await_input(&mut self, timeout: Duration) -> Result<bool> {
        Err(GioError::Unsupported("await input"))
    }

    /// Install (or with `None`, remove) a native input callback.
    fn monitor_input(&mut self, callback: Option<MonitorCallback>) -> Result<()> {
        Err(GioError::Unsupported("monitor input"))
    }

    /// Host-to-device control transfer.
    fn tell(&mut self, request: &ControlRequest, data: &[u8], timeout: Duration) -> Result<usize> {
        Err(GioError::Unsupported("tell resource"))
    }

    /// Device-to-host control transfer.
    fn ask(&mut self, request: &ControlRequest, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        Err(GioError::Unsupported("ask resource"))
    }

    /// The raw HID report descriptor.
    fn hid_items(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        Err(GioError::Unsupported("get HID items"))
    }

    fn set_hid_report(&mut self, identifier: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        Err(GioError::Unsupported("set HID report"))
    }

    /// `buffer[0]` receives the identifier; the report follows.
    fn get_hid_report(&mut self, identifier: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        Err(GioError::Unsupported("get HID report"))
    }

    fn set_hid_feature(&mut self, identifier: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        Err(GioError::Unsupported("set HID feature"))
    }

    fn get_hid_feature(&mut self, identifier: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        Err(GioError::Unsupported("get HID feature"))
    }

    /// Human-readable name, typically the product string.
    fn name(&mut self, timeout: Duration) -> Result<String> {
        Err(GioError::Unsupported("get resource name"))
    }

    /// An identifier that reconnects to this same resource.
    fn identifier(&self) -> Result<String> {
        Err(GioError::Unsupported("make resource identifier"))
    }

    /// Backend-specific state (for example the USB channel).
    fn object(&self) -> Option<&dyn Any> {
        None
    }
}
