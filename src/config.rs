//! Connection descriptors.
//!
//! A [`Descriptor`] tells the registry which transports a caller is prepared to use and how to
//! configure each of them. Every section carries its own [`Options`]; the defaults match what
//! displays on each transport usually need.
//!
//! Descriptors are plain serde data, so a driver can keep them in a TOML or JSON file:
//!
//! ```toml
//! [serial.parameters]
//! baud = 19200
//! parity = "even"
//!
//! [[usb.channel_definitions]]
//! vendor = 0x0403
//! product = 0x6001
//! interface = 0
//! input_endpoint = 1
//! output_endpoint = 2
//! ```

use crate::error::Result;
use crate::options::{ApplicationData, Options};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Space,
    Mark,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

/// Line settings for serial transports (and USB serial adapters).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialParameters {
    pub baud: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for SerialParameters {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialParameters {
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Bits on the wire per character: start bit, data bits, parity bit, stop bits.
    pub fn character_size(&self) -> u32 {
        let parity = u32::from(self.parity != Parity::None);
        1 + u32::from(self.data_bits) + parity + u32::from(self.stop_bits)
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.baud / self.character_size()
    }
}

/// The null transport accepts everything written to it and never produces input.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NullDescriptor {
    pub enabled: bool,
    pub options: Options,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialDescriptor {
    /// Serial transports are only offered when parameters are given.
    pub parameters: Option<SerialParameters>,
    pub options: Options,
}

impl Default for SerialDescriptor {
    fn default() -> Self {
        Self {
            parameters: None,
            options: Options::default().with_input_timeout(Duration::from_millis(100)),
        }
    }
}

/// One USB interface a driver knows how to talk to.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbChannelDefinition {
    /// 0 matches any vendor.
    pub vendor: u16,
    /// 0 matches any product.
    pub product: u16,
    /// 0 leaves the active configuration alone.
    pub configuration: u8,
    pub interface: u8,
    pub alternative: u8,
    /// Endpoint number (without direction bit); 0 means the channel has no input pipe.
    pub input_endpoint: u8,
    /// Endpoint number; 0 means the channel has no output pipe.
    pub output_endpoint: u8,
    /// Present when the interface is a USB serial adapter.
    pub serial: Option<SerialParameters>,
    #[serde(skip)]
    pub data: Option<ApplicationData>,
}

impl Default for UsbChannelDefinition {
    fn default() -> Self {
        Self {
            vendor: 0,
            product: 0,
            configuration: 1,
            interface: 0,
            alternative: 0,
            input_endpoint: 0,
            output_endpoint: 0,
            serial: None,
            data: None,
        }
    }
}

impl UsbChannelDefinition {
    pub fn matches(&self, vendor: u16, product: u16) -> bool {
        (self.vendor == 0 || self.vendor == vendor) && (self.product == 0 || self.product == product)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbDescriptor {
    /// USB transports are only offered when at least one definition is given.
    pub channel_definitions: Vec<UsbChannelDefinition>,
    pub options: Options,
}

impl Default for UsbDescriptor {
    fn default() -> Self {
        let second = Duration::from_millis(1000);
        Self {
            channel_definitions: Vec::new(),
            options: Options::default()
                .with_input_timeout(second)
                .with_output_timeout(second)
                .with_request_timeout(second),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothDescriptor {
    /// RFCOMM channel; 0 disables the transport.
    pub channel_number: u8,
    pub options: Options,
}

impl Default for BluetoothDescriptor {
    fn default() -> Self {
        Self {
            channel_number: 0,
            options: Options::default()
                .with_input_timeout(Duration::from_millis(100))
                .with_request_timeout(Duration::from_millis(5000)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HidDescriptor {
    pub options: Options,
}

impl Default for HidDescriptor {
    fn default() -> Self {
        let second = Duration::from_millis(1000);
        Self {
            options: Options::default()
                .with_input_timeout(Duration::from_millis(100))
                .with_output_timeout(second)
                .with_request_timeout(second),
        }
    }
}

/// What a caller is willing to connect to, per transport.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub null: NullDescriptor,
    pub serial: SerialDescriptor,
    pub usb: UsbDescriptor,
    pub bluetooth: BluetoothDescriptor,
    pub hid: HidDescriptor,
}

impl Descriptor {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a descriptor from disk; `.json` files are JSON, anything else is TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&text),
            _ => Self::from_toml_str(&text),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()).into()
        })
    }
}
