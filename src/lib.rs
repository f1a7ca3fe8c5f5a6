//! Generic I/O for refreshable braille displays.
//!
//! Drivers name their device with a free-form identifier (`serial:/dev/ttyUSB0`,
//! `usb:serialNumber=1234`, `hid:vendor=0x1c71`, `bluetooth:00:11:22:33:44:55`, `null:`)
//! and get back an [`Endpoint`] that reads, writes and talks HID the same way whatever the
//! transport underneath.
//!
//! ```no_run
//! use braille_gio::{connect, Descriptor, SerialParameters};
//!
//! let mut descriptor = Descriptor::default();
//! descriptor.serial.parameters = Some(SerialParameters::default().with_baud(19200));
//!
//! let mut endpoint = connect("serial:/dev/ttyUSB0", Some(&descriptor))?;
//! endpoint.write(&[0x1B, b'I'])?;
//! if let Some(byte) = endpoint.read_byte(true)? {
//!     println!("{byte:#04X}");
//! }
//! endpoint.disconnect()?;
//! # Ok::<(), braille_gio::GioError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backends;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod hid_items;
pub mod identifier;
mod input;
pub mod monitor;
pub mod options;
pub mod resource;
pub mod scheduler;

pub use backends::{connect, Backend, Registry};
pub use config::{Descriptor, FlowControl, Parity, SerialParameters, UsbChannelDefinition};
pub use endpoint::Endpoint;
pub use error::{GioError, Result};
pub use hid_items::{HidReportDescription, HidReportSizes};
pub use monitor::{InputEvent, InputHandler, InputMonitor};
pub use options::{ApplicationData, Options};
pub use resource::{ControlRequest, Methods, MonitorCallback, Recipient, RequestType, Resource, ResourceType};
pub use scheduler::{EventLoop, Scheduler};
