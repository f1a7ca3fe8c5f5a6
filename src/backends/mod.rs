//! Transport backends and the registry that picks between them.
//!
//! A [`Backend`] recognises the identifiers it can serve, supplies default [`Options`] and
//! the set of [`Methods`] its resources implement, and connects. The [`Registry`] asks each
//! backend in order; the first one that accepts the identifier wins.
//!
//! # Feature flags
//! - **`serial`**: serial ports through `serialport` (default).
//! - **`bluetooth`**: RFCOMM sockets on Linux (default).
//! - **`usb`**: raw USB interfaces through `rusb`.
//! - **`hid`**: HID devices through `hidapi`.
//!
//! The null backend is always available.

use crate::config::Descriptor;
use crate::endpoint::Endpoint;
use crate::error::{GioError, Result};
use crate::options::Options;
use crate::resource::{Methods, Resource, ResourceType};
use tracing::{debug, warn};

pub mod null;

#[cfg(feature = "serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
pub mod serial;

#[cfg(feature = "usb")]
#[cfg_attr(docsrs, doc(cfg(feature = "usb")))]
pub mod usb;

#[cfg(all(feature = "bluetooth", target_os = "linux"))]
#[cfg_attr(docsrs, doc(cfg(all(feature = "bluetooth", target_os = "linux"))))]
pub mod bluetooth;

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;

/// One transport implementation.
pub trait Backend: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// Whether the descriptor enables this transport. `None` means the backend has no
    /// opinion, in which case it is skipped whenever a descriptor is given.
    fn is_supported(&self, descriptor: &Descriptor) -> Option<bool> {
        let _ = descriptor;
        None
    }

    /// If the identifier names a resource of this kind, return the part the backend needs
    /// (with its qualifier stripped).
    fn test_identifier<'a>(&self, identifier: &'a str) -> Option<&'a str>;

    /// Default options for new endpoints; generic defaults when `None`.
    fn options(&self, descriptor: Option<&Descriptor>) -> Option<Options> {
        let _ = descriptor;
        None
    }

    /// Operations implemented by this backend's resources.
    fn methods(&self) -> Methods;

    fn connect(&self, identifier: &str, descriptor: Option<&Descriptor>) -> Result<Box<dyn Resource>>;

    /// Last chance to adjust a freshly connected endpoint.
    fn prepare_endpoint(&self, endpoint: &mut Endpoint, descriptor: Option<&Descriptor>) -> Result<()> {
        let _ = (endpoint, descriptor);
        Ok(())
    }
}

/// Ordered list of backends.
pub struct Registry {
    backends: Vec<Box<dyn Backend>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { backends: Vec::new() }
    }

    /// Every backend compiled into this build, in priority order.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.push(null::NullBackend);
        #[cfg(feature = "serial")]
        registry.push(serial::SerialBackend);
        #[cfg(feature = "usb")]
        registry.push(usb::UsbBackend);
        #[cfg(all(feature = "bluetooth", target_os = "linux"))]
        registry.push(bluetooth::BluetoothBackend);
        #[cfg(feature = "hid")]
        registry.push(hid::HidBackend);
        registry
    }

    pub fn push(&mut self, backend: impl Backend + 'static) -> &mut Self {
        self.backends.push(Box::new(backend));
        self
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn resource_types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.backends.iter().map(|b| b.resource_type())
    }

    /// The first backend accepting `identifier`, along with the identifier as it sees it.
    pub fn select<'a>(
        &self,
        identifier: &'a str,
        descriptor: Option<&Descriptor>,
    ) -> Result<(&dyn Backend, &'a str)> {
        for backend in &self.backends {
            if let Some(descriptor) = descriptor {
                if backend.is_supported(descriptor) != Some(true) {
                    continue;
                }
            }
            if let Some(rest) = backend.test_identifier(identifier) {
                debug!(identifier, backend = %backend.resource_type(), "backend selected");
                return Ok((backend.as_ref(), rest));
            }
        }

        warn!(identifier, "unsupported resource identifier");
        Err(GioError::UnsupportedIdentifier(identifier.to_owned()))
    }

    /// Select a backend, connect, prepare and start the endpoint.
    pub fn connect(&self, identifier: &str, descriptor: Option<&Descriptor>) -> Result<Endpoint> {
        let (backend, rest) = self.select(identifier, descriptor)?;

        let options = backend.options(descriptor).unwrap_or_default();
        let resource = backend.connect(rest, descriptor)?;
        let mut endpoint = Endpoint::new(backend.resource_type(), resource, backend.methods(), options);

        let started = backend
            .prepare_endpoint(&mut endpoint, descriptor)
            .and_then(|()| endpoint.start());

        match started {
            Ok(()) => {
                debug!(identifier, resource = %endpoint.resource_type(), "endpoint ready");
                Ok(endpoint)
            }
            Err(e) => {
                if let Err(cleanup) = endpoint.disconnect() {
                    debug!(error = %cleanup, "disconnect after failed start");
                }
                Err(e)
            }
        }
    }
}

/// Connect through the standard registry.
pub fn connect(identifier: &str, descriptor: Option<&Descriptor>) -> Result<Endpoint> {
    Registry::standard().connect(identifier, descriptor)
}
