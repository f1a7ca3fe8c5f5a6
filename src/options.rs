//! Per-connection tunables.
//!
//! [`Options`] is copied into an [`Endpoint`](crate::endpoint::Endpoint) when it connects and
//! stays fixed afterwards (the only exception being a backend's prepare hook, which may adopt
//! application data from its own channel definition).
//!
//! In configuration files every duration is written in milliseconds:
//!
//! ```toml
//! ready_delay = 0
//! input_timeout = 100
//! output_timeout = 1000
//! request_timeout = 1000
//! ignore_write_timeouts = false
//! ```

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Opaque value an application attaches to a connection (typically driver model data).
///
/// The endpoint never looks inside it; it is handed back through
/// [`Endpoint::application_data`](crate::endpoint::Endpoint::application_data) and to input
/// handlers.
#[derive(Clone)]
pub struct ApplicationData(Arc<dyn Any + Send + Sync>);

impl ApplicationData {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ApplicationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApplicationData(..)")
    }
}

/// Connection options.
///
/// The all-zero default means: no settle delay, non-blocking reads, and no timeout budget for
/// writes or control requests beyond what the backend itself imposes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    #[serde(skip)]
    pub application_data: Option<ApplicationData>,

    /// How long to wait after connecting before the endpoint is declared ready.
    #[serde(with = "millis")]
    pub ready_delay: Duration,

    /// Timeout for a blocking read.
    #[serde(with = "millis")]
    pub input_timeout: Duration,

    #[serde(with = "millis")]
    pub output_timeout: Duration,

    /// Timeout for control transfers, HID report access and name lookups.
    #[serde(with = "millis")]
    pub request_timeout: Duration,

    /// Treat a write that times out as fully written.
    ///
    /// Some displays silently drop output under contention; with this set such a write is not
    /// reported as a fault.
    pub ignore_write_timeouts: bool,
}

impl Options {
    pub fn with_input_timeout(mut self, timeout: Duration) -> Self {
        self.input_timeout = timeout;
        self
    }

    pub fn with_output_timeout(mut self, timeout: Duration) -> Self {
        self.output_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    pub fn with_application_data(mut self, data: ApplicationData) -> Self {
        self.application_data = Some(data);
        self
    }
}

/// Serialize a [`Duration`] as an integer number of milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
