//! A live connection.
//!
//! [`Endpoint`] wraps whatever [`Resource`] the selected backend produced and adds the
//! behaviour every transport shares: an over-read input cache with error latching, the
//! write-timeout policy, lazily fetched HID report descriptors, and the check that keeps
//! calls to unimplemented operations from ever reaching the backend.

use crate::config::SerialParameters;
use crate::error::{GioError, Result};
use crate::hid_items::{self, HidReportSizes};
use crate::input::InputCache;
use crate::options::{ApplicationData, Options};
use crate::resource::{ControlRequest, Methods, MonitorCallback, Resource, ResourceType};
use std::any::Any;
use std::io;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub struct Endpoint {
    resource_type: ResourceType,
    resource: Box<dyn Resource>,
    methods: Methods,
    options: Options,
    bytes_per_second: u32,
    input: InputCache,
    hid_items: Option<Vec<u8>>,
    connected: bool,
}

impl Endpoint {
    pub(crate) fn new(
        resource_type: ResourceType,
        resource: Box<dyn Resource>,
        methods: Methods,
        options: Options,
    ) -> Self {
        Self {
            resource_type,
            resource,
            methods,
            options,
            bytes_per_second: 0,
            input: InputCache::default(),
            hid_items: None,
            connected: true,
        }
    }

    fn require(&self, method: Methods, operation: &'static str) -> Result<()> {
        if self.methods.contains(method) {
            Ok(())
        } else {
            debug!(operation, resource = %self.resource_type, "unsupported operation");
            Err(GioError::Unsupported(operation))
        }
    }

    /// Let the device settle, then throw away anything it sent while connecting.
    pub(crate) fn start(&mut self) -> Result<()> {
        if !self.options.ready_delay.is_zero() {
            trace!(delay = ?self.options.ready_delay, "waiting for resource to become ready");
            thread::sleep(self.options.ready_delay);
        }
        if self.methods.contains(Methods::READ_DATA) {
            self.discard_input()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.hid_items = None;
        self.input.clear();
        self.require(Methods::DISCONNECT, "disconnect")?;
        self.resource.disconnect()
    }

    /// Release the transport.
    ///
    /// Core state is always released; the result reports whether the backend itself
    /// disconnected cleanly.
    pub fn disconnect(mut self) -> Result<()> {
        self.close()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn application_data(&self) -> Option<&ApplicationData> {
        self.options.application_data.as_ref()
    }

    #[cfg(feature = "usb")]
    pub(crate) fn set_application_data(&mut self, data: ApplicationData) {
        self.options.application_data = Some(data);
    }

    #[cfg(feature = "usb")]
    pub(crate) fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    /// Bytes currently held in the input cache.
    pub fn pending_input(&self) -> usize {
        self.input.pending()
    }

    /// Read up to `buffer.len()` bytes.
    ///
    /// Cached bytes are served first. With `wait` unset the first backend read does not
    /// block; once any data has arrived later reads wait up to the input timeout. A backend
    /// failure after some bytes were delivered is held back and returned by the next call.
    /// `Ok(0)` means no data is available right now.
    pub fn read(&mut self, buffer: &mut [u8], wait: bool) -> Result<usize> {
        self.require(Methods::READ_DATA, "read data")?;

        let timeout = self.options.input_timeout;
        let resource = &mut self.resource;
        self.input.read_with(buffer, wait, |chunk, wait| {
            let initial = if wait { timeout } else { Duration::ZERO };
            resource.read_data(chunk, initial, Duration::ZERO)
        })
    }

    /// `Ok(None)` when no byte is available.
    pub fn read_byte(&mut self, wait: bool) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok(match self.read(&mut byte, wait)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }

    /// Drop everything readable right now. Fails if the transport reports an error.
    pub fn discard_input(&mut self) -> Result<()> {
        let mut discarded = 0usize;
        while self.read_byte(false)?.is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, resource = %self.resource_type, "discarded stale input");
        }
        Ok(())
    }

    /// Write `data`, waiting up to the output timeout.
    ///
    /// With `ignore_write_timeouts` set a timed-out write reports the whole buffer as written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.require(Methods::WRITE_DATA, "write data")?;

        match self.resource.write_data(data, self.options.output_timeout) {
            Err(e) if e.is_timeout() && self.options.ignore_write_timeouts => {
                debug!(size = data.len(), "write timed out; ignored");
                Ok(data.len())
            }
            other => other,
        }
    }

    /// Whether input is (or becomes, within `timeout`) available.
    pub fn await_input(&mut self, timeout: Duration) -> Result<bool> {
        self.require(Methods::AWAIT_INPUT, "await input")?;
        if self.input.pending() > 0 {
            return Ok(true);
        }
        self.resource.await_input(timeout)
    }

    /// Install or remove the backend's native input callback.
    pub fn monitor_input(&mut self, callback: Option<MonitorCallback>) -> Result<()> {
        self.require(Methods::MONITOR_INPUT, "monitor input")?;
        self.resource.monitor_input(callback)
    }

    pub fn reconfigure(&mut self, parameters: &SerialParameters) -> Result<()> {
        self.require(Methods::RECONFIGURE, "reconfigure")?;
        self.resource.reconfigure(parameters)?;
        self.update_bytes_per_second(parameters);
        Ok(())
    }

    pub fn update_bytes_per_second(&mut self, parameters: &SerialParameters) {
        self.bytes_per_second = parameters.bytes_per_second();
    }

    /// Estimated throughput; 0 when unknown.
    pub fn bytes_per_second(&self) -> u32 {
        self.bytes_per_second
    }

    /// Estimated time, in milliseconds, to push `bytes` through the transport.
    /// 0 when the rate is unknown.
    pub fn milliseconds_to_transfer(&self, bytes: usize) -> u64 {
        match self.bytes_per_second {
            0 => 0,
            bps => (bytes as u64).saturating_mul(1000) / u64::from(bps) + 1,
        }
    }

    pub fn tell_resource(&mut self, request: &ControlRequest, data: &[u8]) -> Result<usize> {
        self.require(Methods::TELL_RESOURCE, "tell resource")?;
        self.resource.tell(request, data, self.options.request_timeout)
    }

    pub fn ask_resource(&mut self, request: &ControlRequest, buffer: &mut [u8]) -> Result<usize> {
        self.require(Methods::ASK_RESOURCE, "ask resource")?;
        self.resource.ask(request, buffer, self.options.request_timeout)
    }

    /// The HID report descriptor, fetched on first use and kept until disconnect.
    pub fn hid_items(&mut self) -> Result<&[u8]> {
        self.require(Methods::HID_ITEMS, "get HID items")?;

        let items = match self.hid_items.take() {
            Some(items) => items,
            None => {
                let items = self.resource.hid_items(self.options.request_timeout)?;
                debug!(size = items.len(), "fetched HID report descriptor");
                items
            }
        };
        Ok(self.hid_items.insert(items).as_slice())
    }

    /// Wire length of report `identifier`, including its identifier byte.
    pub fn hid_report_size(&mut self, identifier: u8) -> Result<usize> {
        let items = self.hid_items()?;
        hid_items::report_size(items, identifier)
    }

    /// Input, output and feature lengths of report `identifier` (0 for unnumbered reports).
    pub fn hid_report_sizes(&mut self, identifier: u8) -> Result<HidReportSizes> {
        let items = self.hid_items()?;
        hid_items::report_sizes(items, identifier).ok_or(GioError::ReportNotFound(identifier))
    }

    pub fn set_hid_report(&mut self, identifier: u8, data: &[u8]) -> Result<usize> {
        self.require(Methods::SET_HID_REPORT, "set HID report")?;
        self.resource.set_hid_report(identifier, data, self.options.request_timeout)
    }

    pub fn get_hid_report(&mut self, identifier: u8, buffer: &mut [u8]) -> Result<usize> {
        self.require(Methods::GET_HID_REPORT, "get HID report")?;
        self.resource.get_hid_report(identifier, buffer, self.options.request_timeout)
    }

    pub fn set_hid_feature(&mut self, identifier: u8, data: &[u8]) -> Result<usize> {
        self.require(Methods::SET_HID_FEATURE, "set HID feature")?;
        self.resource.set_hid_feature(identifier, data, self.options.request_timeout)
    }

    pub fn get_hid_feature(&mut self, identifier: u8, buffer: &mut [u8]) -> Result<usize> {
        self.require(Methods::GET_HID_FEATURE, "get HID feature")?;
        self.resource.get_hid_feature(identifier, buffer, self.options.request_timeout)
    }

    /// Send a report laid out as on the wire: identifier byte, then payload.
    pub fn write_hid_report(&mut self, report: &[u8]) -> Result<usize> {
        self.require(Methods::SET_HID_REPORT, "set HID report")?;
        let (identifier, payload) = split_report(report)?;
        self.set_hid_report(identifier, payload)
    }

    pub fn write_hid_feature(&mut self, report: &[u8]) -> Result<usize> {
        self.require(Methods::SET_HID_FEATURE, "set HID feature")?;
        let (identifier, payload) = split_report(report)?;
        self.set_hid_feature(identifier, payload)
    }

    /// Fetch the report named by `buffer[0]` into `buffer`.
    pub fn read_hid_report(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.require(Methods::GET_HID_REPORT, "get HID report")?;
        let identifier = report_identifier(buffer)?;
        self.get_hid_report(identifier, buffer)
    }

    pub fn read_hid_feature(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.require(Methods::GET_HID_FEATURE, "get HID feature")?;
        let identifier = report_identifier(buffer)?;
        self.get_hid_feature(identifier, buffer)
    }

    pub fn resource_name(&mut self) -> Result<String> {
        self.require(Methods::RESOURCE_NAME, "get resource name")?;
        self.resource.name(self.options.request_timeout)
    }

    /// An identifier string that reconnects to this resource.
    pub fn resource_identifier(&self) -> Result<String> {
        self.require(Methods::RESOURCE_IDENTIFIER, "make resource identifier")?;
        self.resource.identifier()
    }

    pub fn resource_object(&self) -> Result<&dyn Any> {
        self.require(Methods::RESOURCE_OBJECT, "get resource object")?;
        self.resource
            .object()
            .ok_or_else(|| GioError::NotFound(format!("{} resource object", self.resource_type)))
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if self.connected {
            if let Err(e) = self.close() {
                if !e.is_unsupported() {
                    warn!(resource = %self.resource_type, error = %e, "disconnect failed");
                }
            }
        }
    }
}

fn empty_report() -> GioError {
    io::Error::new(io::ErrorKind::InvalidInput, "empty HID report buffer").into()
}

fn split_report(report: &[u8]) -> Result<(u8, &[u8])> {
    report
        .split_first()
        .map(|(identifier, payload)| (*identifier, payload))
        .ok_or_else(empty_report)
}

fn report_identifier(buffer: &[u8]) -> Result<u8> {
    buffer.first().copied().ok_or_else(empty_report)
}
