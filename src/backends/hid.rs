//! HID devices through `hidapi`.
//!
//! Identifiers are `hid:` followed by either a device path or `vendor=`, `product=` and
//! `serialNumber=` parameters. With nothing after the qualifier the first HID device found
//! is used.

use super::Backend;
use crate::config::Descriptor;
use crate::error::{GioError, Result};
use crate::identifier::{strip_qualifier, BareParameter, DeviceFilter};
use crate::options::Options;
use crate::resource::{Methods, Resource, ResourceType};
use hidapi::{DeviceInfo, HidApi, HidDevice};
use std::ffi::CString;
use std::time::Duration;
use tracing::debug;

pub const QUALIFIER: &str = "hid";

/// Largest report read in one go.
const MAX_REPORT_SIZE: usize = 0x400;
/// Largest report descriptor accepted.
const MAX_HID_ITEMS: usize = 0x1000;

fn millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

pub struct HidResource {
    raw: HidDevice,
    vendor: u16,
    product: u16,
    serial_number: Option<String>,
    path: String,
    /// Rest of the last input report.
    pending: Vec<u8>,
}

impl HidResource {
    fn new(raw: HidDevice, info: &DeviceInfo) -> Self {
        let resource = Self {
            raw,
            vendor: info.vendor_id(),
            product: info.product_id(),
            serial_number: info.serial_number().map(str::to_owned),
            path: info.path().to_string_lossy().into_owned(),
            pending: Vec::new(),
        };
        debug!(
            vendor = format_args!("{:04X}", resource.vendor),
            product = format_args!("{:04X}", resource.product),
            path = %resource.path,
            "HID device opened"
        );
        resource
    }

    fn fill_pending(&mut self, capacity: usize, timeout: Duration) -> Result<bool> {
        let mut report = vec![0u8; capacity.max(MAX_REPORT_SIZE)];
        let count = self.raw.read_timeout(&mut report, millis(timeout))?;
        report.truncate(count);
        self.pending = report;
        Ok(count > 0)
    }
}

fn with_identifier(identifier: u8, data: &[u8]) -> Vec<u8> {
    let mut report = Vec::with_capacity(data.len() + 1);
    report.push(identifier);
    report.extend_from_slice(data);
    report
}

impl Resource for HidResource {
    fn disconnect(&mut self) -> Result<()> {
        debug!(path = %self.path, "HID device closed");
        Ok(())
    }

    fn read_data(&mut self, buffer: &mut [u8], initial: Duration, _subsequent: Duration) -> Result<usize> {
        if self.pending.is_empty() && !self.fill_pending(buffer.len(), initial)? {
            return Ok(0);
        }
        let count = self.pending.len().min(buffer.len());
        buffer[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }

    fn write_data(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        Ok(self.raw.write(data)?)
    }

    fn await_input(&mut self, timeout: Duration) -> Result<bool> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        self.fill_pending(0, timeout)
    }

    fn hid_items(&mut self, _timeout: Duration) -> Result<Vec<u8>> {
        let mut items = vec![0u8; MAX_HID_ITEMS];
        let count = self.raw.get_report_descriptor(&mut items)?;
        items.truncate(count);
        Ok(items)
    }

    fn set_hid_report(&mut self, identifier: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        let written = self.raw.write(&with_identifier(identifier, data))?;
        Ok(written.saturating_sub(1))
    }

    fn get_hid_report(&mut self, identifier: u8, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
        let Some(first) = buffer.first_mut() else {
            return Ok(0);
        };
        *first = identifier;
        Ok(self.raw.get_input_report(buffer)?)
    }

    fn set_hid_feature(&mut self, identifier: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.raw.send_feature_report(&with_identifier(identifier, data))?;
        Ok(data.len())
    }

    fn get_hid_feature(&mut self, identifier: u8, buffer: &mut [u8], _timeout: Duration) -> Result<usize> {
        let Some(first) = buffer.first_mut() else {
            return Ok(0);
        };
        *first = identifier;
        Ok(self.raw.get_feature_report(buffer)?)
    }

    fn name(&mut self, _timeout: Duration) -> Result<String> {
        self.raw
            .get_product_string()?
            .ok_or_else(|| GioError::NotFound(format!("product string of {}", self.path)))
    }

    fn identifier(&self) -> Result<String> {
        let mut identifier = format!(
            "{QUALIFIER}:vendor=0x{:04x},product=0x{:04x}",
            self.vendor, self.product
        );
        if let Some(serial) = &self.serial_number {
            identifier.push_str(",serialNumber=");
            identifier.push_str(serial);
        }
        Ok(identifier)
    }
}

pub struct HidBackend;

impl HidBackend {
    fn open(api: &HidApi, identifier: &str, filter: &DeviceFilter) -> Result<HidResource> {
        if let Some(path) = &filter.path {
            let path = CString::new(path.as_str()).map_err(|e| GioError::InvalidIdentifier {
                identifier: identifier.to_owned(),
                reason: e.to_string(),
            })?;
            let raw = api.open_path(&path)?;
            let info = raw.get_device_info()?;
            return Ok(HidResource::new(raw, &info));
        }

        let info = api
            .device_list()
            .find(|info| filter.matches(info.vendor_id(), info.product_id(), info.serial_number()))
            .ok_or_else(|| GioError::NotFound(format!("{QUALIFIER}:{identifier}")))?;
        let raw = info.open_device(api)?;
        Ok(HidResource::new(raw, info))
    }
}

impl Backend for HidBackend {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Hid
    }

    fn is_supported(&self, _descriptor: &Descriptor) -> Option<bool> {
        Some(true)
    }

    fn test_identifier<'a>(&self, identifier: &'a str) -> Option<&'a str> {
        strip_qualifier(identifier, QUALIFIER)
    }

    fn options(&self, descriptor: Option<&Descriptor>) -> Option<Options> {
        Some(descriptor.map_or_else(|| Descriptor::default().hid.options, |d| d.hid.options.clone()))
    }

    fn methods(&self) -> Methods {
        Methods::STREAM | Methods::HID_REPORTS | Methods::RESOURCE_NAME | Methods::RESOURCE_IDENTIFIER
    }

    fn connect(&self, identifier: &str, _descriptor: Option<&Descriptor>) -> Result<Box<dyn Resource>> {
        let filter = DeviceFilter::parse(identifier, identifier, BareParameter::Path)?;
        let api = HidApi::new()?;
        Ok(Box::new(Self::open(&api, identifier, &filter)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_report_identifier() {
        assert_eq!(with_identifier(5, &[1, 2]), vec![5, 1, 2]);
        assert_eq!(with_identifier(0, &[]), vec![0]);
    }

    #[test]
    fn recognises_hid_identifiers() {
        let b = HidBackend;
        assert_eq!(b.test_identifier("hid:/dev/hidraw3"), Some("/dev/hidraw3"));
        assert_eq!(b.test_identifier("usb:"), None);
        assert_eq!(b.is_supported(&Descriptor::default()), Some(true));
        assert_eq!(b.options(None).unwrap().request_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn timeouts_fit_hidapi() {
        assert_eq!(millis(Duration::from_millis(250)), 250);
        assert_eq!(millis(Duration::from_secs(u64::MAX)), i32::MAX);
    }
}
