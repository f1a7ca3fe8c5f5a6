//! Raw USB interfaces.
//!
//! Identifiers are `usb:` optionally followed by `vendor=`, `product=` and `serialNumber=`
//! parameters; a bare value is taken as the serial number. Which interfaces may be claimed
//! comes from the descriptor's channel definitions: the first attached device matching both
//! a definition and the identifier wins.

use super::Backend;
use crate::config::{Descriptor, UsbChannelDefinition};
use crate::endpoint::Endpoint;
use crate::error::{GioError, Result};
use crate::identifier::{strip_qualifier, BareParameter, DeviceFilter};
use crate::options::Options;
use crate::resource::{self, ControlRequest, Methods, Resource, ResourceType};
use rusb::{DeviceHandle, Direction, GlobalContext, TransferType};
use std::any::Any;
use std::time::Duration;
use tracing::{debug, warn};

pub const QUALIFIER: &str = "usb";

const HID_GET_REPORT: u8 = 0x01;
const HID_SET_REPORT: u8 = 0x09;
const GET_DESCRIPTOR: u8 = 0x06;
const HID_REPORT_DESCRIPTOR: u16 = 0x22;
const HID_REPORT_INPUT: u16 = 1;
const HID_REPORT_OUTPUT: u16 = 2;
const HID_REPORT_FEATURE: u16 = 3;
const MAX_HID_ITEMS: usize = 0x1000;

/// libusb treats a zero timeout as "wait forever".
fn transfer_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

/// The interface an endpoint ended up on. Available through
/// [`Endpoint::resource_object`](crate::endpoint::Endpoint::resource_object).
#[derive(Clone, Debug)]
pub struct UsbChannel {
    pub definition: UsbChannelDefinition,
    pub vendor: u16,
    pub product: u16,
    pub serial_number: Option<String>,
    pub bus: u8,
    pub address: u8,
}

#[derive(Clone, Copy, Debug)]
struct Pipe {
    address: u8,
    transfer: TransferType,
    max_packet: usize,
}

pub struct UsbResource {
    handle: DeviceHandle<GlobalContext>,
    channel: UsbChannel,
    input: Option<Pipe>,
    output: Option<Pipe>,
    /// Rest of the last input packet.
    pending: Vec<u8>,
}

fn find_pipe(
    device: &rusb::Device<GlobalContext>,
    definition: &UsbChannelDefinition,
    number: u8,
    direction: Direction,
) -> Result<Option<Pipe>> {
    if number == 0 {
        return Ok(None);
    }
    let config = device.active_config_descriptor()?;
    let pipe = config
        .interfaces()
        .filter(|interface| interface.number() == definition.interface)
        .flat_map(|interface| interface.descriptors())
        .filter(|setting| setting.setting_number() == definition.alternative)
        .flat_map(|setting| setting.endpoint_descriptors().collect::<Vec<_>>())
        .find(|endpoint| endpoint.number() == number && endpoint.direction() == direction)
        .map(|endpoint| Pipe {
            address: endpoint.address(),
            transfer: endpoint.transfer_type(),
            max_packet: usize::from(endpoint.max_packet_size()),
        });

    match pipe {
        Some(pipe) => Ok(Some(pipe)),
        None => Err(GioError::NotFound(format!(
            "USB endpoint {number} ({direction:?}) on interface {}",
            definition.interface
        ))),
    }
}

impl UsbResource {
    fn open(
        device: rusb::Device<GlobalContext>,
        handle: DeviceHandle<GlobalContext>,
        channel: UsbChannel,
    ) -> Result<Self> {
        let definition = &channel.definition;

        match handle.set_auto_detach_kernel_driver(true) {
            Ok(()) | Err(rusb::Error::NotSupported) => {}
            Err(e) => return Err(e.into()),
        }

        if definition.configuration != 0 && handle.active_configuration()? != definition.configuration {
            handle.set_active_configuration(definition.configuration)?;
        }

        handle.claim_interface(definition.interface)?;
        if definition.alternative != 0 {
            handle.set_alternate_setting(definition.interface, definition.alternative)?;
        }

        let input = find_pipe(&device, definition, definition.input_endpoint, Direction::In)?;
        let output = find_pipe(&device, definition, definition.output_endpoint, Direction::Out)?;

        debug!(
            vendor = format_args!("{:04X}", channel.vendor),
            product = format_args!("{:04X}", channel.product),
            interface = definition.interface,
            "USB channel opened"
        );
        Ok(Self {
            handle,
            channel,
            input,
            output,
            pending: Vec::new(),
        })
    }

    pub fn channel(&self) -> &UsbChannel {
        &self.channel
    }

    fn interface(&self) -> u16 {
        u16::from(self.channel.definition.interface)
    }

    fn fill_pending(&mut self, pipe: Pipe, capacity: usize, timeout: Duration) -> Result<bool> {
        let mut packet = vec![0u8; pipe.max_packet.max(capacity)];
        let timeout = transfer_timeout(timeout);
        let result = match pipe.transfer {
            TransferType::Interrupt => self.handle.read_interrupt(pipe.address, &mut packet, timeout),
            _ => self.handle.read_bulk(pipe.address, &mut packet, timeout),
        };
        match result {
            Ok(count) => {
                packet.truncate(count);
                self.pending = packet;
                Ok(count > 0)
            }
            Err(rusb::Error::Timeout) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn control_type(request: &ControlRequest, direction: Direction) -> u8 {
        let recipient = match request.recipient {
            resource::Recipient::Device => rusb::Recipient::Device,
            resource::Recipient::Interface => rusb::Recipient::Interface,
            resource::Recipient::Endpoint => rusb::Recipient::Endpoint,
            resource::Recipient::Other => rusb::Recipient::Other,
        };
        let kind = match request.request_type {
            resource::RequestType::Standard => rusb::RequestType::Standard,
            resource::RequestType::Class => rusb::RequestType::Class,
            resource::RequestType::Vendor => rusb::RequestType::Vendor,
        };
        rusb::request_type(direction, kind, recipient)
    }

    fn set_report(&mut self, kind: u16, identifier: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        let request = ControlRequest::class(
            resource::Recipient::Interface,
            HID_SET_REPORT,
            (kind << 8) | u16::from(identifier),
            self.interface(),
        );
        let written = if identifier == 0 {
            self.tell(&request, data, timeout)?
        } else {
            let mut report = Vec::with_capacity(data.len() + 1);
            report.push(identifier);
            report.extend_from_slice(data);
            self.tell(&request, &report, timeout)?.saturating_sub(1)
        };
        Ok(written)
    }

    fn get_report(&mut self, kind: u16, identifier: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        let request = ControlRequest::class(
            resource::Recipient::Interface,
            HID_GET_REPORT,
            (kind << 8) | u16::from(identifier),
            self.interface(),
        );
        if identifier != 0 {
            return self.ask(&request, buffer, timeout);
        }
        let Some((first, rest)) = buffer.split_first_mut() else {
            return Ok(0);
        };
        *first = 0;
        Ok(self.ask(&request, rest, timeout)? + 1)
    }
}

impl Resource for UsbResource {
    fn disconnect(&mut self) -> Result<()> {
        self.handle.release_interface(self.channel.definition.interface)?;
        debug!(interface = self.channel.definition.interface, "USB channel closed");
        Ok(())
    }

    fn read_data(&mut self, buffer: &mut [u8], initial: Duration, _subsequent: Duration) -> Result<usize> {
        let pipe = self.input.ok_or(GioError::Unsupported("read data"))?;
        if self.pending.is_empty() && !self.fill_pending(pipe, buffer.len(), initial)? {
            return Ok(0);
        }
        let count = self.pending.len().min(buffer.len());
        buffer[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }

    fn write_data(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let pipe = self.output.ok_or(GioError::Unsupported("write data"))?;
        let timeout = transfer_timeout(timeout);
        let chunk = pipe.max_packet.max(1);

        let mut written = 0;
        for packet in data.chunks(chunk) {
            written += match pipe.transfer {
                TransferType::Interrupt => self.handle.write_interrupt(pipe.address, packet, timeout)?,
                _ => self.handle.write_bulk(pipe.address, packet, timeout)?,
            };
        }
        Ok(written)
    }

    fn await_input(&mut self, timeout: Duration) -> Result<bool> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        let pipe = self.input.ok_or(GioError::Unsupported("await input"))?;
        self.fill_pending(pipe, 0, timeout)
    }

    fn tell(&mut self, request: &ControlRequest, data: &[u8], timeout: Duration) -> Result<usize> {
        Ok(self.handle.write_control(
            Self::control_type(request, Direction::Out),
            request.request,
            request.value,
            request.index,
            data,
            transfer_timeout(timeout),
        )?)
    }

    fn ask(&mut self, request: &ControlRequest, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        Ok(self.handle.read_control(
            Self::control_type(request, Direction::In),
            request.request,
            request.value,
            request.index,
            buffer,
            transfer_timeout(timeout),
        )?)
    }

    fn hid_items(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let request = ControlRequest {
            recipient: resource::Recipient::Interface,
            request_type: resource::RequestType::Standard,
            request: GET_DESCRIPTOR,
            value: HID_REPORT_DESCRIPTOR << 8,
            index: self.interface(),
        };
        let mut items = vec![0u8; MAX_HID_ITEMS];
        let count = self.ask(&request, &mut items, timeout)?;
        items.truncate(count);
        Ok(items)
    }

    fn set_hid_report(&mut self, identifier: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        self.set_report(HID_REPORT_OUTPUT, identifier, data, timeout)
    }

    fn get_hid_report(&mut self, identifier: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.get_report(HID_REPORT_INPUT, identifier, buffer, timeout)
    }

    fn set_hid_feature(&mut self, identifier: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        self.set_report(HID_REPORT_FEATURE, identifier, data, timeout)
    }

    fn get_hid_feature(&mut self, identifier: u8, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.get_report(HID_REPORT_FEATURE, identifier, buffer, timeout)
    }

    fn name(&mut self, _timeout: Duration) -> Result<String> {
        let descriptor = self.handle.device().device_descriptor()?;
        Ok(self.handle.read_product_string_ascii(&descriptor)?)
    }

    fn identifier(&self) -> Result<String> {
        let mut identifier = format!(
            "{QUALIFIER}:vendor=0x{:04x},product=0x{:04x}",
            self.channel.vendor, self.channel.product
        );
        if let Some(serial) = &self.channel.serial_number {
            identifier.push_str(",serialNumber=");
            identifier.push_str(serial);
        }
        Ok(identifier)
    }

    fn object(&self) -> Option<&dyn Any> {
        Some(&self.channel)
    }
}

pub struct UsbBackend;

impl Backend for UsbBackend {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Usb
    }

    fn is_supported(&self, descriptor: &Descriptor) -> Option<bool> {
        Some(!descriptor.usb.channel_definitions.is_empty())
    }

    fn test_identifier<'a>(&self, identifier: &'a str) -> Option<&'a str> {
        strip_qualifier(identifier, QUALIFIER)
    }

    fn options(&self, descriptor: Option<&Descriptor>) -> Option<Options> {
        Some(descriptor.map_or_else(|| Descriptor::default().usb.options, |d| d.usb.options.clone()))
    }

    fn methods(&self) -> Methods {
        Methods::STREAM
            | Methods::TELL_RESOURCE
            | Methods::ASK_RESOURCE
            | Methods::HID_REPORTS
            | Methods::RESOURCE_NAME
            | Methods::RESOURCE_IDENTIFIER
            | Methods::RESOURCE_OBJECT
    }

    fn connect(&self, identifier: &str, descriptor: Option<&Descriptor>) -> Result<Box<dyn Resource>> {
        let filter = DeviceFilter::parse(identifier, identifier, BareParameter::SerialNumber)?;
        let definitions = descriptor
            .map(|d| d.usb.channel_definitions.as_slice())
            .unwrap_or_default();
        if definitions.is_empty() {
            return Err(GioError::MissingConfiguration("USB channel definitions"));
        }

        for device in rusb::devices()?.iter() {
            let info = match device.device_descriptor() {
                Ok(info) => info,
                Err(e) => {
                    debug!(error = %e, "USB device descriptor unavailable");
                    continue;
                }
            };
            let (vendor, product) = (info.vendor_id(), info.product_id());
            let Some(definition) = definitions.iter().find(|d| d.matches(vendor, product)) else {
                continue;
            };
            if !filter.matches(vendor, product, filter.serial_number.as_deref()) {
                continue;
            }

            let handle = match device.open() {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(vendor, product, error = %e, "USB device open failed");
                    continue;
                }
            };
            let serial_number = handle.read_serial_number_string_ascii(&info).ok();
            if filter.serial_number.is_some() && serial_number != filter.serial_number {
                continue;
            }

            let channel = UsbChannel {
                definition: definition.clone(),
                vendor,
                product,
                serial_number,
                bus: device.bus_number(),
                address: device.address(),
            };
            return Ok(Box::new(UsbResource::open(device, handle, channel)?));
        }

        Err(GioError::NotFound(format!("{QUALIFIER}:{identifier}")))
    }

    /// Adopt the matched channel's serial rate, and its application data unless the options
    /// already carry some.
    fn prepare_endpoint(&self, endpoint: &mut Endpoint, _descriptor: Option<&Descriptor>) -> Result<()> {
        let (data, serial) = match endpoint.resource().object().and_then(|o| o.downcast_ref::<UsbChannel>()) {
            Some(channel) => (channel.definition.data.clone(), channel.definition.serial.clone()),
            None => return Ok(()),
        };
        if let Some(data) = data {
            if endpoint.application_data().is_none() {
                endpoint.set_application_data(data);
            }
        }
        if let Some(parameters) = serial {
            endpoint.update_bytes_per_second(&parameters);
        }
        Ok(())
    }
}
