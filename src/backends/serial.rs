//! Serial ports.
//!
//! Identifiers are `serial:<device>` or just the device (`/dev/ttyUSB0`, `COM3`).

use super::Backend;
use crate::config::{Descriptor, FlowControl, Parity, SerialParameters};
use crate::endpoint::Endpoint;
use crate::error::{GioError, Result};
use crate::identifier::{has_qualifier, strip_qualifier};
use crate::options::Options;
use crate::resource::{Methods, Resource, ResourceType};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

pub const QUALIFIER: &str = "serial";

/// Used for writes when no output timeout is configured.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
const AWAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct SerialBackend;

pub struct SerialResource {
    path: String,
    port: Box<dyn SerialPort>,
    parameters: SerialParameters,
}

fn unsupported_setting(what: String) -> GioError {
    io::Error::new(io::ErrorKind::Unsupported, what).into()
}

fn data_bits(parameters: &SerialParameters) -> Result<serialport::DataBits> {
    use serialport::DataBits::*;
    Ok(match parameters.data_bits {
        5 => Five,
        6 => Six,
        7 => Seven,
        8 => Eight,
        n => return Err(unsupported_setting(format!("{n} data bits"))),
    })
}

fn stop_bits(parameters: &SerialParameters) -> Result<serialport::StopBits> {
    match parameters.stop_bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        n => Err(unsupported_setting(format!("{n} stop bits"))),
    }
}

fn parity(parameters: &SerialParameters) -> Result<serialport::Parity> {
    match parameters.parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        other => Err(unsupported_setting(format!("{other:?} parity"))),
    }
}

fn flow_control(parameters: &SerialParameters) -> serialport::FlowControl {
    match parameters.flow_control {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
        FlowControl::Software => serialport::FlowControl::Software,
    }
}

fn is_no_data(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

impl SerialResource {
    pub fn open(path: &str, parameters: SerialParameters) -> Result<Self> {
        let port = serialport::new(path, parameters.baud)
            .data_bits(data_bits(&parameters)?)
            .parity(parity(&parameters)?)
            .stop_bits(stop_bits(&parameters)?)
            .flow_control(flow_control(&parameters))
            .timeout(Duration::ZERO)
            .open()?;

        debug!(path, baud = parameters.baud, "serial port opened");
        Ok(Self {
            path: path.to_owned(),
            port,
            parameters,
        })
    }

    pub fn parameters(&self) -> &SerialParameters {
        &self.parameters
    }

    fn read_some(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize> {
        self.port.set_timeout(timeout)?;
        match self.port.read(buffer) {
            Ok(count) => Ok(count),
            Err(e) if is_no_data(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl Resource for SerialResource {
    fn disconnect(&mut self) -> Result<()> {
        debug!(path = %self.path, "serial port closed");
        Ok(())
    }

    fn reconfigure(&mut self, parameters: &SerialParameters) -> Result<()> {
        self.port.set_baud_rate(parameters.baud)?;
        self.port.set_data_bits(data_bits(parameters)?)?;
        self.port.set_parity(parity(parameters)?)?;
        self.port.set_stop_bits(stop_bits(parameters)?)?;
        self.port.set_flow_control(flow_control(parameters))?;
        self.parameters = parameters.clone();
        debug!(path = %self.path, baud = parameters.baud, "serial port reconfigured");
        Ok(())
    }

    fn read_data(&mut self, buffer: &mut [u8], initial: Duration, subsequent: Duration) -> Result<usize> {
        let mut count = self.read_some(buffer, initial)?;
        if count == 0 || subsequent.is_zero() {
            return Ok(count);
        }
        while count < buffer.len() {
            match self.read_some(&mut buffer[count..], subsequent)? {
                0 => break,
                n => count += n,
            }
        }
        Ok(count)
    }

    fn write_data(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let timeout = if timeout.is_zero() { DEFAULT_WRITE_TIMEOUT } else { timeout };
        self.port.set_timeout(timeout)?;
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn await_input(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.port.bytes_to_read()? > 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            thread::sleep(AWAIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn name(&mut self, _timeout: Duration) -> Result<String> {
        Ok(self.port.name().unwrap_or_else(|| self.path.clone()))
    }

    fn identifier(&self) -> Result<String> {
        Ok(format!("{QUALIFIER}:{}", self.path))
    }
}

impl SerialBackend {
    fn parameters(descriptor: Option<&Descriptor>) -> SerialParameters {
        descriptor
            .and_then(|d| d.serial.parameters.clone())
            .unwrap_or_default()
    }
}

impl Backend for SerialBackend {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Serial
    }

    fn is_supported(&self, descriptor: &Descriptor) -> Option<bool> {
        Some(descriptor.serial.parameters.is_some())
    }

    fn test_identifier<'a>(&self, identifier: &'a str) -> Option<&'a str> {
        strip_qualifier(identifier, QUALIFIER).or_else(|| (!has_qualifier(identifier)).then_some(identifier))
    }

    fn options(&self, descriptor: Option<&Descriptor>) -> Option<Options> {
        Some(descriptor.map_or_else(|| Descriptor::default().serial.options, |d| d.serial.options.clone()))
    }

    fn methods(&self) -> Methods {
        Methods::STREAM | Methods::RECONFIGURE | Methods::RESOURCE_NAME | Methods::RESOURCE_IDENTIFIER
    }

    fn connect(&self, identifier: &str, descriptor: Option<&Descriptor>) -> Result<Box<dyn Resource>> {
        if identifier.is_empty() {
            return Err(GioError::InvalidIdentifier {
                identifier: identifier.to_owned(),
                reason: "no serial device".to_owned(),
            });
        }
        Ok(Box::new(SerialResource::open(identifier, Self::parameters(descriptor))?))
    }

    fn prepare_endpoint(&self, endpoint: &mut Endpoint, descriptor: Option<&Descriptor>) -> Result<()> {
        endpoint.update_bytes_per_second(&Self::parameters(descriptor));
        Ok(())
    }
}
