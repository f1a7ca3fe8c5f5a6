//! Bluetooth RFCOMM sockets (Linux).
//!
//! Identifiers are `bluetooth:`, `bt:` or `bluez:` followed by the device address
//! (`00:11:22:33:44:55`). The RFCOMM channel comes from the descriptor.

use super::Backend;
use crate::config::Descriptor;
use crate::error::{GioError, Result};
use crate::identifier::strip_any_qualifier;
use crate::options::Options;
use crate::resource::{Methods, Resource, ResourceType};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;
use tracing::debug;

pub const QUALIFIERS: &[&str] = &["bluetooth", "bt", "bluez"];

const AF_BLUETOOTH: libc::c_int = 31;
const BTPROTO_RFCOMM: libc::c_int = 3;

/// A device address, most significant byte first (as written).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    pub fn parse(text: &str) -> Option<Self> {
        let mut address = [0u8; 6];
        let mut parts = text.split(':');
        for byte in &mut address {
            let part = parts.next()?;
            if part.len() != 2 {
                return None;
            }
            *byte = u8::from_str_radix(part, 16).ok()?;
        }
        parts.next().is_none().then_some(Self(address))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[repr(C)]
struct SockaddrRc {
    rc_family: libc::sa_family_t,
    rc_bdaddr: [u8; 6],
    rc_channel: u8,
}

fn connect_rfcomm(address: DeviceAddress, channel: u8) -> io::Result<OwnedFd> {
    // SAFETY: socket(2) has no memory-safety preconditions.
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
            BTPROTO_RFCOMM,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `fd` was just returned by socket(2) and is owned by nothing else.
    let socket = unsafe { OwnedFd::from_raw_fd(fd) };

    // bdaddr_t is little-endian
    let mut bdaddr = address.0;
    bdaddr.reverse();
    let sockaddr = SockaddrRc {
        rc_family: AF_BLUETOOTH as libc::sa_family_t,
        rc_bdaddr: bdaddr,
        rc_channel: channel,
    };

    // SAFETY: `sockaddr` is a valid sockaddr_rc and the length passed matches it.
    let result = unsafe {
        libc::connect(
            socket.as_raw_fd(),
            (&sockaddr as *const SockaddrRc).cast::<libc::sockaddr>(),
            mem::size_of::<SockaddrRc>() as libc::socklen_t,
        )
    };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(socket)
}

fn poll(fd: &File, events: libc::c_short, timeout: Duration) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: one valid pollfd is passed.
    let result = unsafe { libc::poll(&mut pollfd, 1, millis) };
    if result < 0 {
        let error = io::Error::last_os_error();
        if error.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(error);
    }
    Ok(result > 0)
}

pub struct BluetoothResource {
    address: DeviceAddress,
    channel: u8,
    socket: File,
}

impl BluetoothResource {
    pub fn connect(address: DeviceAddress, channel: u8) -> Result<Self> {
        let socket = File::from(connect_rfcomm(address, channel)?);
        debug!(%address, channel, "RFCOMM connected");
        Ok(Self {
            address,
            channel,
            socket,
        })
    }
}

impl Resource for BluetoothResource {
    fn disconnect(&mut self) -> Result<()> {
        debug!(address = %self.address, channel = self.channel, "RFCOMM disconnected");
        Ok(())
    }

    fn read_data(&mut self, buffer: &mut [u8], initial: Duration, subsequent: Duration) -> Result<usize> {
        let mut count = 0;
        let mut timeout = initial;
        while count < buffer.len() {
            if !poll(&self.socket, libc::POLLIN, timeout)? {
                break;
            }
            match self.socket.read(&mut buffer[count..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(n) => count += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
            timeout = subsequent;
        }
        Ok(count)
    }

    fn write_data(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        if !timeout.is_zero() && !poll(&self.socket, libc::POLLOUT, timeout)? {
            return Err(GioError::TimedOut);
        }
        self.socket.write_all(data)?;
        Ok(data.len())
    }

    fn await_input(&mut self, timeout: Duration) -> Result<bool> {
        Ok(poll(&self.socket, libc::POLLIN, timeout)?)
    }

    fn name(&mut self, _timeout: Duration) -> Result<String> {
        Ok(self.address.to_string())
    }

    fn identifier(&self) -> Result<String> {
        Ok(format!("{}:{}", QUALIFIERS[0], self.address))
    }
}

pub struct BluetoothBackend;

impl Backend for BluetoothBackend {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Bluetooth
    }

    fn is_supported(&self, descriptor: &Descriptor) -> Option<bool> {
        Some(descriptor.bluetooth.channel_number != 0)
    }

    fn test_identifier<'a>(&self, identifier: &'a str) -> Option<&'a str> {
        strip_any_qualifier(identifier, QUALIFIERS)
    }

    fn options(&self, descriptor: Option<&Descriptor>) -> Option<Options> {
        Some(descriptor.map_or_else(|| Descriptor::default().bluetooth.options, |d| d.bluetooth.options.clone()))
    }

    fn methods(&self) -> Methods {
        Methods::STREAM | Methods::RESOURCE_NAME | Methods::RESOURCE_IDENTIFIER
    }

    fn connect(&self, identifier: &str, descriptor: Option<&Descriptor>) -> Result<Box<dyn Resource>> {
        let address = DeviceAddress::parse(identifier).ok_or_else(|| GioError::InvalidIdentifier {
            identifier: identifier.to_owned(),
            reason: "expected a device address like 00:11:22:33:44:55".to_owned(),
        })?;
        let channel = descriptor.map_or(0, |d| d.bluetooth.channel_number);
        if channel == 0 {
            return Err(GioError::MissingConfiguration("RFCOMM channel number"));
        }
        Ok(Box::new(BluetoothResource::connect(address, channel)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_addresses() {
        let a = DeviceAddress::parse("00:1a:2B:3c:4D:5e").unwrap();
        assert_eq!(a.0, [0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E]);
        assert_eq!(a.to_string(), "00:1A:2B:3C:4D:5E");
        assert!(DeviceAddress::parse("00:11:22:33:44").is_none());
        assert!(DeviceAddress::parse("00:11:22:33:44:55:66").is_none());
        assert!(DeviceAddress::parse("0:11:22:33:44:55").is_none());
        assert!(DeviceAddress::parse("zz:11:22:33:44:55").is_none());
    }

    #[test]
    fn recognises_all_qualifiers() {
        let b = BluetoothBackend;
        for q in ["bluetooth", "BT", "bluez"] {
            assert_eq!(b.test_identifier(&format!("{q}:00:11:22:33:44:55")), Some("00:11:22:33:44:55"));
        }
        assert_eq!(b.test_identifier("00:11:22:33:44:55"), None);
    }

    #[test]
    fn requires_a_channel() {
        let b = BluetoothBackend;
        assert!(matches!(
            b.connect("00:11:22:33:44:55", None),
            Err(GioError::MissingConfiguration(_))
        ));
        assert!(matches!(b.connect("nonsense", None), Err(GioError::InvalidIdentifier { .. })));
        assert_eq!(b.is_supported(&Descriptor::default()), Some(false));
    }

    #[test]
    fn transport_defaults_without_descriptor() {
        let o = BluetoothBackend.options(None).unwrap();
        assert_eq!(o.request_timeout, std::time::Duration::from_millis(5000));
    }

    #[test]
    fn sockaddr_matches_kernel_layout() {
        assert_eq!(mem::size_of::<SockaddrRc>(), 10);
    }
}
