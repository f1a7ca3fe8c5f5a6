//! The null transport: writes vanish, reads never produce anything.
//!
//! Useful for running a driver without hardware attached.

use super::Backend;
use crate::config::Descriptor;
use crate::error::Result;
use crate::identifier::strip_qualifier;
use crate::options::Options;
use crate::resource::{Methods, Resource, ResourceType};
use std::thread;
use std::time::Duration;

pub const QUALIFIER: &str = "null";

pub struct NullBackend;

#[derive(Debug, Default)]
pub struct NullResource {
    written: usize,
}

impl NullResource {
    /// Bytes accepted so far.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Resource for NullResource {
    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_data(&mut self, _buffer: &mut [u8], _initial: Duration, _subsequent: Duration) -> Result<usize> {
        Ok(0)
    }

    fn write_data(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.written += data.len();
        Ok(data.len())
    }

    fn await_input(&mut self, timeout: Duration) -> Result<bool> {
        thread::sleep(timeout);
        Ok(false)
    }

    fn name(&mut self, _timeout: Duration) -> Result<String> {
        Ok(QUALIFIER.to_owned())
    }

    fn identifier(&self) -> Result<String> {
        Ok(format!("{QUALIFIER}:"))
    }
}

impl Backend for NullBackend {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Null
    }

    fn is_supported(&self, descriptor: &Descriptor) -> Option<bool> {
        Some(descriptor.null.enabled)
    }

    fn test_identifier<'a>(&self, identifier: &'a str) -> Option<&'a str> {
        strip_qualifier(identifier, QUALIFIER)
    }

    fn options(&self, descriptor: Option<&Descriptor>) -> Option<Options> {
        Some(descriptor.map_or_else(|| Descriptor::default().null.options, |d| d.null.options.clone()))
    }

    fn methods(&self) -> Methods {
        Methods::STREAM | Methods::RESOURCE_NAME | Methods::RESOURCE_IDENTIFIER
    }

    fn connect(&self, _identifier: &str, _descriptor: Option<&Descriptor>) -> Result<Box<dyn Resource>> {
        Ok(Box::new(NullResource::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Registry;

    #[test]
    fn swallows_writes_and_reads_nothing() {
        let mut endpoint = Registry::standard().connect("null:", None).unwrap();
        assert_eq!(endpoint.resource_type(), ResourceType::Null);
        assert_eq!(endpoint.write(b"hello").unwrap(), 5);
        assert_eq!(endpoint.read_byte(true).unwrap(), None);
        assert!(!endpoint.await_input(Duration::ZERO).unwrap());
        assert_eq!(endpoint.resource_name().unwrap(), "null");
        assert_eq!(endpoint.resource_identifier().unwrap(), "null:");
        assert!(endpoint.hid_items().unwrap_err().is_unsupported());
        endpoint.disconnect().unwrap();
    }

    #[test]
    fn descriptor_must_enable_it() {
        let mut descriptor = Descriptor::default();
        assert!(Registry::standard().connect("null:", Some(&descriptor)).is_err());

        descriptor.null.enabled = true;
        assert!(Registry::standard().connect("NULL:", Some(&descriptor)).is_ok());
    }
}
