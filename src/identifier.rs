//! Resource identifier helpers.
//!
//! Identifiers look like `qualifier:remainder` (`usb:`, `hid:vendor=0x1234`,
//! `bluetooth:00:11:22:33:44:55`) or are unqualified (`/dev/ttyUSB0`). Qualifiers compare
//! case-insensitively.

use crate::error::{GioError, Result};

const QUALIFIER_DELIMITER: char = ':';
const PARAMETER_SEPARATOR: char = ',';
const PARAMETER_ASSIGNMENT: char = '=';

/// Whether the identifier starts with a `qualifier:` prefix.
///
/// Only the text before the first `:` is considered, and it must look like a word, so Windows
/// drive letters and Bluetooth addresses are not mistaken for qualifiers.
pub fn has_qualifier(identifier: &str) -> bool {
    match identifier.split_once(QUALIFIER_DELIMITER) {
        Some((prefix, _)) => prefix.len() > 1 && prefix.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

/// If `identifier` carries `qualifier`, return what follows the delimiter.
pub fn strip_qualifier<'a>(identifier: &'a str, qualifier: &str) -> Option<&'a str> {
    if qualifier.is_empty() {
        return None;
    }
    let (prefix, rest) = identifier.split_once(QUALIFIER_DELIMITER)?;
    prefix.eq_ignore_ascii_case(qualifier).then_some(rest)
}

/// Try each qualifier in turn.
pub fn strip_any_qualifier<'a>(identifier: &'a str, qualifiers: &[&str]) -> Option<&'a str> {
    qualifiers
        .iter()
        .find_map(|q| strip_qualifier(identifier, q))
}

/// Device selection parameters shared by the USB and HID identifier forms.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor: Option<u16>,
    pub product: Option<u16>,
    pub serial_number: Option<String>,
    pub path: Option<String>,
}

/// Where an unnamed parameter goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BareParameter {
    SerialNumber,
    Path,
}

impl DeviceFilter {
    /// Parse `name=value,name=value`. A lone value without `=` is stored per `bare`.
    pub fn parse(identifier: &str, parameters: &str, bare: BareParameter) -> Result<Self> {
        let invalid = |reason: String| GioError::InvalidIdentifier {
            identifier: identifier.to_owned(),
            reason,
        };

        let mut filter = Self::default();
        if bare == BareParameter::Path && !parameters.contains(PARAMETER_ASSIGNMENT) {
            if !parameters.is_empty() {
                filter.path = Some(parameters.to_owned());
            }
            return Ok(filter);
        }

        for parameter in parameters.split(PARAMETER_SEPARATOR) {
            let parameter = parameter.trim();
            if parameter.is_empty() {
                continue;
            }
            let Some((name, value)) = parameter.split_once(PARAMETER_ASSIGNMENT) else {
                match bare {
                    BareParameter::SerialNumber => filter.serial_number = Some(parameter.to_owned()),
                    BareParameter::Path => filter.path = Some(parameter.to_owned()),
                }
                continue;
            };

            match name.trim().to_ascii_lowercase().as_str() {
                "vendor" | "vendorid" => {
                    filter.vendor = Some(parse_id(value).ok_or_else(|| invalid(format!("bad vendor {value:?}")))?)
                }
                "product" | "productid" => {
                    filter.product = Some(parse_id(value).ok_or_else(|| invalid(format!("bad product {value:?}")))?)
                }
                "serialnumber" | "serial" => filter.serial_number = Some(value.to_owned()),
                "path" | "device" => filter.path = Some(value.to_owned()),
                other => return Err(invalid(format!("unknown parameter {other:?}"))),
            }
        }
        Ok(filter)
    }

    pub fn matches(&self, vendor: u16, product: u16, serial_number: Option<&str>) -> bool {
        self.vendor.map_or(true, |v| v == vendor)
            && self.product.map_or(true, |p| p == product)
            && self
                .serial_number
                .as_deref()
                .map_or(true, |s| serial_number == Some(s))
    }
}

/// Parse a 16-bit identifier written in hex (`0x1234` or `1234`).
fn parse_id(value: &str) -> Option<u16> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16).ok()
}
