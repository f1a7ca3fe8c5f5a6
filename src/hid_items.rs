//! HID report descriptor items.
//!
//! A report descriptor is a stream of short items: one prefix byte whose upper six bits are
//! the item type (tag and class together) and whose lower two bits select a value length of
//! 0, 1, 2 or 4 bytes, followed by that many little-endian value bytes. Long items are not
//! used by any display this crate talks to and are not decoded.
//!
//! Only enough of the descriptor is interpreted to size reports; there is no full parser here.

use crate::error::{GioError, Result};
use bitflags::bitflags;
use std::fmt;
use tracing::{debug, warn};

/// Value length selected by the low two bits of an item prefix.
const VALUE_SIZES: [u8; 4] = [0, 1, 2, 4];

/// Six-bit item type codes (`prefix >> 2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HidItemType {
    UsagePage = 0x01,
    Usage = 0x02,
    LogicalMinimum = 0x05,
    UsageMinimum = 0x06,
    LogicalMaximum = 0x09,
    UsageMaximum = 0x0A,
    PhysicalMinimum = 0x0D,
    DesignatorIndex = 0x0E,
    PhysicalMaximum = 0x11,
    DesignatorMinimum = 0x12,
    UnitExponent = 0x15,
    DesignatorMaximum = 0x16,
    Unit = 0x19,
    ReportSize = 0x1D,
    StringIndex = 0x1E,
    Input = 0x20,
    ReportId = 0x21,
    StringMinimum = 0x22,
    Output = 0x24,
    ReportCount = 0x25,
    StringMaximum = 0x26,
    Collection = 0x28,
    Push = 0x29,
    Delimiter = 0x2A,
    Feature = 0x2C,
    Pop = 0x2D,
    EndCollection = 0x30,
}

impl HidItemType {
    pub fn from_code(code: u8) -> Option<Self> {
        use HidItemType::*;
        let t = match code {
            0x01 => UsagePage,
            0x02 => Usage,
            0x05 => LogicalMinimum,
            0x06 => UsageMinimum,
            0x09 => LogicalMaximum,
            0x0A => UsageMaximum,
            0x0D => PhysicalMinimum,
            0x0E => DesignatorIndex,
            0x11 => PhysicalMaximum,
            0x12 => DesignatorMinimum,
            0x15 => UnitExponent,
            0x16 => DesignatorMaximum,
            0x19 => Unit,
            0x1D => ReportSize,
            0x1E => StringIndex,
            0x20 => Input,
            0x21 => ReportId,
            0x22 => StringMinimum,
            0x24 => Output,
            0x25 => ReportCount,
            0x26 => StringMaximum,
            0x28 => Collection,
            0x29 => Push,
            0x2A => Delimiter,
            0x2C => Feature,
            0x2D => Pop,
            0x30 => EndCollection,
            _ => return None,
        };
        Some(t)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Items whose value is two's complement.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            HidItemType::LogicalMinimum
                | HidItemType::LogicalMaximum
                | HidItemType::PhysicalMinimum
                | HidItemType::PhysicalMaximum
                | HidItemType::UnitExponent
        )
    }

    pub fn name(self) -> &'static str {
        use HidItemType::*;
        match self {
            UsagePage => "UsagePage",
            Usage => "Usage",
            LogicalMinimum => "LogicalMinimum",
            UsageMinimum => "UsageMinimum",
            LogicalMaximum => "LogicalMaximum",
            UsageMaximum => "UsageMaximum",
            PhysicalMinimum => "PhysicalMinimum",
            DesignatorIndex => "DesignatorIndex",
            PhysicalMaximum => "PhysicalMaximum",
            DesignatorMinimum => "DesignatorMinimum",
            UnitExponent => "UnitExponent",
            DesignatorMaximum => "DesignatorMaximum",
            Unit => "Unit",
            ReportSize => "ReportSize",
            StringIndex => "StringIndex",
            Input => "Input",
            ReportId => "ReportID",
            StringMinimum => "StringMinimum",
            Output => "Output",
            ReportCount => "ReportCount",
            StringMaximum => "StringMaximum",
            Collection => "Collection",
            Push => "Push",
            Delimiter => "Delimiter",
            Feature => "Feature",
            Pop => "Pop",
            EndCollection => "EndCollection",
        }
    }
}

/// Name of a raw item type code, if it is one we know.
pub fn item_type_name(code: u8) -> Option<&'static str> {
    HidItemType::from_code(code).map(HidItemType::name)
}

/// One decoded item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HidItem {
    /// Six-bit type code.
    pub code: u8,
    /// Number of value bytes that followed the prefix (0, 1, 2 or 4).
    pub value_size: u8,
    /// Raw little-endian value, zero-extended.
    pub value: u32,
}

impl HidItem {
    pub fn item_type(&self) -> Option<HidItemType> {
        HidItemType::from_code(self.code)
    }

    /// The value sign-extended from its encoded width.
    pub fn signed_value(&self) -> i32 {
        if self.value_size == 0 {
            return 0;
        }
        let shift = 32 - 8 * u32::from(self.value_size);
        ((self.value << shift) as i32) >> shift
    }

    /// The value interpreted the way the item type defines it.
    pub fn typed_value(&self) -> i64 {
        match self.item_type() {
            Some(t) if t.is_signed() => i64::from(self.signed_value()),
            _ => i64::from(self.value),
        }
    }
}

impl fmt::Display for HidItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match item_type_name(self.code) {
            Some(name) => write!(f, "{name}")?,
            None => write!(f, "{:#04X}", self.code)?,
        }
        if self.value_size > 0 {
            write!(f, " {}", self.typed_value())?;
        }
        Ok(())
    }
}

/// An item's value bytes run past the end of the descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TruncatedItem {
    pub offset: usize,
}

/// Walks a descriptor item by item. Stops after the first truncated item.
#[derive(Clone, Debug)]
pub struct ItemReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ItemReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Offset of the next item.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for ItemReader<'_> {
    type Item = Result<HidItem, TruncatedItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.offset;
        let prefix = *self.bytes.get(start)?;
        let value_size = VALUE_SIZES[usize::from(prefix & 0b11)];

        let end = start + 1 + usize::from(value_size);
        let Some(value_bytes) = self.bytes.get(start + 1..end) else {
            self.offset = self.bytes.len();
            return Some(Err(TruncatedItem { offset: start }));
        };

        let value = value_bytes
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (8 * i)));

        self.offset = end;
        Some(Ok(HidItem {
            code: prefix >> 2,
            value_size,
            value,
        }))
    }
}

bitflags! {
    /// Which size-relevant items were seen for a report.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DefinedItems: u8 {
        const REPORT_COUNT     = 1 << 0;
        const REPORT_SIZE      = 1 << 1;
        const LOGICAL_MINIMUM  = 1 << 2;
        const LOGICAL_MAXIMUM  = 1 << 3;
    }
}

/// Size-relevant items that directly follow a report's `ReportID`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HidReportDescription {
    pub identifier: u8,
    pub defined: DefinedItems,
    pub report_count: u32,
    pub report_size: u32,
    pub logical_minimum: i32,
    pub logical_maximum: i32,
}

impl HidReportDescription {
    /// Wire length of the report including its identifier byte, if count and size are known.
    pub fn byte_length(&self) -> Option<usize> {
        if !self
            .defined
            .contains(DefinedItems::REPORT_COUNT | DefinedItems::REPORT_SIZE)
        {
            return None;
        }
        let bits = u64::from(self.report_count) * u64::from(self.report_size);
        usize::try_from(1 + bits.div_ceil(8)).ok()
    }
}

/// Find `identifier`'s `ReportID` and collect the items that immediately follow it.
///
/// The first matching `ReportID` wins. Collection stops at the first item that is not a
/// report count, report size or logical bound (another `ReportID` included), so bounds that
/// precede the `ReportID` are not seen. A truncated item makes the whole lookup fail.
pub fn describe_report(items: &[u8], identifier: u8) -> Option<HidReportDescription> {
    let mut description = HidReportDescription {
        identifier,
        ..HidReportDescription::default()
    };
    let mut found = false;

    for item in ItemReader::new(items) {
        let item = match item {
            Ok(item) => item,
            Err(TruncatedItem { offset }) => {
                warn!(offset, identifier, "truncated HID item");
                return None;
            }
        };

        match item.item_type() {
            Some(HidItemType::ReportId) => {
                if found {
                    break;
                }
                if item.value == u32::from(identifier) {
                    found = true;
                }
            }
            _ if !found => {}
            Some(HidItemType::ReportCount) => {
                description.report_count = item.value;
                description.defined |= DefinedItems::REPORT_COUNT;
            }
            Some(HidItemType::ReportSize) => {
                description.report_size = item.value;
                description.defined |= DefinedItems::REPORT_SIZE;
            }
            Some(HidItemType::LogicalMinimum) => {
                description.logical_minimum = item.signed_value();
                description.defined |= DefinedItems::LOGICAL_MINIMUM;
            }
            Some(HidItemType::LogicalMaximum) => {
                description.logical_maximum = item.signed_value();
                description.defined |= DefinedItems::LOGICAL_MAXIMUM;
            }
            _ => break,
        }
    }

    found.then_some(description)
}

/// Byte length of report `identifier`, counting the leading identifier byte.
pub fn report_size(items: &[u8], identifier: u8) -> Result<usize> {
    let description = describe_report(items, identifier).ok_or(GioError::ReportNotFound(identifier))?;

    match description.byte_length() {
        Some(size) => Ok(size),
        None => {
            warn!(identifier, defined = ?description.defined, "HID report size not defined");
            Err(GioError::ReportSizeUndefined(identifier))
        }
    }
}

/// Per-direction byte lengths of one report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HidReportSizes {
    pub input: usize,
    pub output: usize,
    pub feature: usize,
}

/// Sum the `Input`, `Output` and `Feature` fields of report `identifier`.
///
/// With identifier 0 the descriptor must not number its reports: the whole descriptor is
/// one report and the lengths carry no identifier byte. Otherwise a non-empty length
/// includes the identifier byte. `None` when the report does not exist or the descriptor
/// is truncated.
pub fn report_sizes(items: &[u8], identifier: u8) -> Option<HidReportSizes> {
    let unnumbered = identifier == 0;
    let mut found = unnumbered;

    let mut input_bits = 0u64;
    let mut output_bits = 0u64;
    let mut feature_bits = 0u64;

    let mut seen = 0u64;
    let mut current = 0u32;
    let mut size = 0u32;
    let mut count = 0u32;

    let mut reader = ItemReader::new(items);
    loop {
        let offset = reader.offset();
        let item = match reader.next() {
            None => break,
            Some(Ok(item)) => item,
            Some(Err(TruncatedItem { offset })) => {
                warn!(offset, identifier, "truncated HID item");
                return None;
            }
        };

        let bits = u64::from(size) * u64::from(count);
        match item.item_type() {
            Some(HidItemType::ReportId) => {
                if unnumbered {
                    found = false;
                    break;
                }
                current = item.value;
                if current == u32::from(identifier) {
                    found = true;
                }
            }
            Some(HidItemType::Input) if current == u32::from(identifier) => input_bits += bits,
            Some(HidItemType::Output) if current == u32::from(identifier) => output_bits += bits,
            Some(HidItemType::Feature) if current == u32::from(identifier) => feature_bits += bits,
            Some(HidItemType::Input | HidItemType::Output | HidItemType::Feature) => {}
            Some(HidItemType::ReportCount) => count = item.value,
            Some(HidItemType::ReportSize) => size = item.value,
            Some(
                HidItemType::Collection
                | HidItemType::EndCollection
                | HidItemType::UsagePage
                | HidItemType::UsageMinimum
                | HidItemType::UsageMaximum
                | HidItemType::Usage
                | HidItemType::LogicalMinimum
                | HidItemType::LogicalMaximum
                | HidItemType::PhysicalMinimum
                | HidItemType::PhysicalMaximum,
            ) => {}
            _ => {
                if seen & (1 << item.code) == 0 {
                    match item_type_name(item.code) {
                        Some(name) => warn!(offset, item = name, "unhandled HID item type"),
                        None => warn!(offset, item = format_args!("{:#04X}", item.code), "unhandled HID item type"),
                    }
                }
            }
        }

        seen |= 1 << item.code;
    }

    if !found {
        return None;
    }

    let bytes = |bits: u64| -> usize {
        let bytes = usize::try_from(bits.div_ceil(8)).unwrap_or(usize::MAX);
        if bytes > 0 && !unnumbered {
            bytes.saturating_add(1)
        } else {
            bytes
        }
    };

    let sizes = HidReportSizes {
        input: bytes(input_bits),
        output: bytes(output_bits),
        feature: bytes(feature_bits),
    };
    debug!(
        identifier,
        input = sizes.input,
        output = sizes.output,
        feature = sizes.feature,
        "HID report sizes"
    );
    Some(sizes)
}
