#![allow(dead_code)]

use hdl::{Bitmap, Document, Element, Value, ValueKind};
use log::warn;
use std::error;
use std::fmt;

mod csource;

pub use csource::write_c_source;

/// Format version emitted in the first two output bytes.
pub const VERSION_MAJOR: u8 = 0;
pub const VERSION_MINOR: u8 = 1;

/// Upper bound for one compiled page.
pub const OUTPUT_BUFFER_SIZE: usize = 4096;

/// Recognized element tags, indexed by wire ordinal.
pub const TAG_NAMES: [&str; 2] = ["box", "text"];

/// Recognized attribute keys, indexed by wire ordinal.
pub const ATTR_NAMES: [&str; 12] = [
    "x", "y", "width", "height", "flex", "flexdir", "bind", "img", "padding", "align", "size",
    "disabled",
];

// Attribute ordinals with encoder-side rewrites.
const ATTR_FLEX_DIR: u8 = 5;
const ATTR_ALIGN: u8 = 9;

/// Vertical alignment words, indexed by packed value.
pub const ALIGNMENT_Y: [&str; 3] = ["middle", "top", "bottom"];
/// Horizontal alignment words, indexed by packed value.
pub const ALIGNMENT_X: [&str; 3] = ["center", "left", "right"];

#[derive(Debug)]
pub enum EncodeError {
    MissingRoot,
    UnknownTag { tag: String },
    TooManyElements { count: usize },
    CountOverflow { field: &'static str, count: usize },
    BufferExhausted { capacity: usize },
}

impl error::Error for EncodeError {}
impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MissingRoot => {
                write!(f, "document has no root element")
            }
            Self::UnknownTag { tag } => {
                write!(f, "tag {:?} not found", tag)
            }
            Self::TooManyElements { count } => {
                write!(f, "{} elements do not fit the 16-bit element count", count)
            }
            Self::CountOverflow { field, count } => {
                write!(f, "{} {} do not fit an 8-bit count", count, field)
            }
            Self::BufferExhausted { capacity } => {
                write!(f, "compiled page exceeds the {}B output buffer", capacity)
            }
        }
    }
}

fn find_tag(name: &str) -> Option<u8> {
    TAG_NAMES.iter().position(|t| *t == name).map(|i| i as u8)
}

fn find_attr(name: &str) -> Option<u8> {
    ATTR_NAMES.iter().position(|a| *a == name).map(|i| i as u8)
}

// Bounded output buffer; every write fails once the page would exceed the
// capacity.
struct OutputBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl OutputBuffer {
    fn new(capacity: usize) -> OutputBuffer {
        OutputBuffer {
            bytes: Vec::new(),
            capacity,
        }
    }

    fn put_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.put_bytes(&[value])
    }

    fn put_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.put_bytes(&value.to_le_bytes())
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if self.bytes.len() + bytes.len() > self.capacity {
            return Err(EncodeError::BufferExhausted {
                capacity: self.capacity,
            });
        }
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    /// Current write position, for later in-place patching.
    fn position(&self) -> usize {
        self.bytes.len()
    }

    fn patch_u8(&mut self, position: usize, value: u8) {
        self.bytes[position] = value;
    }
}

/// Encodes a parsed document into the page wire format: a 16-byte header,
/// the bitmap records and the depth-first element tree, all little-endian.
pub fn encode(doc: &Document) -> Result<Vec<u8>, Box<dyn error::Error>> {
    encode_with_capacity(doc, OUTPUT_BUFFER_SIZE)
}

pub fn encode_with_capacity(
    doc: &Document,
    capacity: usize,
) -> Result<Vec<u8>, Box<dyn error::Error>> {
    if doc.elements.is_empty() {
        return Err(EncodeError::MissingRoot.into());
    }
    if doc.elements.len() > u16::MAX as usize {
        return Err(EncodeError::TooManyElements {
            count: doc.elements.len(),
        }
        .into());
    }
    if doc.bitmaps.len() > u8::MAX as usize {
        return Err(EncodeError::CountOverflow {
            field: "bitmaps",
            count: doc.bitmaps.len(),
        }
        .into());
    }

    let mut out = OutputBuffer::new(capacity);
    out.put_u8(VERSION_MAJOR)?;
    out.put_u8(VERSION_MINOR)?;
    out.put_u8(doc.bitmaps.len() as u8)?;
    // Variable table, not emitted by this compiler.
    out.put_u8(0)?;
    out.put_u16(doc.elements.len() as u16)?;
    // Reserved up to 0x10.
    out.put_bytes(&[0; 10])?;

    for bitmap in &doc.bitmaps {
        encode_bitmap(bitmap, &mut out)?;
    }
    encode_element(doc, &doc.elements[0], &mut out)?;

    Ok(out.bytes)
}

fn encode_bitmap(bitmap: &Bitmap, out: &mut OutputBuffer) -> Result<(), EncodeError> {
    out.put_u16(bitmap.size())?;
    out.put_u16(bitmap.width)?;
    out.put_u16(bitmap.height)?;
    out.put_u8(bitmap.color_mode)?;
    out.put_bytes(&bitmap.data)
}

fn encode_element(
    doc: &Document,
    element: &Element,
    out: &mut OutputBuffer,
) -> Result<(), EncodeError> {
    let tag = match find_tag(&element.tag) {
        Some(tag) => tag,
        None => {
            return Err(EncodeError::UnknownTag {
                tag: element.tag.clone(),
            })
        }
    };
    out.put_u8(tag)?;

    if let Some(content) = &element.content {
        out.put_bytes(content.as_bytes())?;
    }
    out.put_u8(0)?;

    if element.attrs.len() > u8::MAX as usize {
        return Err(EncodeError::CountOverflow {
            field: "attributes",
            count: element.attrs.len(),
        });
    }
    let attr_count_position = out.position();
    out.put_u8(element.attrs.len() as u8)?;
    for attr in &element.attrs {
        let key = match find_attr(&attr.key) {
            Some(key) => key,
            None => {
                // Dropped attributes never reach the wire; the count byte
                // written above is adjusted in place.
                warn!("skipping attribute '{}', not recognized", attr.key);
                let count = out.bytes[attr_count_position] - 1;
                out.patch_u8(attr_count_position, count);
                continue;
            }
        };
        out.put_u8(key)?;
        encode_attr_value(key, &attr.value, out)?;
    }

    if element.children.len() > u8::MAX as usize {
        return Err(EncodeError::CountOverflow {
            field: "children",
            count: element.children.len(),
        });
    }
    out.put_u8(element.children.len() as u8)?;
    for &child in &element.children {
        encode_element(doc, &doc.elements[child as usize], out)?;
    }
    Ok(())
}

fn encode_attr_value(key: u8, value: &Value, out: &mut OutputBuffer) -> Result<(), EncodeError> {
    // flexdir and align accept structured strings that never reach the wire
    // as strings; both collapse to a single narrowed integer.
    if key == ATTR_FLEX_DIR {
        if let Value::Str(word) = value {
            return encode_numeric(&[f32::from(flexdir_value(word))], out);
        }
    }
    if key == ATTR_ALIGN {
        if let Value::Str(words) = value {
            return encode_numeric(&[f32::from(align_value(words))], out);
        }
    }

    match value {
        Value::Float(values) => encode_numeric(values, out),
        Value::Null => {
            out.put_u8(ValueKind::Null as u8)?;
            out.put_u8(value.count())
        }
        Value::Bool(values) => {
            out.put_u8(ValueKind::Bool as u8)?;
            out.put_u8(value.count())?;
            for &v in values {
                out.put_u8(v as u8)?;
            }
            Ok(())
        }
        Value::Img(values) | Value::Bind(values) => {
            out.put_u8(value.kind() as u8)?;
            out.put_u8(value.count())?;
            for &v in values {
                out.put_u8(v)?;
            }
            Ok(())
        }
        Value::Str(text) => {
            out.put_u8(ValueKind::String as u8)?;
            out.put_u8(value.count())?;
            out.put_bytes(text.as_bytes())?;
            out.put_u8(0)
        }
    }
}

// Writes a FLOAT value in its narrowed form: type byte, count byte, then
// the elements in the narrowed width.
fn encode_numeric(values: &[f32], out: &mut OutputBuffer) -> Result<(), EncodeError> {
    let kind = narrowed_kind(values);
    out.put_u8(kind as u8)?;
    out.put_u8(values.len() as u8)?;
    for &v in values {
        match kind {
            ValueKind::I8 => out.put_bytes(&(v as i8).to_le_bytes())?,
            ValueKind::I16 => out.put_bytes(&(v as i16).to_le_bytes())?,
            ValueKind::I32 => out.put_bytes(&(v as i32).to_le_bytes())?,
            _ => out.put_bytes(&v.to_le_bytes())?,
        }
    }
    Ok(())
}

/// Smallest signed integer width that represents every element exactly, or
/// FLOAT if any element has a fractional part. Bounds are strict, so 128
/// already needs I16 and 32768 needs I32.
fn narrowed_kind(values: &[f32]) -> ValueKind {
    if values.iter().any(|v| v.fract() != 0.0) {
        return ValueKind::Float;
    }
    let mut kind = ValueKind::I8;
    for &v in values {
        if v > -128.0 && v < 128.0 {
            continue;
        }
        if v > -32768.0 && v < 32768.0 {
            if kind == ValueKind::I8 {
                kind = ValueKind::I16;
            }
        } else {
            kind = ValueKind::I32;
        }
    }
    kind
}

fn flexdir_value(word: &str) -> u8 {
    match word {
        "col" => 1,
        "row" => 2,
        _ => {
            warn!("unknown value '{}' given for 'flexdir'", word);
            1
        }
    }
}

// Packs a "yword xword" alignment string into y | x << 4.
fn align_value(words: &str) -> u8 {
    let mut parts = words.splitn(2, ' ');
    let y_word = parts.next().unwrap_or("");
    let x_word = match parts.next() {
        Some(word) => word,
        None => {
            warn!("'align' requires vertical and horizontal words, e.g. 'middle center'");
            return 0;
        }
    };
    let y = match ALIGNMENT_Y.iter().position(|w| *w == y_word) {
        Some(index) => index as u8,
        None => {
            warn!("unknown y axis value '{}' given for 'align'", y_word);
            return 0;
        }
    };
    let x = match ALIGNMENT_X.iter().position(|w| *w == x_word) {
        Some(index) => index as u8,
        None => {
            warn!("unknown x axis value '{}' given for 'align'", x_word);
            return 0;
        }
    };
    y | (x << 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_boundaries() {
        assert_eq!(narrowed_kind(&[0.0]), ValueKind::I8);
        assert_eq!(narrowed_kind(&[127.0]), ValueKind::I8);
        assert_eq!(narrowed_kind(&[128.0]), ValueKind::I16);
        assert_eq!(narrowed_kind(&[-127.0]), ValueKind::I8);
        assert_eq!(narrowed_kind(&[-128.0]), ValueKind::I16);
        assert_eq!(narrowed_kind(&[32767.0]), ValueKind::I16);
        assert_eq!(narrowed_kind(&[32768.0]), ValueKind::I32);
        assert_eq!(narrowed_kind(&[-32768.0]), ValueKind::I32);
    }

    #[test]
    fn narrowing_scans_the_whole_array() {
        assert_eq!(narrowed_kind(&[1.0, 2.5, 3.0]), ValueKind::Float);
        assert_eq!(narrowed_kind(&[1.0, 300.0]), ValueKind::I16);
        assert_eq!(narrowed_kind(&[1.0, 300.0, 70000.0]), ValueKind::I32);
        assert_eq!(narrowed_kind(&[70000.0, 1.0]), ValueKind::I32);
    }

    #[test]
    fn alignment_packing() {
        assert_eq!(align_value("middle center"), 0x00);
        assert_eq!(align_value("top right"), 0x21);
        assert_eq!(align_value("bottom left"), 0x12);
        assert_eq!(align_value("top"), 0x00);
        assert_eq!(align_value("upper left"), 0x00);
        assert_eq!(align_value("top rightish"), 0x00);
    }

    #[test]
    fn flex_directions() {
        assert_eq!(flexdir_value("col"), 1);
        assert_eq!(flexdir_value("row"), 2);
        assert_eq!(flexdir_value("diagonal"), 1);
    }
}
