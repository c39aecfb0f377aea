//! C-source renderings of a compiled page.

use hdl::ValueKind;
use std::io;

/// Writes `bytes` as a C source fragment: a byte-initialized array named
/// `HDL_PAGE_OUTPUT`. With `commented`, the buffer is re-read according to
/// the wire layout and every field is annotated; the bytes themselves are
/// identical in both renderings. `bytes` must be a buffer produced by
/// [`encode`](crate::encode).
pub fn write_c_source<W: io::Write>(
    writer: &mut W,
    bytes: &[u8],
    original_size: usize,
    commented: bool,
) -> io::Result<()> {
    write!(
        writer,
        "// HDL output file\n// Original size: {}B, Compiled size: {}B\n\n",
        original_size,
        bytes.len()
    )?;
    write!(
        writer,
        "// Output\nunsigned char HDL_PAGE_OUTPUT[{}] = {{\n",
        bytes.len()
    )?;
    if commented {
        write_commented_bytes(writer, bytes)?;
    } else {
        write_plain_bytes(writer, bytes)?;
    }
    writer.write_all(b"\n};\n\n")?;
    Ok(())
}

fn write_plain_bytes<W: io::Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    for (i, byte) in bytes.iter().enumerate() {
        write!(writer, "0x{:02X}", byte)?;
        if i != bytes.len() - 1 {
            writer.write_all(b", ")?;
        }
        if (i + 1) % 16 == 0 {
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn write_commented_bytes<W: io::Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writeln!(
        writer,
        "0x{:02X}, 0x{:02X}, // File format version (major, minor)",
        bytes[0], bytes[1]
    )?;
    let bitmap_count = bytes[2];
    let element_count = u16::from_le_bytes([bytes[4], bytes[5]]);
    writeln!(
        writer,
        "0x{:02X}, 0x{:02X}, 0x{:02X}, 0x{:02X}, // Bitmap(1B), Vartable(1B), Element(2B) count",
        bytes[2], bytes[3], bytes[4], bytes[5]
    )?;
    let mut i = 6;
    while i < 0x10 {
        write!(writer, "0x{:02X}, ", bytes[i])?;
        i += 1;
    }
    writer.write_all(b"// Padding until 0x10\n")?;

    writer.write_all(b"// Bitmaps\n")?;
    for n in 0..bitmap_count {
        writeln!(writer, "// Bitmap {}", n)?;
        let size = u16::from_le_bytes([bytes[i], bytes[i + 1]]) as usize;
        writeln!(writer, "0x{:02X}, 0x{:02X}, // Bitmap size", bytes[i], bytes[i + 1])?;
        i += 2;
        writeln!(
            writer,
            "0x{:02X}, 0x{:02X}, 0x{:02X}, 0x{:02X}, // Bitmap width (2B), height (2B)",
            bytes[i],
            bytes[i + 1],
            bytes[i + 2],
            bytes[i + 3]
        )?;
        i += 4;
        writeln!(writer, "0x{:02X}, // Color mode", bytes[i])?;
        i += 1;
        writeln!(writer, "// Image data ({}B)", size)?;
        for z in 0..size {
            write!(writer, "0x{:02X}, ", bytes[i])?;
            if (z + 1) % 16 == 0 {
                writer.write_all(b"\n")?;
            }
            i += 1;
        }
        writer.write_all(b"\n")?;
    }

    writer.write_all(b"// Elements\n")?;
    for _ in 0..element_count {
        writeln!(writer, "0x{:02X}, // Tag", bytes[i])?;
        i += 1;
        loop {
            write!(writer, "0x{:02X}, ", bytes[i])?;
            let done = bytes[i] == 0;
            i += 1;
            if done {
                break;
            }
        }
        writer.write_all(b"// Content\n")?;
        let attr_count = bytes[i];
        writeln!(writer, "0x{:02X}, // Attribute count", attr_count)?;
        i += 1;
        for z in 0..attr_count {
            writeln!(writer, "// Attribute {}", z)?;
            let kind = ValueKind::new(bytes[i + 1]);
            let value_count = bytes[i + 2] as usize;
            writeln!(
                writer,
                "0x{:02X}, 0x{:02X}, 0x{:02X}, // Key, Type, Count",
                bytes[i],
                bytes[i + 1],
                bytes[i + 2]
            )?;
            i += 3;
            writer.write_all(b"// Attribute value\n")?;
            match kind {
                Some(ValueKind::String) => {
                    // Null-terminated, independent of the count byte.
                    loop {
                        write!(writer, "0x{:02X}, ", bytes[i])?;
                        let done = bytes[i] == 0;
                        i += 1;
                        if done {
                            break;
                        }
                    }
                }
                Some(kind) => {
                    let len = kind.wire_size() * value_count;
                    for y in 0..len {
                        write!(writer, "0x{:02X}, ", bytes[i])?;
                        if (y + 1) % 16 == 0 {
                            writer.write_all(b"\n")?;
                        }
                        i += 1;
                    }
                }
                None => {}
            }
            writer.write_all(b"\n")?;
        }
        write!(writer, "0x{:02X}", bytes[i])?;
        i += 1;
        if i < bytes.len() {
            writer.write_all(b", ")?;
        }
        writer.write_all(b" // Child count\n")?;
    }
    Ok(())
}
