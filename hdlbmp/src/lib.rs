#![allow(dead_code)]

use log::debug;
use std::error;
use std::fmt;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug)]
pub enum BmpError {
    UnsupportedExtension { path: String },
    InvalidSignature { signature: [u8; 2] },
    NotMonochrome { bits_per_pixel: u16 },
    InvalidDimensions { width: i32, height: i32 },
}

impl error::Error for BmpError {}
impl fmt::Display for BmpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedExtension { path } => {
                write!(f, "only .bmp files are supported, got {:?}", path)
            }
            Self::InvalidSignature { signature } => {
                write!(
                    f,
                    "invalid signature 0x{:0>2X?}{:0>2X?}, expected \"BM\"",
                    signature[0], signature[1]
                )
            }
            Self::NotMonochrome { bits_per_pixel } => {
                write!(
                    f,
                    "{} bits per pixel, only monochrome (1-bit) bitmaps are supported",
                    bits_per_pixel
                )
            }
            Self::InvalidDimensions { width, height } => {
                write!(f, "invalid bitmap dimensions {}x{}", width, height)
            }
        }
    }
}

/// A monochrome bitmap decoded from a Windows BMP file.
///
/// Rows are stored top-down, `ceil(width / 8)` bytes per row, pixels packed
/// MSB-first with no padding between rows.
#[derive(Debug, Default)]
pub struct MonoBitmap {
    width: u16,
    height: u16,
    data: Vec<u8>,
}

impl MonoBitmap {
    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Decodes a 1-bit-per-pixel Windows BMP.
///
/// BMP stores rows bottom-up and pads each row to a 4-byte boundary; the
/// decoded bitmap is top-down with the padding stripped.
pub fn decode_bmp<R: io::Read + io::Seek>(
    reader: &mut R,
) -> Result<MonoBitmap, Box<dyn error::Error>> {
    let mut signature: [u8; 2] = [0; 2];
    reader.read_exact(&mut signature)?;
    if &signature != b"BM" {
        return Err(BmpError::InvalidSignature { signature }.into());
    }

    let mut dword: [u8; 4] = [0; 4];
    // File size and the reserved bytes carry nothing the decoder needs.
    reader.read_exact(&mut dword)?;
    reader.read_exact(&mut dword)?;
    reader.read_exact(&mut dword)?;
    let pixel_offset = u32::from_le_bytes(dword);

    reader.read_exact(&mut dword)?; // info header size
    reader.read_exact(&mut dword)?;
    let width = i32::from_le_bytes(dword);
    reader.read_exact(&mut dword)?;
    let height = i32::from_le_bytes(dword);

    let mut word: [u8; 2] = [0; 2];
    reader.read_exact(&mut word)?; // planes
    reader.read_exact(&mut word)?;
    let bits_per_pixel = u16::from_le_bytes(word);

    debug!(
        "bmp {}x{}, {} bits per pixel, pixel data at {}",
        width, height, bits_per_pixel, pixel_offset
    );

    if bits_per_pixel != 1 {
        return Err(BmpError::NotMonochrome { bits_per_pixel }.into());
    }
    if width <= 0 || height <= 0 || width > u16::MAX as i32 || height > u16::MAX as i32 {
        return Err(BmpError::InvalidDimensions { width, height }.into());
    }

    // Packed row length, and the 4-byte-aligned row length BMP stores.
    let row_len = ((width + 7) / 8) as usize;
    let row_len_padded = (((width + 31) & !31) >> 3) as usize;

    let width = width as u16;
    let height = height as u16;

    let mut data = vec![0u8; row_len * height as usize];

    reader.seek(io::SeekFrom::Start(pixel_offset as u64))?;
    for row in (0..height as usize).rev() {
        reader.read_exact(&mut data[row * row_len..(row + 1) * row_len])?;
        if row_len != row_len_padded {
            reader.seek(io::SeekFrom::Current((row_len_padded - row_len) as i64))?;
        }
    }

    Ok(MonoBitmap {
        width,
        height,
        data,
    })
}

/// Decodes the monochrome BMP at `path`. The `.bmp` extension is mandatory.
pub fn load_mono_bmp(path: &Path) -> Result<MonoBitmap, Box<dyn error::Error>> {
    match path.extension().and_then(std::ffi::OsStr::to_str) {
        Some("bmp") => {}
        _ => {
            return Err(BmpError::UnsupportedExtension {
                path: path.display().to_string(),
            }
            .into())
        }
    }

    let file = File::open(path)?;
    decode_bmp(&mut BufReader::new(file))
}
