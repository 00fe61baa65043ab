use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::error::MatError;

// Element data types (MAT-file level 5).
pub const MI_INT8: u32 = 1;
pub const MI_UINT8: u32 = 2;
pub const MI_INT16: u32 = 3;
pub const MI_UINT16: u32 = 4;
pub const MI_INT32: u32 = 5;
pub const MI_UINT32: u32 = 6;
pub const MI_SINGLE: u32 = 7;
pub const MI_DOUBLE: u32 = 9;
pub const MI_INT64: u32 = 12;
pub const MI_UINT64: u32 = 13;
pub const MI_MATRIX: u32 = 14;
pub const MI_COMPRESSED: u32 = 15;
pub const MI_UTF8: u32 = 16;
pub const MI_UTF16: u32 = 17;
pub const MI_UTF32: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    pub fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        }
    }

    pub fn put_u16(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn put_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn put_f64(self, value: f64) -> [u8; 8] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

/// Bounds-checked slice of `len` bytes starting at `offset`.
pub fn take(data: &[u8], offset: usize, len: usize) -> Result<&[u8], MatError> {
    let end = offset.checked_add(len);
    match end {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(MatError::Truncated {
            offset,
            needed: len,
            available: data.len().saturating_sub(offset),
        }),
    }
}

pub fn read_u32(data: &[u8], offset: usize, endian: Endian) -> Result<u32, MatError> {
    let bytes = take(data, offset, 4)?;
    Ok(endian.u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Rounds `len` up to the next multiple of eight.
pub fn padded(len: usize) -> usize {
    (len + 7) & !7
}

pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>, MatError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(MatError::Inflate)?;
    Ok(decompressed)
}

pub fn deflate(raw: &[u8]) -> Result<Vec<u8>, MatError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

fn width_of(data_type: u32) -> Option<usize> {
    match data_type {
        MI_INT8 | MI_UINT8 | MI_UTF8 => Some(1),
        MI_INT16 | MI_UINT16 | MI_UTF16 => Some(2),
        MI_INT32 | MI_UINT32 | MI_SINGLE | MI_UTF32 => Some(4),
        MI_DOUBLE | MI_INT64 | MI_UINT64 => Some(8),
        _ => None,
    }
}

/// Widens numeric element data of any storage type to `f64`.
pub fn decode_numeric(data_type: u32, data: &[u8], endian: Endian) -> Result<Vec<f64>, MatError> {
    let width = width_of(data_type).ok_or(MatError::UnknownDataType(data_type))?;
    if data.len() % width != 0 {
        return Err(MatError::Invalid(format!(
            "{} bytes is not a whole number of {width}-byte values",
            data.len()
        )));
    }

    let values = data.chunks_exact(width).map(|chunk| match data_type {
        MI_INT8 => chunk[0] as i8 as f64,
        MI_UINT8 | MI_UTF8 => chunk[0] as f64,
        MI_INT16 => endian.u16([chunk[0], chunk[1]]) as i16 as f64,
        MI_UINT16 | MI_UTF16 => endian.u16([chunk[0], chunk[1]]) as f64,
        MI_INT32 => endian.u32([chunk[0], chunk[1], chunk[2], chunk[3]]) as i32 as f64,
        MI_UINT32 | MI_UTF32 => endian.u32([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
        MI_SINGLE => f32::from_bits(endian.u32([chunk[0], chunk[1], chunk[2], chunk[3]])) as f64,
        _ => {
            let bits = endian.u64([
                chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
            ]);
            match data_type {
                MI_DOUBLE => f64::from_bits(bits),
                MI_INT64 => bits as i64 as f64,
                _ => bits as f64,
            }
        }
    });
    Ok(values.collect())
}

/// Decodes character element data into code points.
pub fn decode_chars(data_type: u32, data: &[u8], endian: Endian) -> Result<Vec<char>, MatError> {
    match data_type {
        MI_UTF8 => {
            let text = std::str::from_utf8(data)
                .map_err(|e| MatError::Invalid(format!("char data is not UTF-8: {e}")))?;
            Ok(text.chars().collect())
        }
        // MATLAB writes UCS-2 as UINT16; surrogate pairs only appear in UTF16 data.
        MI_UTF16 | MI_UINT16 => {
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|chunk| endian.u16([chunk[0], chunk[1]]))
                .collect();
            Ok(char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect())
        }
        MI_UTF32 | MI_UINT32 | MI_INT32 => Ok(data
            .chunks_exact(4)
            .map(|chunk| {
                let code = endian.u32([chunk[0], chunk[1], chunk[2], chunk[3]]);
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect()),
        MI_UINT8 | MI_INT8 => Ok(data.iter().map(|&b| b as char).collect()),
        other => Err(MatError::UnexpectedElement {
            expected: "character data",
            found: other,
        }),
    }
}

/// Compares samples by bit pattern, so a `NaN` equals the same `NaN`.
pub fn same_bits(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Converts a NUL-padded byte field into a string.
pub fn trim_nul(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
