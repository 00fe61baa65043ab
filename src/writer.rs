//! Writer for the subset of MAT-file level 5 that [`crate::mat`] decodes.

use std::path::Path;

use crate::error::MatError;
use crate::mat::{
    MatValue, CLASS_CELL, CLASS_CHAR, CLASS_OBJECT, CLASS_STRUCT, FLAG_COMPLEX, FLAG_LOGICAL,
    HEADER_LEN,
};
use crate::utils::{
    deflate, padded, Endian, MI_COMPRESSED, MI_DOUBLE, MI_INT32, MI_INT8, MI_MATRIX, MI_UINT16,
    MI_UINT32,
};

const HEADER_TEXT: &str = "MATLAB 5.0 MAT-file, Platform: scanmat";

#[derive(Debug, Clone)]
pub struct MatWriter {
    endian: Endian,
    compress: bool,
    variables: Vec<(String, MatValue)>,
}

impl Default for MatWriter {
    fn default() -> Self {
        MatWriter::new()
    }
}

impl MatWriter {
    pub fn new() -> Self {
        MatWriter {
            endian: Endian::Little,
            compress: true,
            variables: Vec::new(),
        }
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Wrap each variable in a zlib-compressed element (the v7 default).
    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: MatValue) -> Self {
        self.variables.push((name.into(), value));
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MatError> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        let mut text = HEADER_TEXT.as_bytes().to_vec();
        text.resize(116, b' ');
        out.extend(text);
        out.extend([0u8; 8]);
        out.extend(self.endian.put_u16(0x0100));
        out.extend(match self.endian {
            Endian::Little => *b"IM",
            Endian::Big => *b"MI",
        });

        for (name, value) in &self.variables {
            let mut element = Vec::new();
            put_matrix(&mut element, name, value, self.endian)?;
            if self.compress {
                let packed = deflate(&element)?;
                out.extend(self.endian.put_u32(MI_COMPRESSED));
                out.extend(self.endian.put_u32(packed.len() as u32));
                out.extend(packed);
            } else {
                out.extend(element);
            }
        }
        Ok(out)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), MatError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

fn put_element(out: &mut Vec<u8>, endian: Endian, data_type: u32, payload: &[u8]) {
    if (1..=4).contains(&payload.len()) {
        out.extend(endian.put_u32(((payload.len() as u32) << 16) | data_type));
        out.extend(payload);
        out.resize(out.len() + 4 - payload.len(), 0);
        return;
    }
    out.extend(endian.put_u32(data_type));
    out.extend(endian.put_u32(payload.len() as u32));
    out.extend(payload);
    out.resize(out.len() + padded(payload.len()) - payload.len(), 0);
}

fn doubles(values: &[f64], endian: Endian) -> Vec<u8> {
    values.iter().flat_map(|&v| endian.put_f64(v)).collect()
}

fn put_matrix(
    out: &mut Vec<u8>,
    name: &str,
    value: &MatValue,
    endian: Endian,
) -> Result<(), MatError> {
    let mut body = Vec::new();

    let (class, bits) = match value {
        MatValue::Numeric(a) => {
            let mut bits = 0;
            if a.imag.is_some() {
                bits |= FLAG_COMPLEX;
            }
            if a.logical {
                bits |= FLAG_LOGICAL;
            }
            (a.class.code(), bits)
        }
        MatValue::Char(_) => (CLASS_CHAR, 0),
        MatValue::Cell(_) => (CLASS_CELL, 0),
        MatValue::Struct(s) if s.class_name.is_some() => (CLASS_OBJECT, 0),
        MatValue::Struct(_) => (CLASS_STRUCT, 0),
        MatValue::Opaque(_) => return Err(MatError::Unencodable("opaque")),
    };

    let mut flags = Vec::with_capacity(8);
    flags.extend(endian.put_u32(u32::from(class) | (bits << 8)));
    flags.extend(endian.put_u32(0));
    put_element(&mut body, endian, MI_UINT32, &flags);

    let dims: Vec<u8> = value
        .dims()
        .iter()
        .flat_map(|&d| endian.put_u32(d as u32))
        .collect();
    put_element(&mut body, endian, MI_INT32, &dims);
    put_element(&mut body, endian, MI_INT8, name.as_bytes());

    match value {
        MatValue::Numeric(a) => {
            put_element(&mut body, endian, MI_DOUBLE, &doubles(&a.real, endian));
            if let Some(imag) = &a.imag {
                put_element(&mut body, endian, MI_DOUBLE, &doubles(imag, endian));
            }
        }
        MatValue::Char(a) => {
            let units: Vec<u8> = a
                .data
                .iter()
                .collect::<String>()
                .encode_utf16()
                .flat_map(|u| endian.put_u16(u))
                .collect();
            put_element(&mut body, endian, MI_UINT16, &units);
        }
        MatValue::Cell(a) => {
            for cell in &a.cells {
                put_matrix(&mut body, "", cell, endian)?;
            }
        }
        MatValue::Struct(s) => {
            if let Some(class_name) = &s.class_name {
                put_element(&mut body, endian, MI_INT8, class_name.as_bytes());
            }
            let name_len = s.field_names.iter().map(String::len).max().unwrap_or(0) + 1;
            put_element(&mut body, endian, MI_INT32, &endian.put_u32(name_len as u32));
            let mut names = Vec::with_capacity(name_len * s.field_names.len());
            for field in &s.field_names {
                let start = names.len();
                names.extend(field.as_bytes());
                names.resize(start + name_len, 0);
            }
            put_element(&mut body, endian, MI_INT8, &names);
            for field_value in &s.values {
                put_matrix(&mut body, "", field_value, endian)?;
            }
        }
        MatValue::Opaque(_) => unreachable!("rejected above"),
    }

    put_element(out, endian, MI_MATRIX, &body);
    Ok(())
}
