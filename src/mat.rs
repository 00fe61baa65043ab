//! Reader for MATLAB level-5 MAT-files (versions 5 through 7).
//!
//! A file is a 128-byte header followed by tagged data elements. Each
//! top-level element is an array (`miMATRIX`) or a zlib stream wrapping one
//! (`miCOMPRESSED`). Arrays nest: cells and structs contain further arrays,
//! which is how correlation-plot and emittance-scan records are laid out.
//!
//! All data is stored column-major, so element `(i, j, k)` of an array with
//! dimensions `[d0, d1, d2]` sits at linear index `i + d0 * (j + d1 * k)`.

use std::path::Path;

use serde::Serialize;

use crate::error::MatError;
use crate::utils::{
    decode_chars, decode_numeric, inflate, padded, read_u32, same_bits, take, trim_nul, Endian,
    MI_COMPRESSED, MI_INT32, MI_INT8, MI_MATRIX, MI_UINT32, MI_UINT8,
};

pub const HEADER_LEN: usize = 128;
const TEXT_LEN: usize = 116;
const VERSION_5: u16 = 0x0100;
const VERSION_73: u16 = 0x0200;

pub(crate) const CLASS_CELL: u8 = 1;
pub(crate) const CLASS_STRUCT: u8 = 2;
pub(crate) const CLASS_OBJECT: u8 = 3;
pub(crate) const CLASS_CHAR: u8 = 4;

pub(crate) const FLAG_COMPLEX: u32 = 0x08;
pub(crate) const FLAG_GLOBAL: u32 = 0x04;
pub(crate) const FLAG_LOGICAL: u32 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NumericClass {
    Double,
    Single,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
}

impl NumericClass {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            6 => NumericClass::Double,
            7 => NumericClass::Single,
            8 => NumericClass::Int8,
            9 => NumericClass::UInt8,
            10 => NumericClass::Int16,
            11 => NumericClass::UInt16,
            12 => NumericClass::Int32,
            13 => NumericClass::UInt32,
            14 => NumericClass::Int64,
            15 => NumericClass::UInt64,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        match self {
            NumericClass::Double => 6,
            NumericClass::Single => 7,
            NumericClass::Int8 => 8,
            NumericClass::UInt8 => 9,
            NumericClass::Int16 => 10,
            NumericClass::UInt16 => 11,
            NumericClass::Int32 => 12,
            NumericClass::UInt32 => 13,
            NumericClass::Int64 => 14,
            NumericClass::UInt64 => 15,
        }
    }
}

/// Numeric or logical array, widened to `f64`.
///
/// Equality compares samples bit for bit, so arrays holding `NaN` compare
/// equal to themselves.
#[derive(Debug, Clone, Serialize)]
pub struct NumericArray {
    pub class: NumericClass,
    pub dims: Vec<usize>,
    pub real: Vec<f64>,
    pub imag: Option<Vec<f64>>,
    pub logical: bool,
}

impl PartialEq for NumericArray {
    fn eq(&self, other: &Self) -> bool {
        let imag = match (&self.imag, &other.imag) {
            (Some(a), Some(b)) => same_bits(a, b),
            (None, None) => true,
            _ => false,
        };
        self.class == other.class
            && self.dims == other.dims
            && self.logical == other.logical
            && same_bits(&self.real, &other.real)
            && imag
    }
}

impl NumericArray {
    pub fn new(dims: Vec<usize>, real: Vec<f64>) -> Self {
        NumericArray {
            class: NumericClass::Double,
            dims,
            real,
            imag: None,
            logical: false,
        }
    }

    pub fn empty() -> Self {
        NumericArray::new(vec![0, 0], Vec::new())
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    pub fn first(&self) -> Option<f64> {
        self.real.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharArray {
    pub dims: Vec<usize>,
    pub data: Vec<char>,
}

impl CharArray {
    /// Each row of the (column-major) character matrix as a string.
    pub fn rows(&self) -> Vec<String> {
        let rows = self.dims.first().copied().unwrap_or(0);
        if rows == 0 {
            return Vec::new();
        }
        let cols = self.data.len() / rows;
        (0..rows)
            .map(|r| (0..cols).map(|c| self.data[r + rows * c]).collect())
            .collect()
    }

    /// The first row, or an empty string for an empty array.
    pub fn text(&self) -> String {
        self.rows().into_iter().next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellArray {
    pub dims: Vec<usize>,
    pub cells: Vec<MatValue>,
}

/// Struct (or object) array. `values` is element-major: the value of field
/// `f` of element `e` is `values[e * field_names.len() + f]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructArray {
    pub dims: Vec<usize>,
    pub field_names: Vec<String>,
    pub class_name: Option<String>,
    pub values: Vec<MatValue>,
}

impl StructArray {
    /// A struct array with every field of every element set to `[]`.
    ///
    /// # Panics
    ///
    /// Panics if the element count overflows `usize`; see [`StructArray::try_new`].
    pub fn new(dims: Vec<usize>, field_names: Vec<String>) -> Self {
        match StructArray::try_new(dims, field_names) {
            Ok(array) => array,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`StructArray::new`], but rejects dimensions whose element
    /// count overflows.
    pub fn try_new(dims: Vec<usize>, field_names: Vec<String>) -> Result<Self, MatError> {
        let count = element_count(&dims)
            .and_then(|n| n.checked_mul(field_names.len()))
            .ok_or_else(|| MatError::Invalid(format!("dimensions {dims:?} overflow")))?;
        Ok(StructArray {
            dims,
            field_names,
            class_name: None,
            values: vec![MatValue::empty(); count],
        })
    }

    /// A 1x1 struct built from `(name, value)` pairs.
    pub fn scalar<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, MatValue)>,
        S: Into<String>,
    {
        let (field_names, values): (Vec<String>, Vec<MatValue>) =
            fields.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        StructArray {
            dims: vec![1, 1],
            field_names,
            class_name: None,
            values,
        }
    }

    /// Number of elements, the product of the dimensions.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extent along `axis`; trailing singleton dimensions are implicit.
    pub fn dim(&self, axis: usize) -> usize {
        self.dims.get(axis).copied().unwrap_or(1)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == name)
    }

    /// Column-major linear index of a multi-index.
    pub fn linear_index(&self, index: &[usize]) -> usize {
        let mut linear = 0;
        let mut stride = 1;
        for (axis, &i) in index.iter().enumerate() {
            linear += i * stride;
            stride *= self.dim(axis);
        }
        linear
    }

    pub fn get(&self, element: usize, field: &str) -> Option<&MatValue> {
        let f = self.field_index(field)?;
        self.values.get(element * self.field_names.len() + f)
    }

    pub fn set(&mut self, element: usize, field: &str, value: MatValue) -> bool {
        let width = self.field_names.len();
        match self.field_index(field) {
            Some(f) if element < self.len() => {
                self.values[element * width + f] = value;
                true
            }
            _ => false,
        }
    }
}

/// An array class this reader keeps undecoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpaqueArray {
    pub class: u8,
    pub dims: Vec<usize>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MatValue {
    Numeric(NumericArray),
    Char(CharArray),
    Cell(CellArray),
    Struct(StructArray),
    Opaque(OpaqueArray),
}

impl MatValue {
    pub fn empty() -> Self {
        MatValue::Numeric(NumericArray::empty())
    }

    pub fn scalar(value: f64) -> Self {
        MatValue::Numeric(NumericArray::new(vec![1, 1], vec![value]))
    }

    pub fn row(values: &[f64]) -> Self {
        MatValue::Numeric(NumericArray::new(vec![1, values.len()], values.to_vec()))
    }

    pub fn column(values: &[f64]) -> Self {
        MatValue::Numeric(NumericArray::new(vec![values.len(), 1], values.to_vec()))
    }

    pub fn string(text: &str) -> Self {
        let data: Vec<char> = text.chars().collect();
        let dims = if data.is_empty() {
            vec![0, 0]
        } else {
            vec![1, data.len()]
        };
        MatValue::Char(CharArray { dims, data })
    }

    pub fn cell(dims: Vec<usize>, cells: Vec<MatValue>) -> Self {
        MatValue::Cell(CellArray { dims, cells })
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            MatValue::Numeric(_) => "numeric",
            MatValue::Char(_) => "char",
            MatValue::Cell(_) => "cell",
            MatValue::Struct(_) => "struct",
            MatValue::Opaque(_) => "opaque",
        }
    }

    pub fn dims(&self) -> &[usize] {
        match self {
            MatValue::Numeric(a) => &a.dims,
            MatValue::Char(a) => &a.dims,
            MatValue::Cell(a) => &a.dims,
            MatValue::Struct(a) => &a.dims,
            MatValue::Opaque(a) => &a.dims,
        }
    }

    pub fn as_numeric(&self) -> Option<&NumericArray> {
        match self {
            MatValue::Numeric(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<&CharArray> {
        match self {
            MatValue::Char(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&CellArray> {
        match self {
            MatValue::Cell(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructArray> {
        match self {
            MatValue::Struct(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatHeader {
    pub text: String,
    pub subsys_offset: u64,
    pub version: u16,
    pub endian: Endian,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub global: bool,
    pub value: MatValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatFile {
    pub header: MatHeader,
    pub variables: Vec<Variable>,
}

impl MatFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MatError> {
        let bytes = std::fs::read(path)?;
        MatFile::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, MatError> {
        let header = parse_header(bytes)?;
        let endian = header.endian;

        let mut variables = Vec::new();
        let mut elements = Elements::new(&bytes[HEADER_LEN..], endian);
        while let Some(element) = elements.next()? {
            match element.data_type {
                MI_MATRIX => variables.push(parse_matrix(element.data, endian)?),
                MI_COMPRESSED => {
                    let inflated = inflate(element.data)?;
                    let mut inner = Elements::new(&inflated, endian);
                    while let Some(element) = inner.next()? {
                        if element.data_type != MI_MATRIX {
                            return Err(MatError::UnexpectedElement {
                                expected: "array inside compressed element",
                                found: element.data_type,
                            });
                        }
                        variables.push(parse_matrix(element.data, endian)?);
                    }
                }
                other => {
                    return Err(MatError::UnexpectedElement {
                        expected: "top-level array",
                        found: other,
                    })
                }
            }
        }

        Ok(MatFile { header, variables })
    }

    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }
}

fn parse_header(bytes: &[u8]) -> Result<MatHeader, MatError> {
    if bytes.len() < HEADER_LEN {
        return Err(MatError::TooShort(bytes.len()));
    }

    let endian = match [bytes[126], bytes[127]] {
        [b'I', b'M'] => Endian::Little,
        [b'M', b'I'] => Endian::Big,
        other => return Err(MatError::BadEndian(other)),
    };

    let version = endian.u16([bytes[124], bytes[125]]);
    match version {
        VERSION_5 => {}
        VERSION_73 => return Err(MatError::Hdf5Container),
        other => return Err(MatError::UnsupportedVersion(other)),
    }

    let mut offset = [0u8; 8];
    offset.copy_from_slice(&bytes[TEXT_LEN..TEXT_LEN + 8]);

    Ok(MatHeader {
        text: trim_nul(&bytes[..TEXT_LEN]).trim_end().to_string(),
        subsys_offset: endian.u64(offset),
        version,
        endian,
    })
}

struct Element<'a> {
    data_type: u32,
    data: &'a [u8],
}

/// Cursor over a run of tagged data elements.
struct Elements<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Elements<'a> {
    fn new(data: &'a [u8], endian: Endian) -> Self {
        Elements {
            data,
            pos: 0,
            endian,
        }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    fn next(&mut self) -> Result<Option<Element<'a>>, MatError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let word = read_u32(self.data, self.pos, self.endian)?;
        let small_len = (word >> 16) as usize;
        if small_len != 0 {
            // Small data element: type and length share the first word.
            if small_len > 4 {
                return Err(MatError::Invalid(format!(
                    "small data element at offset {} claims {small_len} bytes",
                    self.pos
                )));
            }
            let data = take(self.data, self.pos + 4, small_len)?;
            self.pos += 8;
            return Ok(Some(Element {
                data_type: word & 0xffff,
                data,
            }));
        }

        let len = read_u32(self.data, self.pos + 4, self.endian)? as usize;
        let data = take(self.data, self.pos + 8, len)?;
        // Compressed elements are not padded. The final element of a stream
        // may also omit its padding.
        let advance = if word == MI_COMPRESSED { len } else { padded(len) };
        self.pos = (self.pos + 8 + advance).min(self.data.len());
        Ok(Some(Element {
            data_type: word,
            data,
        }))
    }

    fn expect(&mut self, what: &'static str) -> Result<Element<'a>, MatError> {
        self.next()?
            .ok_or_else(|| MatError::Invalid(format!("array ends before its {what}")))
    }

    fn expect_matrix(&mut self, what: &'static str) -> Result<Variable, MatError> {
        let element = self.expect(what)?;
        if element.data_type != MI_MATRIX {
            return Err(MatError::UnexpectedElement {
                expected: what,
                found: element.data_type,
            });
        }
        parse_matrix(element.data, self.endian)
    }
}

fn expect_type(element: &Element<'_>, allowed: &[u32], what: &'static str) -> Result<(), MatError> {
    if allowed.contains(&element.data_type) {
        Ok(())
    } else {
        Err(MatError::UnexpectedElement {
            expected: what,
            found: element.data_type,
        })
    }
}

fn parse_name(element: &Element<'_>, what: &'static str) -> Result<String, MatError> {
    expect_type(element, &[MI_INT8, MI_UINT8], what)?;
    Ok(trim_nul(element.data))
}

fn parse_matrix(data: &[u8], endian: Endian) -> Result<Variable, MatError> {
    // A zero-length array element stands for `[]`, common inside cells.
    if data.is_empty() {
        return Ok(Variable {
            name: String::new(),
            global: false,
            value: MatValue::empty(),
        });
    }

    let mut sub = Elements::new(data, endian);

    let flags = sub.expect("array flags")?;
    expect_type(&flags, &[MI_UINT32], "array flags")?;
    let flags = read_u32(flags.data, 0, endian)?;
    let class = (flags & 0xff) as u8;
    let bits = (flags >> 8) & 0xff;

    let dims = sub.expect("dimensions")?;
    expect_type(&dims, &[MI_INT32], "dimensions")?;
    let dims = decode_numeric(MI_INT32, dims.data, endian)?
        .into_iter()
        .map(|d| {
            if d < 0.0 {
                Err(MatError::Invalid(format!("negative dimension {d}")))
            } else {
                Ok(d as usize)
            }
        })
        .collect::<Result<Vec<usize>, MatError>>()?;
    let count = element_count(&dims)
        .ok_or_else(|| MatError::Invalid(format!("dimensions {dims:?} overflow")))?;

    let name = parse_name(&sub.expect("array name")?, "array name")?;

    let value = match class {
        CLASS_CELL => {
            fits_elements(&sub, count, "cell")?;
            let mut cells = Vec::with_capacity(count);
            for _ in 0..count {
                cells.push(sub.expect_matrix("cell element")?.value);
            }
            MatValue::Cell(CellArray { dims, cells })
        }
        CLASS_STRUCT | CLASS_OBJECT => {
            let class_name = if class == CLASS_OBJECT {
                Some(parse_name(&sub.expect("class name")?, "class name")?)
            } else {
                None
            };

            let name_len = sub.expect("field name length")?;
            expect_type(&name_len, &[MI_INT32], "field name length")?;
            let name_len = read_u32(name_len.data, 0, endian)? as usize;

            let names = sub.expect("field names")?;
            expect_type(&names, &[MI_INT8, MI_UINT8], "field names")?;
            let field_names: Vec<String> = if name_len == 0 {
                Vec::new()
            } else {
                names.data.chunks(name_len).map(trim_nul).collect()
            };

            let slots = count
                .checked_mul(field_names.len())
                .ok_or_else(|| MatError::Invalid(format!("struct '{name}' is too large")))?;
            fits_elements(&sub, slots, "struct")?;
            let mut values = Vec::with_capacity(slots);
            for _ in 0..slots {
                values.push(sub.expect_matrix("struct field")?.value);
            }
            MatValue::Struct(StructArray {
                dims,
                field_names,
                class_name,
                values,
            })
        }
        CLASS_CHAR => {
            let data = match sub.next()? {
                Some(element) => decode_chars(element.data_type, element.data, endian)?,
                None => Vec::new(),
            };
            if data.len() != count {
                return Err(MatError::Invalid(format!(
                    "char array '{name}' has {} characters for {count} cells",
                    data.len()
                )));
            }
            MatValue::Char(CharArray { dims, data })
        }
        code => match NumericClass::from_code(code) {
            Some(numeric) => {
                let real = numeric_part(&mut sub, "real part", count, endian)?;
                let imag = if bits & FLAG_COMPLEX != 0 {
                    Some(numeric_part(&mut sub, "imaginary part", count, endian)?)
                } else {
                    None
                };
                MatValue::Numeric(NumericArray {
                    class: numeric,
                    dims,
                    real,
                    imag,
                    logical: bits & FLAG_LOGICAL != 0,
                })
            }
            None => MatValue::Opaque(OpaqueArray {
                class: code,
                dims,
                raw: sub.remaining().to_vec(),
            }),
        },
    };

    Ok(Variable {
        name,
        global: bits & FLAG_GLOBAL != 0,
        value,
    })
}

/// Product of the dimensions, or `None` when it overflows.
pub(crate) fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Every nested array needs at least one 8-byte tag, which bounds how many
/// the rest of the element can hold.
fn fits_elements(sub: &Elements<'_>, needed: usize, what: &str) -> Result<(), MatError> {
    let available = sub.remaining().len() / 8;
    if needed > available {
        return Err(MatError::Invalid(format!(
            "{what} array declares {needed} values but only {available} fit"
        )));
    }
    Ok(())
}

fn numeric_part(
    sub: &mut Elements<'_>,
    what: &'static str,
    count: usize,
    endian: Endian,
) -> Result<Vec<f64>, MatError> {
    let element = sub.expect(what)?;
    let values = decode_numeric(element.data_type, element.data, endian)?;
    if values.len() != count {
        return Err(MatError::Invalid(format!(
            "{what} has {} values for {count} cells",
            values.len()
        )));
    }
    Ok(values)
}
