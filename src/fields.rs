//! Typed extraction of record fields, with the field path in every error.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::config::{EmptyReading, UnpackOptions};
use crate::error::UnpackError;
use crate::mat::{MatFile, MatValue, NumericArray, StructArray};

/// The first element of the root struct, plus the set of names it declares.
pub(crate) struct Record<'a> {
    root: &'a StructArray,
    declared: BTreeSet<&'a str>,
}

impl<'a> Record<'a> {
    pub(crate) fn from_mat(mat: &'a MatFile, opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let var = opts.root_variable.as_str();
        let value = mat.get(var).ok_or_else(|| {
            UnpackError::malformed(var, "variable is not present in the MAT-file")
        })?;
        let root = structs(value, var)?;
        if root.is_empty() {
            return Err(UnpackError::malformed(var, "struct array has no elements"));
        }
        if root.len() > 1 {
            debug!("'{var}' has {} elements, using the first", root.len());
        }

        let declared = root.field_names.iter().map(String::as_str).collect();
        Ok(Record { root, declared })
    }

    pub(crate) fn declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    /// The value of a declared field, `None` when the record omits it.
    pub(crate) fn field(&self, name: &str) -> Option<&'a MatValue> {
        if !self.declared(name) {
            return None;
        }
        self.root.get(0, name)
    }

    pub(crate) fn field_names(&self) -> Vec<String> {
        self.root.field_names.clone()
    }

    pub(crate) fn log_unknown(&self, known: &[&str]) {
        for name in &self.root.field_names {
            if !known.contains(&name.as_str()) {
                debug!("skipping undecoded field '{name}'");
            }
        }
    }
}

fn mismatch(path: &str, expected: &str, value: &MatValue) -> UnpackError {
    UnpackError::malformed(path, format!("expected {expected}, found {}", value.kind()))
}

pub(crate) fn structs<'a>(value: &'a MatValue, path: &str) -> Result<&'a StructArray, UnpackError> {
    value
        .as_struct()
        .ok_or_else(|| mismatch(path, "a struct array", value))
}

pub(crate) fn numeric<'a>(
    value: &'a MatValue,
    path: &str,
) -> Result<&'a NumericArray, UnpackError> {
    value
        .as_numeric()
        .ok_or_else(|| mismatch(path, "a numeric array", value))
}

pub(crate) fn member<'a>(
    s: &'a StructArray,
    element: usize,
    field: &str,
    path: &str,
) -> Result<&'a MatValue, UnpackError> {
    s.get(element, field)
        .ok_or_else(|| UnpackError::malformed(path, format!("struct has no field '{field}'")))
}

pub(crate) fn text(value: &MatValue, path: &str) -> Result<String, UnpackError> {
    value
        .as_char()
        .map(|c| c.text())
        .ok_or_else(|| mismatch(path, "a char array", value))
}

/// A name stored either as a char array or as a cell whose first entry is
/// one. Returns the text and whether the list-like (cell) form was used.
pub(crate) fn name_text(value: &MatValue, path: &str) -> Result<(String, bool), UnpackError> {
    match value {
        MatValue::Char(c) => Ok((c.text(), false)),
        MatValue::Cell(cell) => match cell.cells.first() {
            Some(first) => Ok((text(first, &format!("{path}{{1}}"))?, true)),
            None => Err(UnpackError::malformed(path, "name cell is empty")),
        },
        other => Err(mismatch(path, "a char array or cell of char", other)),
    }
}

/// The first element of a numeric array, which must not be empty.
pub(crate) fn scalar(value: &MatValue, path: &str) -> Result<f64, UnpackError> {
    numeric(value, path)?
        .first()
        .ok_or_else(|| UnpackError::malformed(path, "numeric array is empty"))
}

/// Like [`scalar`], but an empty array follows the empty-reading policy.
pub(crate) fn reading(
    value: &MatValue,
    path: &str,
    opts: &UnpackOptions,
) -> Result<f64, UnpackError> {
    match numeric(value, path)?.first() {
        Some(v) => Ok(v),
        None => match opts.empty_reading {
            EmptyReading::Nan => {
                warn!("{path} is empty, recording NaN");
                Ok(f64::NAN)
            }
            EmptyReading::Reject => Err(UnpackError::malformed(path, "reading is empty")),
        },
    }
}

pub(crate) fn values(value: &MatValue, path: &str) -> Result<Vec<f64>, UnpackError> {
    Ok(numeric(value, path)?.real.clone())
}

pub(crate) fn integers(value: &MatValue, path: &str) -> Result<Vec<i64>, UnpackError> {
    numeric(value, path)?
        .real
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            if v.is_finite() && v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(UnpackError::malformed(
                    format!("{path}[{i}]"),
                    format!("{v} is not an integer"),
                ))
            }
        })
        .collect()
}

/// The first element of a numeric array as an integer.
pub(crate) fn integer(value: &MatValue, path: &str) -> Result<i64, UnpackError> {
    integers(value, path)?
        .first()
        .copied()
        .ok_or_else(|| UnpackError::malformed(path, "numeric array is empty"))
}

/// Dimensions with trailing singletons dropped, which MATLAB treats as
/// implicit.
pub(crate) fn significant_dims(dims: &[usize]) -> &[usize] {
    let end = dims.iter().rposition(|&d| d != 1).map_or(0, |i| i + 1);
    &dims[..end]
}

/// Splits a struct array into `(outer, inner)` extents, folding every axis
/// beyond the first into `inner`.
pub(crate) fn split_2d(s: &StructArray) -> (usize, usize) {
    let outer = s.dim(0);
    if outer == 0 {
        (0, 0)
    } else {
        (outer, s.len() / outer)
    }
}

/// Splits a struct array into `(d0, d1, rest)` extents.
pub(crate) fn split_3d(s: &StructArray) -> (usize, usize, usize) {
    let (d0, d1) = (s.dim(0), s.dim(1));
    if d0 * d1 == 0 {
        (d0, d1, 0)
    } else {
        (d0, d1, s.len() / (d0 * d1))
    }
}
