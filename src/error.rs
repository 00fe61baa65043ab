use std::error::Error as StdError;

use thiserror::Error;

/// Failures of the MAT-file container layer.
#[derive(Debug, Error)]
pub enum MatError {
    #[error("input is {0} bytes, shorter than the 128-byte MAT-file header")]
    TooShort(usize),

    #[error("unrecognised endian indicator {0:?}")]
    BadEndian([u8; 2]),

    #[error("MAT-file version 7.3 (HDF5) is not supported")]
    Hdf5Container,

    #[error("unsupported MAT-file version {0:#06x}")]
    UnsupportedVersion(u16),

    #[error("truncated data at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("expected {expected}, found data type {found}")]
    UnexpectedElement { expected: &'static str, found: u32 },

    #[error("unknown data type {0}")]
    UnknownDataType(u32),

    #[error("{0}")]
    Invalid(String),

    #[error("cannot encode {0} values")]
    Unencodable(&'static str),

    #[error("zlib stream could not be inflated")]
    Inflate(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`UnpackError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input could not be opened or parsed as a MAT-file at all.
    UnreadableInput,
    /// A declared field does not have the expected nested shape.
    MalformedRecord,
}

/// Why a record could not be unpacked. A record is either fully decoded or
/// reported through this type; there is no partially built state.
#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("unreadable input {origin}")]
    UnreadableInput {
        origin: String,
        #[source]
        source: MatError,
    },

    #[error("malformed record field '{field}': {reason}")]
    MalformedRecord { field: String, reason: String },
}

impl UnpackError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        UnpackError::MalformedRecord {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unreadable(origin: impl Into<String>, source: MatError) -> Self {
        UnpackError::UnreadableInput {
            origin: origin.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UnpackError::UnreadableInput { .. } => ErrorKind::UnreadableInput,
            UnpackError::MalformedRecord { .. } => ErrorKind::MalformedRecord,
        }
    }

    /// The error and every underlying cause, joined with `": "`.
    pub fn diagnostic(&self) -> String {
        let mut message = self.to_string();
        let mut cause = self.source();
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_includes_cause() {
        let err = UnpackError::unreadable("<buffer>", MatError::TooShort(12));
        assert_eq!(err.kind(), ErrorKind::UnreadableInput);
        assert_eq!(
            err.diagnostic(),
            "unreadable input <buffer>: input is 12 bytes, shorter than the 128-byte MAT-file header"
        );
    }

    #[test]
    fn test_malformed_diagnostic() {
        let err = UnpackError::malformed("ctrlPV[0].val", "expected a numeric array, found char");
        assert_eq!(err.kind(), ErrorKind::MalformedRecord);
        assert!(err.diagnostic().contains("ctrlPV[0].val"));
    }
}
