use serde::{Deserialize, Serialize};

/// What to do with a PV reading whose `val` is `[]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReading {
    /// Substitute NaN and log a warning.
    #[default]
    Nan,
    /// Fail the decode as a malformed record.
    Reject,
}

/// Options shared by the record unpackers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnpackOptions {
    /// Name of the top-level MAT-file variable holding the record.
    pub root_variable: String,
    pub empty_reading: EmptyReading,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        UnpackOptions {
            root_variable: "data".to_string(),
            empty_reading: EmptyReading::Nan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_fill_defaults() {
        let opts: UnpackOptions = serde_json::from_str(r#"{"empty_reading": "reject"}"#).unwrap();
        assert_eq!(opts.root_variable, "data");
        assert_eq!(opts.empty_reading, EmptyReading::Reject);
    }
}
