//! # scanmat
//!
//! Unpacks correlation-plot scans, emittance scans and profile-monitor
//! images saved by the facility's MATLAB tools into typed, immutable Rust
//! values.
//!
//! ```no_run
//! use scanmat::ScanRecord;
//!
//! let scan = ScanRecord::open("CorrelationPlot-SOLN_GUNB_212_BCTRL.mat")?;
//! println!("scanned {:?} over {} points", scan.ctrl_pv(), scan.iterations());
//! if let Some(beam) = scan.beam() {
//!     println!("channels: {:?}", beam.names());
//! }
//! # Ok::<(), scanmat::UnpackError>(())
//! ```
//!
//! Fields a file does not declare come back as `None`. A declared field
//! whose contents have the wrong shape fails the whole decode with
//! [`UnpackError::MalformedRecord`].

pub mod config;
pub mod corr_plot;
pub mod emit_scan;
pub mod error;
mod fields;
pub mod mat;
pub mod mat_image;
pub mod models;
#[cfg(feature = "python")]
mod python;
pub mod utils;
pub mod writer;

use std::path::Path;

use serde::Serialize;

pub use config::{EmptyReading, UnpackOptions};
pub use error::{ErrorKind, MatError, UnpackError};
pub use mat::{MatFile, MatValue, NumericArray, StructArray};
pub use models::{
    BeamTable, ControlPv, EmitBeamTable, EmitFitResult, EmitScanRecord, FitModel, FitResult,
    MatImage, ProfilePv, PvReading, ReadbackPv, SampleShape, ScanRecord, TwissParam, TwissPv,
};
pub use writer::MatWriter;

/// Which unpacker a file's declared fields point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordKind {
    CorrelationPlot,
    EmittanceScan,
    Image,
    Unknown,
}

impl RecordKind {
    pub fn probe(mat: &MatFile, opts: &UnpackOptions) -> RecordKind {
        let Some(root) = mat.get(&opts.root_variable).and_then(MatValue::as_struct) else {
            return RecordKind::Unknown;
        };
        let declares = |names: &[&str]| names.iter().any(|n| root.has_field(n));

        if declares(&[corr_plot::CTRL_PV, corr_plot::READ_PV, corr_plot::PROF_PV]) {
            RecordKind::CorrelationPlot
        } else if declares(&[emit_scan::QUAD_NAME, emit_scan::QUAD_VALS, emit_scan::TWISS_PV]) {
            RecordKind::EmittanceScan
        } else if declares(&[mat_image::IMAGE, mat_image::ROI_X_N, mat_image::PULSE_ID]) {
            RecordKind::Image
        } else {
            RecordKind::Unknown
        }
    }
}

/// Any kind of decoded record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Scan {
    CorrelationPlot(ScanRecord),
    EmittanceScan(EmitScanRecord),
    Image(MatImage),
}

/// Loads a file with whichever unpacker [`RecordKind::probe`] selects.
/// Files of unknown kind are decoded as correlation plots.
pub fn load_scan(path: impl AsRef<Path>, opts: &UnpackOptions) -> Result<Scan, UnpackError> {
    let path = path.as_ref();
    let mat = MatFile::open(path)
        .map_err(|e| UnpackError::unreadable(path.display().to_string(), e))?;
    Ok(match RecordKind::probe(&mat, opts) {
        RecordKind::EmittanceScan => {
            let mut scan = EmitScanRecord::from_mat(&mat, opts)?;
            scan.source = Some(path.to_path_buf());
            Scan::EmittanceScan(scan)
        }
        RecordKind::Image => {
            let mut image = MatImage::from_mat(&mat, opts)?;
            image.source = Some(path.to_path_buf());
            Scan::Image(image)
        }
        RecordKind::CorrelationPlot | RecordKind::Unknown => {
            let mut scan = ScanRecord::from_mat(&mat, opts)?;
            scan.source = Some(path.to_path_buf());
            Scan::CorrelationPlot(scan)
        }
    })
}

/// Decodes a correlation plot from an in-memory MAT-file.
pub fn unpack_corr_plot(bytes: &[u8]) -> Result<ScanRecord, UnpackError> {
    ScanRecord::from_bytes(bytes)
}

/// Decodes an emittance scan from an in-memory MAT-file.
pub fn unpack_emit_scan(bytes: &[u8]) -> Result<EmitScanRecord, UnpackError> {
    EmitScanRecord::from_bytes(bytes)
}

/// Decodes a profile-monitor image from an in-memory MAT-file.
pub fn unpack_image(bytes: &[u8]) -> Result<MatImage, UnpackError> {
    MatImage::from_bytes(bytes)
}
