use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

use crate::mat::{MatValue, NumericArray};
use crate::utils::same_bits;

/// MATLAB datenum of 1970-01-01T00:00:00.
const UNIX_EPOCH_DATENUM: f64 = 719_529.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Converts a MATLAB serial date number to a UTC timestamp.
pub fn datenum_to_datetime(datenum: f64) -> Option<NaiveDateTime> {
    if !datenum.is_finite() {
        return None;
    }
    let millis = ((datenum - UNIX_EPOCH_DATENUM) * SECONDS_PER_DAY * 1000.0).round();
    DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc())
}

/// Fit models applied to every beam profile, in stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FitModel {
    Gaussian,
    Asymmetric,
    Super,
    Rms,
    RmsCutPeak,
    RmsCutArea,
    RmsFloor,
}

impl FitModel {
    pub const ALL: [FitModel; 7] = [
        FitModel::Gaussian,
        FitModel::Asymmetric,
        FitModel::Super,
        FitModel::Rms,
        FitModel::RmsCutPeak,
        FitModel::RmsCutArea,
        FitModel::RmsFloor,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        FitModel::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            FitModel::Gaussian => "Gaussian",
            FitModel::Asymmetric => "Asymmetric",
            FitModel::Super => "Super",
            FitModel::Rms => "RMS",
            FitModel::RmsCutPeak => "RMS cut peak",
            FitModel::RmsCutArea => "RMS cut area",
            FitModel::RmsFloor => "RMS floor",
        }
    }
}

impl fmt::Display for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A scanned control PV: one commanded value and timestamp per scan point.
///
/// A point whose reading was empty holds `NaN`; equality compares values bit
/// for bit so such records still equal themselves.
#[derive(Debug, Clone, Serialize)]
pub struct ControlPv {
    pub name: String,
    pub desc: String,
    pub egu: String,
    pub vals: Vec<f64>,
    pub times: Vec<f64>,
}

impl PartialEq for ControlPv {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.desc == other.desc
            && self.egu == other.egu
            && same_bits(&self.vals, &other.vals)
            && same_bits(&self.times, &other.times)
    }
}

/// A readback PV, indexed `[iteration][sample]`.
#[derive(Debug, Clone, Serialize)]
pub struct ReadbackPv {
    pub name: String,
    pub desc: String,
    pub egu: String,
    pub vals: Vec<Vec<f64>>,
    pub times: Vec<Vec<f64>>,
}

impl PartialEq for ReadbackPv {
    fn eq(&self, other: &Self) -> bool {
        let grid = |a: &[Vec<f64>], b: &[Vec<f64>]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_bits(x, y))
        };
        self.name == other.name
            && self.desc == other.desc
            && self.egu == other.egu
            && grid(&self.vals, &other.vals)
            && grid(&self.times, &other.times)
    }
}

/// The channels produced by one fit model for one profile measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub model: FitModel,
    pub channels: BTreeMap<String, NumericArray>,
}

impl FitResult {
    pub fn get(&self, channel: &str) -> Option<&NumericArray> {
        self.channels.get(channel)
    }
}

/// Beam measurements indexed `[iteration][sample][fit]`.
///
/// The table is dense: `iterations()` is the declared iteration count, every
/// iteration holds `samples()` samples and every sample the same run of fit
/// models. Every [`FitResult`] carries exactly the channels in `names()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeamTable {
    names: Vec<String>,
    iterations: Vec<Vec<Vec<FitResult>>>,
}

impl BeamTable {
    pub(crate) fn new(names: Vec<String>, iterations: Vec<Vec<Vec<FitResult>>>) -> Self {
        BeamTable { names, iterations }
    }

    /// Channel names in declared order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iterations(&self) -> usize {
        self.iterations.len()
    }

    pub fn samples(&self) -> usize {
        self.iterations.first().map_or(0, Vec::len)
    }

    pub fn fits(&self) -> usize {
        self.iterations
            .first()
            .and_then(|samples| samples.first())
            .map_or(0, Vec::len)
    }

    pub fn iteration(&self, iteration: usize) -> Option<&[Vec<FitResult>]> {
        self.iterations.get(iteration).map(Vec::as_slice)
    }

    pub fn sample(&self, iteration: usize, sample: usize) -> Option<&[FitResult]> {
        self.iteration(iteration)?.get(sample).map(Vec::as_slice)
    }

    pub fn fit(&self, iteration: usize, sample: usize, model: FitModel) -> Option<&FitResult> {
        self.sample(iteration, sample)?.get(model.index())
    }

    pub fn channel(
        &self,
        iteration: usize,
        sample: usize,
        model: FitModel,
        name: &str,
    ) -> Option<&NumericArray> {
        self.fit(iteration, sample, model)?.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<Vec<FitResult>>> {
        self.iterations.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleShape {
    /// One reading per iteration.
    Single,
    /// Several readings per iteration.
    Multiple,
}

#[derive(Debug, Clone, Serialize)]
pub struct PvReading {
    pub val: NumericArray,
    pub ts: f64,
}

impl PartialEq for PvReading {
    fn eq(&self, other: &Self) -> bool {
        self.val == other.val && self.ts.to_bits() == other.ts.to_bits()
    }
}

/// A profile-monitor PV, indexed `[iteration][sample]` for both shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePv {
    pub name: String,
    pub desc: String,
    pub egu: String,
    pub shape: SampleShape,
    pub readings: Vec<Vec<PvReading>>,
}

/// A decoded correlation-plot scan.
///
/// Every field is `None` when the file does not declare it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub(crate) source: Option<PathBuf>,
    pub(crate) fields: Vec<String>,
    pub(crate) accelerator: Option<String>,
    pub(crate) status: Option<Vec<i64>>,
    pub(crate) ctrl: Option<Vec<ControlPv>>,
    pub(crate) read: Option<Vec<ReadbackPv>>,
    pub(crate) beam: Option<BeamTable>,
    pub(crate) prof: Option<BTreeMap<String, ProfilePv>>,
    pub(crate) ts: Option<f64>,
    pub(crate) config: Option<MatValue>,
}

impl ScanRecord {
    /// The file this record was loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Field names the record declares, in stored order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn accelerator(&self) -> Option<&str> {
        self.accelerator.as_deref()
    }

    pub fn status(&self) -> Option<&[i64]> {
        self.status.as_deref()
    }

    pub fn control_pvs(&self) -> Option<&[ControlPv]> {
        self.ctrl.as_deref()
    }

    pub fn readback_pvs(&self) -> Option<&[ReadbackPv]> {
        self.read.as_deref()
    }

    pub fn beam(&self) -> Option<&BeamTable> {
        self.beam.as_ref()
    }

    pub fn profile_pvs(&self) -> Option<&BTreeMap<String, ProfilePv>> {
        self.prof.as_ref()
    }

    /// Scan time as a MATLAB datenum.
    pub fn timestamp(&self) -> Option<f64> {
        self.ts
    }

    pub fn timestamp_datetime(&self) -> Option<NaiveDateTime> {
        self.ts.and_then(datenum_to_datetime)
    }

    pub fn config(&self) -> Option<&MatValue> {
        self.config.as_ref()
    }

    /// Scan points of the first control PV, 0 when none is declared.
    pub fn iterations(&self) -> usize {
        self.ctrl
            .as_ref()
            .and_then(|pvs| pvs.first())
            .map_or(0, |pv| pv.vals.len())
    }

    /// Samples per iteration in the beam table.
    pub fn samples(&self) -> Option<usize> {
        self.beam.as_ref().map(BeamTable::samples)
    }

    pub fn beam_names(&self) -> Option<&[String]> {
        self.beam.as_ref().map(BeamTable::names)
    }

    fn sole_ctrl(&self) -> Option<&ControlPv> {
        match self.ctrl.as_deref() {
            Some([pv]) => Some(pv),
            _ => None,
        }
    }

    /// Name of the scanned PV, when exactly one control PV is declared.
    pub fn ctrl_pv(&self) -> Option<&str> {
        self.sole_ctrl().map(|pv| pv.name.as_str())
    }

    /// Commanded values, when exactly one control PV is declared.
    pub fn ctrl_vals(&self) -> Option<&[f64]> {
        self.sole_ctrl().map(|pv| pv.vals.as_slice())
    }
}

/// One fit result of an emittance scan, with the standard deviation of its
/// `stats` channel taken from `beamStd`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmitFitResult {
    pub fit: FitResult,
    pub stats_std: NumericArray,
}

/// Emittance-scan beam measurements indexed `[iteration][fit]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmitBeamTable {
    names: Vec<String>,
    iterations: Vec<Vec<EmitFitResult>>,
}

impl EmitBeamTable {
    pub(crate) fn new(names: Vec<String>, iterations: Vec<Vec<EmitFitResult>>) -> Self {
        EmitBeamTable { names, iterations }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iterations(&self) -> usize {
        self.iterations.len()
    }

    pub fn fits(&self) -> usize {
        self.iterations.first().map_or(0, Vec::len)
    }

    pub fn iteration(&self, iteration: usize) -> Option<&[EmitFitResult]> {
        self.iterations.get(iteration).map(Vec::as_slice)
    }

    pub fn fit(&self, iteration: usize, model: FitModel) -> Option<&EmitFitResult> {
        self.iteration(iteration)?.get(model.index())
    }
}

/// The eight `twissPV` entries, in stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TwissParam {
    EmitX,
    BetaX,
    AlphaX,
    BmagX,
    EmitY,
    BetaY,
    AlphaY,
    BmagY,
}

impl TwissParam {
    pub const ALL: [TwissParam; 8] = [
        TwissParam::EmitX,
        TwissParam::BetaX,
        TwissParam::AlphaX,
        TwissParam::BmagX,
        TwissParam::EmitY,
        TwissParam::BetaY,
        TwissParam::AlphaY,
        TwissParam::BmagY,
    ];
}

#[derive(Debug, Clone, Serialize)]
pub struct TwissPv {
    pub name: String,
    /// One value per fit model.
    pub vals: Vec<f64>,
    pub extra: BTreeMap<String, MatValue>,
}

impl PartialEq for TwissPv {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && same_bits(&self.vals, &other.vals) && self.extra == other.extra
    }
}

/// A decoded emittance (quadrupole or solenoid) scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmitScanRecord {
    pub(crate) source: Option<PathBuf>,
    pub(crate) fields: Vec<String>,
    pub(crate) status: Option<Vec<i64>>,
    pub(crate) scan_type: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) quad_name: Option<String>,
    pub(crate) quad_vals: Option<Vec<f64>>,
    pub(crate) use_flags: Option<Vec<i64>>,
    pub(crate) ts: Option<f64>,
    pub(crate) beam: Option<EmitBeamTable>,
    pub(crate) charge: Option<f64>,
    pub(crate) charge_std: Option<f64>,
    pub(crate) r_matrix: Option<MatValue>,
    pub(crate) twiss_0: Option<MatValue>,
    pub(crate) energy: Option<f64>,
    pub(crate) twiss: Option<MatValue>,
    pub(crate) twiss_std: Option<MatValue>,
    pub(crate) orbit: Option<MatValue>,
    pub(crate) orbit_std: Option<MatValue>,
    pub(crate) twiss_pv: Option<Vec<TwissPv>>,
}

impl EmitScanRecord {
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn status(&self) -> Option<&[i64]> {
        self.status.as_deref()
    }

    pub fn scan_type(&self) -> Option<&str> {
        self.scan_type.as_deref()
    }

    /// Profile monitor or wire scanner used for the measurement.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Magnet scanned for the measurement.
    pub fn quad_name(&self) -> Option<&str> {
        self.quad_name.as_deref()
    }

    pub fn quad_vals(&self) -> Option<&[f64]> {
        self.quad_vals.as_deref()
    }

    pub fn iterations(&self) -> usize {
        self.quad_vals.as_ref().map_or(0, Vec::len)
    }

    /// 1 where an iteration was used in the emittance calculation.
    pub fn use_flags(&self) -> Option<&[i64]> {
        self.use_flags.as_deref()
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.ts
    }

    pub fn timestamp_datetime(&self) -> Option<NaiveDateTime> {
        self.ts.and_then(datenum_to_datetime)
    }

    pub fn beam(&self) -> Option<&EmitBeamTable> {
        self.beam.as_ref()
    }

    pub fn charge(&self) -> Option<f64> {
        self.charge
    }

    pub fn charge_std(&self) -> Option<f64> {
        self.charge_std
    }

    /// Transfer matrices, one per iteration, as stored.
    pub fn r_matrix(&self) -> Option<&MatValue> {
        self.r_matrix.as_ref()
    }

    pub fn twiss_0(&self) -> Option<&MatValue> {
        self.twiss_0.as_ref()
    }

    pub fn energy(&self) -> Option<f64> {
        self.energy
    }

    pub fn twiss(&self) -> Option<&MatValue> {
        self.twiss.as_ref()
    }

    pub fn twiss_std(&self) -> Option<&MatValue> {
        self.twiss_std.as_ref()
    }

    pub fn orbit(&self) -> Option<&MatValue> {
        self.orbit.as_ref()
    }

    pub fn orbit_std(&self) -> Option<&MatValue> {
        self.orbit_std.as_ref()
    }

    pub fn twiss_pvs(&self) -> Option<&[TwissPv]> {
        self.twiss_pv.as_deref()
    }

    /// Values of one twiss parameter keyed by fit model.
    pub fn twiss_param(&self, param: TwissParam) -> Option<BTreeMap<FitModel, f64>> {
        let pv = self.twiss_pv.as_ref()?.get(param as usize)?;
        Some(FitModel::ALL.into_iter().zip(pv.vals.iter().copied()).collect())
    }

    pub fn emit_x(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::EmitX)
    }

    pub fn beta_x(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::BetaX)
    }

    pub fn alpha_x(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::AlphaX)
    }

    pub fn bmag_x(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::BmagX)
    }

    pub fn emit_y(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::EmitY)
    }

    pub fn beta_y(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::BetaY)
    }

    pub fn alpha_y(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::AlphaY)
    }

    pub fn bmag_y(&self) -> Option<BTreeMap<FitModel, f64>> {
        self.twiss_param(TwissParam::BmagY)
    }
}

/// A decoded profile-monitor image.
///
/// The image is stored `[rows, columns]` as grabbed by the camera, which for
/// a cropped grab is `[roi_y_n, roi_x_n]` rather than the full sensor size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatImage {
    pub(crate) source: Option<PathBuf>,
    pub(crate) fields: Vec<String>,
    pub(crate) camera_name: Option<String>,
    pub(crate) image: Option<NumericArray>,
    pub(crate) roi_x_n: Option<i64>,
    pub(crate) roi_y_n: Option<i64>,
    pub(crate) ts: Option<f64>,
    pub(crate) pulse_id: Option<i64>,
    pub(crate) columns: Option<i64>,
    pub(crate) rows: Option<i64>,
    pub(crate) bit_depth: Option<i64>,
    pub(crate) resolution: Option<f64>,
    pub(crate) roi_x: Option<i64>,
    pub(crate) roi_y: Option<i64>,
    pub(crate) orientation_x: Option<i64>,
    pub(crate) orientation_y: Option<i64>,
    pub(crate) center_x: Option<f64>,
    pub(crate) center_y: Option<f64>,
    pub(crate) filter_status: Option<Vec<i64>>,
    pub(crate) filter_od: Option<Vec<f64>>,
    pub(crate) image_attn: Option<f64>,
    pub(crate) is_raw: Option<bool>,
    pub(crate) background: Option<MatValue>,
}

impl MatImage {
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn camera_name(&self) -> Option<&str> {
        self.camera_name.as_deref()
    }

    pub fn image(&self) -> Option<&NumericArray> {
        self.image.as_ref()
    }

    /// The image as a list of pixel rows.
    pub fn image_rows(&self) -> Option<Vec<Vec<f64>>> {
        let image = self.image.as_ref()?;
        let rows = image.dims.first().copied().unwrap_or(0);
        let cols = image.dims.get(1).copied().unwrap_or(1);
        Some(
            (0..rows)
                .map(|r| (0..cols).map(|c| image.real[r + rows * c]).collect())
                .collect(),
        )
    }

    pub fn roi_x_n(&self) -> Option<i64> {
        self.roi_x_n
    }

    pub fn roi_y_n(&self) -> Option<i64> {
        self.roi_y_n
    }

    /// Acquisition time as a MATLAB datenum.
    pub fn timestamp(&self) -> Option<f64> {
        self.ts
    }

    pub fn timestamp_datetime(&self) -> Option<NaiveDateTime> {
        self.ts.and_then(datenum_to_datetime)
    }

    pub fn pulse_id(&self) -> Option<i64> {
        self.pulse_id
    }

    pub fn columns(&self) -> Option<i64> {
        self.columns
    }

    pub fn rows(&self) -> Option<i64> {
        self.rows
    }

    pub fn bit_depth(&self) -> Option<i64> {
        self.bit_depth
    }

    /// Pixel size in microns.
    pub fn resolution(&self) -> Option<f64> {
        self.resolution
    }

    pub fn roi_x(&self) -> Option<i64> {
        self.roi_x
    }

    pub fn roi_y(&self) -> Option<i64> {
        self.roi_y
    }

    pub fn orientation_x(&self) -> Option<i64> {
        self.orientation_x
    }

    pub fn orientation_y(&self) -> Option<i64> {
        self.orientation_y
    }

    pub fn center_x(&self) -> Option<f64> {
        self.center_x
    }

    pub fn center_y(&self) -> Option<f64> {
        self.center_y
    }

    pub fn filter_status(&self) -> Option<&[i64]> {
        self.filter_status.as_deref()
    }

    pub fn filter_od(&self) -> Option<&[f64]> {
        self.filter_od.as_deref()
    }

    pub fn image_attn(&self) -> Option<f64> {
        self.image_attn
    }

    pub fn is_raw(&self) -> Option<bool> {
        self.is_raw
    }

    /// Background image, or `0` when none was subtracted.
    pub fn background(&self) -> Option<&MatValue> {
        self.background.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_model_order() {
        assert_eq!(FitModel::from_index(0), Some(FitModel::Gaussian));
        assert_eq!(FitModel::from_index(6), Some(FitModel::RmsFloor));
        assert_eq!(FitModel::from_index(7), None);
        assert_eq!(FitModel::RmsCutArea.index(), 5);
        assert_eq!(FitModel::RmsCutPeak.to_string(), "RMS cut peak");
    }

    #[test]
    fn test_datenum_conversion() {
        let epoch = datenum_to_datetime(UNIX_EPOCH_DATENUM).unwrap();
        assert_eq!(epoch.to_string(), "1970-01-01 00:00:00");

        let noon = datenum_to_datetime(737_730.5).unwrap();
        assert_eq!(noon.to_string(), "2019-11-01 12:00:00");
        assert_eq!(datenum_to_datetime(f64::NAN), None);
    }
}
