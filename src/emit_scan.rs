//! Emittance scans.
//!
//! Unlike a correlation plot, the beam table of an emittance scan has no
//! sample axis: `beam` is a struct `[iteration, fit]`. `beamStd` mirrors it
//! and contributes the standard deviation of the `stats` channel.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::config::UnpackOptions;
use crate::error::UnpackError;
use crate::fields::{
    integers, member, name_text, numeric, scalar, significant_dims, split_2d, structs, text,
    values, Record,
};
use crate::mat::{MatFile, MatValue, NumericArray};
use crate::models::{EmitBeamTable, EmitFitResult, EmitScanRecord, FitModel, FitResult, TwissPv};

pub const STATUS: &str = "status";
pub const SCAN_TYPE: &str = "type";
pub const NAME: &str = "name";
pub const QUAD_NAME: &str = "quadName";
pub const QUAD_VALS: &str = "quadVal";
pub const USE: &str = "use";
pub const TS: &str = "ts";
pub const BEAM: &str = "beam";
pub const BEAM_STD: &str = "beamStd";
pub const CHARGE: &str = "charge";
pub const CHARGE_STD: &str = "chargeStd";
pub const R_MATRIX: &str = "rMatrix";
pub const TWISS_0: &str = "twiss0";
pub const ENERGY: &str = "energy";
pub const TWISS: &str = "twiss";
pub const TWISS_STD: &str = "twissstd";
pub const ORBIT: &str = "orbit";
pub const ORBIT_STD: &str = "orbitstd";
pub const TWISS_PV: &str = "twissPV";

const STATS: &str = "stats";

const KNOWN_FIELDS: [&str; 19] = [
    STATUS, SCAN_TYPE, NAME, QUAD_NAME, QUAD_VALS, USE, TS, BEAM, BEAM_STD, CHARGE, CHARGE_STD,
    R_MATRIX, TWISS_0, ENERGY, TWISS, TWISS_STD, ORBIT, ORBIT_STD, TWISS_PV,
];

impl EmitScanRecord {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, UnpackError> {
        EmitScanRecord::open_with(path, &UnpackOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let path = path.as_ref();
        let mat = MatFile::open(path)
            .map_err(|e| UnpackError::unreadable(path.display().to_string(), e))?;
        let mut record = EmitScanRecord::from_mat(&mat, opts)?;
        record.source = Some(path.to_path_buf());
        Ok(record)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnpackError> {
        EmitScanRecord::from_bytes_with(bytes, &UnpackOptions::default())
    }

    pub fn from_bytes_with(bytes: &[u8], opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let mat = MatFile::parse(bytes).map_err(|e| UnpackError::unreadable("<buffer>", e))?;
        EmitScanRecord::from_mat(&mat, opts)
    }

    pub fn from_mat(mat: &MatFile, opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let record = Record::from_mat(mat, opts)?;
        record.log_unknown(&KNOWN_FIELDS);

        let text_of = |name: &str| record.field(name).map(|v| text(v, name)).transpose();
        let scalar_of = |name: &str| record.field(name).map(|v| scalar(v, name)).transpose();
        let raw = |name: &str| record.field(name).cloned();

        let beam = record
            .field(BEAM)
            .map(|v| unpack_beam(v, record.field(BEAM_STD)))
            .transpose()?;

        let scan = EmitScanRecord {
            source: None,
            fields: record.field_names(),
            status: record.field(STATUS).map(|v| integers(v, STATUS)).transpose()?,
            scan_type: text_of(SCAN_TYPE)?,
            name: record
                .field(NAME)
                .map(|v| name_text(v, NAME).map(|(name, _)| name))
                .transpose()?,
            quad_name: text_of(QUAD_NAME)?,
            quad_vals: record.field(QUAD_VALS).map(|v| values(v, QUAD_VALS)).transpose()?,
            use_flags: record.field(USE).map(|v| integers(v, USE)).transpose()?,
            ts: scalar_of(TS)?,
            beam,
            charge: scalar_of(CHARGE)?,
            charge_std: scalar_of(CHARGE_STD)?,
            r_matrix: raw(R_MATRIX),
            twiss_0: raw(TWISS_0),
            energy: scalar_of(ENERGY)?,
            twiss: raw(TWISS),
            twiss_std: raw(TWISS_STD),
            orbit: raw(ORBIT),
            orbit_std: raw(ORBIT_STD),
            twiss_pv: record.field(TWISS_PV).map(unpack_twiss_pv).transpose()?,
        };

        if let (Some(beam), Some(vals)) = (&scan.beam, &scan.quad_vals) {
            if beam.iterations() != vals.len() {
                return Err(UnpackError::malformed(
                    BEAM,
                    format!(
                        "{} iterations but {QUAD_VALS} has {} values",
                        beam.iterations(),
                        vals.len()
                    ),
                ));
            }
        }

        debug!(
            "unpacked emittance scan of {} over {} iterations",
            scan.quad_name.as_deref().unwrap_or("<unknown magnet>"),
            scan.iterations()
        );
        Ok(scan)
    }
}

fn unpack_beam(value: &MatValue, std: Option<&MatValue>) -> Result<EmitBeamTable, UnpackError> {
    let beam = structs(value, BEAM)?;
    let std = std.map(|v| structs(v, BEAM_STD)).transpose()?;
    if let Some(std) = std {
        if significant_dims(&std.dims) != significant_dims(&beam.dims) {
            return Err(UnpackError::malformed(
                BEAM_STD,
                format!("dimensions {:?} but {BEAM} has {:?}", std.dims, beam.dims),
            ));
        }
    }

    let names = beam.field_names.clone();
    let (n_iter, n_fits) = split_2d(beam);
    if n_fits > FitModel::ALL.len() {
        return Err(UnpackError::malformed(
            BEAM,
            format!("{n_fits} fit models, at most {} are defined", FitModel::ALL.len()),
        ));
    }

    let mut iterations = Vec::with_capacity(n_iter);
    for i in 0..n_iter {
        let mut fits = Vec::with_capacity(n_fits);
        for (k, model) in FitModel::ALL.into_iter().take(n_fits).enumerate() {
            let element = beam.linear_index(&[i, k]);
            let mut channels = BTreeMap::new();
            for name in &names {
                let path = format!("{BEAM}[{i},{k}].{name}");
                let array = numeric(member(beam, element, name, &path)?, &path)?;
                channels.insert(name.clone(), array.clone());
            }
            let stats_std = match std {
                Some(std) => {
                    let path = format!("{BEAM_STD}[{i},{k}].{STATS}");
                    numeric(member(std, element, STATS, &path)?, &path)?.clone()
                }
                None => NumericArray::empty(),
            };
            fits.push(EmitFitResult {
                fit: FitResult { model, channels },
                stats_std,
            });
        }
        iterations.push(fits);
    }
    Ok(EmitBeamTable::new(names, iterations))
}

fn unpack_twiss_pv(value: &MatValue) -> Result<Vec<TwissPv>, UnpackError> {
    let pvs = structs(value, TWISS_PV)?;
    (0..pvs.len())
        .map(|e| -> Result<TwissPv, UnpackError> {
            let path = format!("{TWISS_PV}[{e}]");
            let name_path = format!("{path}.name");
            let val_path = format!("{path}.val");
            let name = text(member(pvs, e, "name", &name_path)?, &name_path)?;
            let vals = values(member(pvs, e, "val", &val_path)?, &val_path)?;

            let extra = pvs
                .field_names
                .iter()
                .filter(|f| !matches!(f.as_str(), "name" | "val" | "egu"))
                .filter_map(|f| pvs.get(e, f).map(|v| (f.clone(), v.clone())))
                .collect();
            Ok(TwissPv { name, vals, extra })
        })
        .collect()
}
