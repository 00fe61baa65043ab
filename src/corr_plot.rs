//! Correlation-plot scans.
//!
//! The record is a 1x1 struct whose declared fields vary from file to file:
//!
//! | field         | layout                                               |
//! |---------------|------------------------------------------------------|
//! | `accelerator` | char                                                 |
//! | `status`      | numeric, one code per iteration                      |
//! | `ctrlPV`      | struct `[pv, iteration]` of name/val/ts/desc/egu      |
//! | `readPV`      | struct `[pv, iteration, sample]`, same fields         |
//! | `beam`        | struct `[iteration, sample, fit]`, fields are channels |
//! | `profPV`      | struct `[pv, iteration]` or `[pv, iteration, sample]`  |
//! | `ts`          | numeric datenum                                      |
//! | `config`      | anything, kept as stored                             |

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use log::debug;

use crate::config::UnpackOptions;
use crate::error::UnpackError;
use crate::fields::{
    integers, member, name_text, numeric, reading, scalar, split_2d, split_3d, structs, text,
    Record,
};
use crate::mat::{MatFile, MatValue, StructArray};
use crate::models::{
    BeamTable, ControlPv, FitModel, FitResult, ProfilePv, PvReading, ReadbackPv, SampleShape,
    ScanRecord,
};

pub const ACCELERATOR: &str = "accelerator";
pub const STATUS: &str = "status";
pub const CTRL_PV: &str = "ctrlPV";
pub const READ_PV: &str = "readPV";
pub const BEAM: &str = "beam";
pub const PROF_PV: &str = "profPV";
pub const TS: &str = "ts";
pub const CONFIG: &str = "config";

const KNOWN_FIELDS: [&str; 8] = [ACCELERATOR, STATUS, CTRL_PV, READ_PV, BEAM, PROF_PV, TS, CONFIG];

impl ScanRecord {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, UnpackError> {
        ScanRecord::open_with(path, &UnpackOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let path = path.as_ref();
        let mat = MatFile::open(path)
            .map_err(|e| UnpackError::unreadable(path.display().to_string(), e))?;
        let mut record = ScanRecord::from_mat(&mat, opts)?;
        record.source = Some(path.to_path_buf());
        Ok(record)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnpackError> {
        ScanRecord::from_bytes_with(bytes, &UnpackOptions::default())
    }

    pub fn from_bytes_with(bytes: &[u8], opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let mat = MatFile::parse(bytes).map_err(|e| UnpackError::unreadable("<buffer>", e))?;
        ScanRecord::from_mat(&mat, opts)
    }

    pub fn from_mat(mat: &MatFile, opts: &UnpackOptions) -> Result<Self, UnpackError> {
        let record = Record::from_mat(mat, opts)?;
        record.log_unknown(&KNOWN_FIELDS);

        let accelerator = record
            .field(ACCELERATOR)
            .map(|v| text(v, ACCELERATOR))
            .transpose()?;
        let status = record.field(STATUS).map(|v| integers(v, STATUS)).transpose()?;
        let ctrl = record
            .field(CTRL_PV)
            .map(|v| unpack_ctrl(v, opts))
            .transpose()?;
        let read = record
            .field(READ_PV)
            .map(|v| unpack_read(v, opts))
            .transpose()?;
        let beam = record.field(BEAM).map(unpack_beam).transpose()?;
        let prof = record
            .field(PROF_PV)
            .map(|v| unpack_prof(v, opts))
            .transpose()?;
        let ts = record.field(TS).map(|v| scalar(v, TS)).transpose()?;
        let config = record.field(CONFIG).cloned();

        if let (Some(beam), Some(pv)) = (&beam, ctrl.as_ref().and_then(|c| c.first())) {
            if beam.iterations() != pv.vals.len() {
                return Err(UnpackError::malformed(
                    BEAM,
                    format!(
                        "{} iterations but control PV '{}' has {} points",
                        beam.iterations(),
                        pv.name,
                        pv.vals.len()
                    ),
                ));
            }
        }

        debug!(
            "unpacked correlation plot: {} fields, {} control PVs",
            record.field_names().len(),
            ctrl.as_ref().map_or(0, Vec::len)
        );

        Ok(ScanRecord {
            source: None,
            fields: record.field_names(),
            accelerator,
            status,
            ctrl,
            read,
            beam,
            prof,
            ts,
            config,
        })
    }
}

/// Name, description and units of the PV whose first element is `element`.
fn describe(
    s: &StructArray,
    element: usize,
    path: &str,
) -> Result<(String, String, String), UnpackError> {
    let field = |name: &str| -> Result<String, UnpackError> {
        let path = format!("{path}.{name}");
        text(member(s, element, name, &path)?, &path)
    };
    Ok((field("name")?, field("desc")?, field("egu")?))
}

fn val_and_ts(
    s: &StructArray,
    element: usize,
    path: &str,
    opts: &UnpackOptions,
) -> Result<(f64, f64), UnpackError> {
    let val_path = format!("{path}.val");
    let ts_path = format!("{path}.ts");
    Ok((
        reading(member(s, element, "val", &val_path)?, &val_path, opts)?,
        reading(member(s, element, "ts", &ts_path)?, &ts_path, opts)?,
    ))
}

fn unpack_ctrl(value: &MatValue, opts: &UnpackOptions) -> Result<Vec<ControlPv>, UnpackError> {
    let pvs = structs(value, CTRL_PV)?;
    let (n_pv, n_points) = split_2d(pvs);
    if n_points == 0 {
        return Ok(Vec::new());
    }

    let mut ctrl = Vec::with_capacity(n_pv);
    for p in 0..n_pv {
        let (name, desc, egu) = describe(pvs, p, &format!("{CTRL_PV}[{p}]"))?;
        let mut vals = Vec::with_capacity(n_points);
        let mut times = Vec::with_capacity(n_points);
        for j in 0..n_points {
            let element = pvs.linear_index(&[p, j]);
            let (val, ts) = val_and_ts(pvs, element, &format!("{CTRL_PV}[{p},{j}]"), opts)?;
            vals.push(val);
            times.push(ts);
        }
        ctrl.push(ControlPv {
            name,
            desc,
            egu,
            vals,
            times,
        });
    }
    Ok(ctrl)
}

fn unpack_read(value: &MatValue, opts: &UnpackOptions) -> Result<Vec<ReadbackPv>, UnpackError> {
    let pvs = structs(value, READ_PV)?;
    let (n_pv, n_iter, n_samples) = split_3d(pvs);
    if n_samples == 0 {
        return Ok(Vec::new());
    }

    let mut read = Vec::with_capacity(n_pv);
    for p in 0..n_pv {
        let (name, desc, egu) = describe(pvs, p, &format!("{READ_PV}[{p}]"))?;
        let mut vals = Vec::with_capacity(n_iter);
        let mut times = Vec::with_capacity(n_iter);
        for i in 0..n_iter {
            let mut iter_vals = Vec::with_capacity(n_samples);
            let mut iter_times = Vec::with_capacity(n_samples);
            for k in 0..n_samples {
                let element = pvs.linear_index(&[p, i, k]);
                let path = format!("{READ_PV}[{p},{i},{k}]");
                let (val, ts) = val_and_ts(pvs, element, &path, opts)?;
                iter_vals.push(val);
                iter_times.push(ts);
            }
            vals.push(iter_vals);
            times.push(iter_times);
        }
        read.push(ReadbackPv {
            name,
            desc,
            egu,
            vals,
            times,
        });
    }
    Ok(read)
}

fn unpack_beam(value: &MatValue) -> Result<BeamTable, UnpackError> {
    let beam = structs(value, BEAM)?;
    let names = beam.field_names.clone();
    let (n_iter, n_samples, n_fits) = split_3d(beam);
    if n_fits > FitModel::ALL.len() {
        return Err(UnpackError::malformed(
            BEAM,
            format!("{n_fits} fit models, at most {} are defined", FitModel::ALL.len()),
        ));
    }
    debug!("beam table is {n_iter}x{n_samples}x{n_fits} with channels {names:?}");

    let mut iterations = Vec::with_capacity(n_iter);
    for i in 0..n_iter {
        let mut samples = Vec::with_capacity(n_samples);
        for j in 0..n_samples {
            let mut fits = Vec::with_capacity(n_fits);
            for (k, model) in FitModel::ALL.into_iter().take(n_fits).enumerate() {
                let element = beam.linear_index(&[i, j, k]);
                let mut channels = BTreeMap::new();
                for name in &names {
                    let path = format!("{BEAM}[{i},{j},{k}].{name}");
                    let array = numeric(member(beam, element, name, &path)?, &path)?;
                    channels.insert(name.clone(), array.clone());
                }
                fits.push(FitResult { model, channels });
            }
            samples.push(fits);
        }
        iterations.push(samples);
    }
    Ok(BeamTable::new(names, iterations))
}

fn unpack_prof(
    value: &MatValue,
    opts: &UnpackOptions,
) -> Result<BTreeMap<String, ProfilePv>, UnpackError> {
    let pvs = structs(value, PROF_PV)?;
    let (n_pv, n_iter, n_samples) = split_3d(pvs);
    let mut prof = BTreeMap::new();
    if n_samples == 0 {
        return Ok(prof);
    }

    for p in 0..n_pv {
        let path = format!("{PROF_PV}[{p}]");
        let name_path = format!("{path}.name");
        let (name, list_like) = name_text(member(pvs, p, "name", &name_path)?, &name_path)?;
        let field = |field: &str| -> Result<String, UnpackError> {
            let path = format!("{path}.{field}");
            text(member(pvs, p, field, &path)?, &path)
        };
        let (desc, egu) = (field("desc")?, field("egu")?);
        let shape = if n_samples > 1 || list_like {
            SampleShape::Multiple
        } else {
            SampleShape::Single
        };

        let mut readings = Vec::with_capacity(n_iter);
        for i in 0..n_iter {
            let mut samples = Vec::with_capacity(n_samples);
            for k in 0..n_samples {
                let element = pvs.linear_index(&[p, i, k]);
                let path = format!("{PROF_PV}[{p},{i},{k}]");
                let val_path = format!("{path}.val");
                let ts_path = format!("{path}.ts");
                samples.push(PvReading {
                    val: numeric(member(pvs, element, "val", &val_path)?, &val_path)?.clone(),
                    ts: reading(member(pvs, element, "ts", &ts_path)?, &ts_path, opts)?,
                });
            }
            readings.push(samples);
        }

        let pv = ProfilePv {
            name: name.clone(),
            desc,
            egu,
            shape,
            readings,
        };
        match prof.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(pv);
            }
            Entry::Occupied(slot) => {
                return Err(UnpackError::malformed(
                    path,
                    format!("profile PV '{}' is declared twice", slot.key()),
                ))
            }
        }
    }
    Ok(prof)
}
