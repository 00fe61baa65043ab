//! Writes a synthetic solenoid-scan correlation plot for trying out the
//! `scanmat` binary without facility data.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use scanmat::{MatValue, MatWriter, StructArray};

const ITERATIONS: usize = 10;
const SAMPLES: usize = 2;
const FITS: usize = 7;
const PROFILE_POINTS: usize = 64;
const START_DATENUM: f64 = 737_730.05;

const BEAM_NAMES: [&str; 12] = [
    "profx", "xStat", "xStatStd", "profy", "yStat", "yStatStd", "profu", "uStat", "uStatStd",
    "method", "stats", "statsStd",
];

/// Write a synthetic solenoid-scan correlation plot.
#[derive(Parser)]
#[command(about, long_about = None)]
struct Args {
    /// Where to write the MAT-file
    out: PathBuf,

    /// Store variables without zlib compression
    #[clap(long, default_value = "false")]
    uncompressed: bool,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// A 2xN profile: positions in the first row, intensities in the second.
fn profile(sigma: f64) -> MatValue {
    let mut data = Vec::with_capacity(2 * PROFILE_POINTS);
    for i in 0..PROFILE_POINTS {
        let x = i as f64 - PROFILE_POINTS as f64 / 2.0;
        data.push(x);
        data.push(gaussian(x, 0.0, sigma, 1000.0));
    }
    MatValue::Numeric(scanmat::NumericArray::new(vec![2, PROFILE_POINTS], data))
}

fn pv(name: &str, egu: &str, dims: Vec<usize>, val: impl Fn(usize) -> f64) -> StructArray {
    let fields = ["name", "val", "ts", "desc", "egu"].map(String::from).to_vec();
    let mut pvs = StructArray::new(dims, fields);
    for e in 0..pvs.len() {
        pvs.set(e, "name", MatValue::string(name));
        pvs.set(e, "val", MatValue::scalar(val(e)));
        pvs.set(e, "ts", MatValue::scalar(START_DATENUM + e as f64 / 86_400.0));
        pvs.set(e, "desc", MatValue::string(""));
        pvs.set(e, "egu", MatValue::string(egu));
    }
    pvs
}

fn setpoint(j: usize) -> f64 {
    0.073 + 0.001 * j as f64
}

/// Beam size shrinks towards the waist in the middle of the scan.
fn sigma_at(j: usize) -> f64 {
    let offset = j as f64 - ITERATIONS as f64 / 2.0;
    3.0 + 0.4 * offset * offset
}

fn beam() -> StructArray {
    let names = BEAM_NAMES.map(String::from).to_vec();
    let mut beam = StructArray::new(vec![ITERATIONS, SAMPLES, FITS], names);
    for j in 0..ITERATIONS {
        for s in 0..SAMPLES {
            for k in 0..FITS {
                let e = beam.linear_index(&[j, s, k]);
                let sigma = sigma_at(j) * (1.0 + 0.02 * s as f64);
                let stat = [1000.0, 0.0, 0.0, sigma, sigma, 0.0];
                for axis in ["x", "y", "u"] {
                    beam.set(e, &format!("prof{axis}"), profile(sigma));
                    beam.set(e, &format!("{axis}Stat"), MatValue::row(&stat[..5]));
                    beam.set(e, &format!("{axis}StatStd"), MatValue::row(&[0.0; 5]));
                }
                beam.set(e, "method", MatValue::scalar((k + 1) as f64));
                beam.set(e, "stats", MatValue::row(&stat));
                beam.set(e, "statsStd", MatValue::row(&[0.0; 6]));
            }
        }
    }
    beam
}

fn main() -> Result<()> {
    env_logger::init();

    let Args { out, uncompressed } = Args::parse();

    let ctrl = pv("SOLN:GUNB:212:BCTRL", "kG-m", vec![1, ITERATIONS], setpoint);
    let prof = pv("YAGS:GUNB:753:XRMS", "um", vec![1, ITERATIONS, SAMPLES], |e| {
        sigma_at(e % ITERATIONS)
    });
    let config = StructArray::scalar([
        ("settlePVTime", MatValue::scalar(1.0)),
        ("acquireSampleNum", MatValue::scalar(SAMPLES as f64)),
        ("ctrlPVName", MatValue::string("SOLN:GUNB:212:BCTRL")),
    ]);

    let data = StructArray::scalar([
        ("accelerator", MatValue::string("LCLS2")),
        ("status", MatValue::column(&[1.0; ITERATIONS])),
        ("ctrlPV", MatValue::Struct(ctrl)),
        ("beam", MatValue::Struct(beam())),
        ("profPV", MatValue::Struct(prof)),
        ("ts", MatValue::scalar(START_DATENUM)),
        ("config", MatValue::Struct(config)),
    ]);

    MatWriter::new()
        .compressed(!uncompressed)
        .variable("data", MatValue::Struct(data))
        .write_to(&out)
        .with_context(|| format!("writing {}", out.display()))?;

    info!("wrote {} iterations x {} samples", ITERATIONS, SAMPLES);
    println!("Wrote {}", out.display());
    Ok(())
}
