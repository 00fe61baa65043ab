#![allow(dead_code)]

use scanmat::{MatValue, MatWriter, NumericArray, StructArray};

pub const CTRL_PV: &str = "SOLN:GUNB:212:BCTRL";
pub const BEAM_NAMES: [&str; 4] = ["profx", "xStat", "method", "stats"];

pub fn pv_struct(dims: Vec<usize>, name: &str, val: impl Fn(usize) -> f64) -> StructArray {
    let fields = ["name", "val", "ts", "desc", "egu"].map(String::from).to_vec();
    let mut pvs = StructArray::new(dims, fields);
    for e in 0..pvs.len() {
        pvs.set(e, "name", MatValue::string(name));
        pvs.set(e, "val", MatValue::scalar(val(e)));
        pvs.set(e, "ts", MatValue::scalar(737_730.0 + e as f64));
        pvs.set(e, "desc", MatValue::string("Solenoid BCTRL"));
        pvs.set(e, "egu", MatValue::string("kG-m"));
    }
    pvs
}

/// Beam struct `[iterations, samples, fits]`; each channel encodes its
/// position so tests can check ordering.
pub fn beam_struct(iterations: usize, samples: usize, fits: usize) -> StructArray {
    let names = BEAM_NAMES.map(String::from).to_vec();
    let mut beam = StructArray::new(vec![iterations, samples, fits], names);
    for i in 0..iterations {
        for j in 0..samples {
            for k in 0..fits {
                let e = beam.linear_index(&[i, j, k]);
                let tag = (100 * i + 10 * j + k) as f64;
                let profile = vec![tag, 1.0, tag, 2.0, tag, 1.0];
                beam.set(e, "profx", MatValue::Numeric(NumericArray::new(vec![2, 3], profile)));
                beam.set(e, "xStat", MatValue::row(&[tag, 0.5, 0.1, 2.0, 2.0]));
                beam.set(e, "method", MatValue::scalar((k + 1) as f64));
                beam.set(e, "stats", MatValue::row(&[tag; 6]));
            }
        }
    }
    beam
}

/// A solenoid scan shaped like the facility's test scan.
pub fn full_scan(iterations: usize, samples: usize) -> StructArray {
    let ctrl = pv_struct(vec![1, iterations], CTRL_PV, |j| 0.073 + 0.001 * j as f64);
    let prof = pv_struct(vec![1, iterations, samples], "YAGS:GUNB:753:XRMS", |e| e as f64);
    StructArray::scalar([
        ("accelerator", MatValue::string("LCLS2")),
        ("status", MatValue::column(&vec![1.0; iterations])),
        ("ctrlPV", MatValue::Struct(ctrl)),
        ("beam", MatValue::Struct(beam_struct(iterations, samples, 7))),
        ("profPV", MatValue::Struct(prof)),
        ("ts", MatValue::scalar(737_730.05)),
        (
            "config",
            MatValue::Struct(StructArray::scalar([("settlePVTime", MatValue::scalar(1.0))])),
        ),
    ])
}

pub fn to_bytes(data: StructArray) -> Vec<u8> {
    MatWriter::new()
        .variable("data", MatValue::Struct(data))
        .to_bytes()
        .unwrap()
}
