mod common;

use common::to_bytes;
use scanmat::{
    load_scan, EmitScanRecord, ErrorKind, FitModel, MatValue, RecordKind, Scan, StructArray,
    TwissParam, UnpackOptions,
};

const ITERS: usize = 10;
const TWISS: [[f64; 7]; 8] = [
    [2.28, 2.3, 2.1, 2.5, 2.4, 2.4, 2.6],
    [96.1, 95.0, 97.0, 99.0, 98.0, 98.0, 99.5],
    [-66.5, -66.0, -67.0, -68.0, -67.5, -67.5, -69.0],
    [1207.3, 1200.0, 1210.0, 1220.0, 1215.0, 1215.0, 1230.0],
    [2.63, 2.6, 2.5, 2.9, 2.8, 2.8, 3.0],
    [136.9, 135.0, 137.0, 139.0, 138.0, 138.0, 140.0],
    [-94.6, -94.0, -95.0, -96.0, -95.5, -95.5, -97.0],
    [1716.6, 1710.0, 1720.0, 1730.0, 1725.0, 1725.0, 1740.0],
];

fn beam(stat_scale: f64) -> StructArray {
    let names = ["profx", "xStat", "stats"].map(String::from).to_vec();
    let mut beam = StructArray::new(vec![ITERS, 7], names);
    for e in 0..beam.len() {
        beam.set(e, "profx", MatValue::row(&[0.0, 1.0, 0.0]));
        beam.set(e, "xStat", MatValue::row(&[e as f64; 5]));
        beam.set(e, "stats", MatValue::row(&[stat_scale * e as f64; 6]));
    }
    beam
}

fn twiss_pv() -> StructArray {
    let fields = ["name", "val", "egu"].map(String::from).to_vec();
    let mut pvs = StructArray::new(vec![8, 1], fields);
    for (e, vals) in TWISS.iter().enumerate() {
        pvs.set(e, "name", MatValue::string(&format!("WIRE:IN20:561:TWISS{e}")));
        pvs.set(e, "val", MatValue::row(vals));
        pvs.set(e, "egu", MatValue::string("um"));
    }
    pvs
}

fn emit_scan() -> StructArray {
    let quad_vals: Vec<f64> = (0..ITERS).map(|j| 0.071 + 0.001 * j as f64).collect();
    StructArray::scalar([
        ("status", MatValue::column(&[1.0; ITERS])),
        ("type", MatValue::string("scan")),
        (
            "name",
            MatValue::cell(vec![1, 1], vec![MatValue::string("YAGS:GUNB:753")]),
        ),
        ("quadName", MatValue::string("SOLN:GUNB:212")),
        ("quadVal", MatValue::row(&quad_vals)),
        ("use", MatValue::column(&[1.0; ITERS])),
        ("ts", MatValue::scalar(737_730.2)),
        ("beam", MatValue::Struct(beam(1.0))),
        ("beamStd", MatValue::Struct(beam(0.5))),
        ("charge", MatValue::scalar(0.00071)),
        ("chargeStd", MatValue::scalar(0.00001)),
        (
            "rMatrix",
            MatValue::cell(vec![1, ITERS], vec![MatValue::row(&[1.0, 0.0, 0.0, 1.0]); ITERS]),
        ),
        ("energy", MatValue::scalar(0.00081)),
        ("twissPV", MatValue::Struct(twiss_pv())),
    ])
}

fn round(v: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (v * scale).round() / scale
}

#[test]
fn test_emit_scan_fields() {
    let scan = EmitScanRecord::from_bytes(&to_bytes(emit_scan())).unwrap();

    assert_eq!(scan.status().unwrap().len(), ITERS);
    assert_eq!(scan.scan_type(), Some("scan"));
    assert_eq!(scan.name(), Some("YAGS:GUNB:753"));
    assert_eq!(scan.quad_name(), Some("SOLN:GUNB:212"));
    assert_eq!(round(scan.quad_vals().unwrap()[9], 2), 0.08);
    assert_eq!(scan.use_flags().unwrap().len(), ITERS);
    assert_eq!(scan.timestamp().unwrap().round(), 737_730.0);
    assert_eq!(round(scan.charge().unwrap(), 4), 0.0007);
    assert_eq!(round(scan.energy().unwrap(), 4), 0.0008);
    assert_eq!(scan.iterations(), ITERS);
    assert!(scan.twiss().is_none());
    assert_eq!(scan.r_matrix().unwrap().dims(), &[1, ITERS]);
}

#[test]
fn test_emit_twiss_accessors() {
    let scan = EmitScanRecord::from_bytes(&to_bytes(emit_scan())).unwrap();
    let g = FitModel::Gaussian;

    assert_eq!(round(scan.emit_x().unwrap()[&g], 2), 2.28);
    assert_eq!(round(scan.beta_x().unwrap()[&g], 1), 96.1);
    assert_eq!(round(scan.alpha_x().unwrap()[&g], 1), -66.5);
    assert_eq!(round(scan.bmag_x().unwrap()[&g], 1), 1207.3);
    assert_eq!(round(scan.emit_y().unwrap()[&g], 2), 2.63);
    assert_eq!(round(scan.beta_y().unwrap()[&g], 1), 136.9);
    assert_eq!(round(scan.alpha_y().unwrap()[&g], 1), -94.6);
    assert_eq!(round(scan.bmag_y().unwrap()[&g], 1), 1716.6);

    let rms_floor = scan.twiss_param(TwissParam::EmitY).unwrap()[&FitModel::RmsFloor];
    assert_eq!(rms_floor, 3.0);
    assert_eq!(scan.emit_x().unwrap().len(), 7);
}

#[test]
fn test_emit_beam_with_std() {
    let scan = EmitScanRecord::from_bytes(&to_bytes(emit_scan())).unwrap();
    let beam = scan.beam().unwrap();
    assert_eq!(beam.iterations(), ITERS);
    assert_eq!(beam.fits(), 7);
    assert_eq!(beam.names(), ["profx", "xStat", "stats"].map(String::from));

    // (iteration 3, RMS) sits at linear index 3 + 10 * 3.
    let fit = beam.fit(3, FitModel::Rms).unwrap();
    assert_eq!(fit.fit.get("xStat").unwrap().real, vec![33.0; 5]);
    assert_eq!(fit.stats_std.real, vec![16.5; 6]);
}

#[test]
fn test_quad_vals_disagree_with_beam() {
    let mut data = emit_scan();
    data.set(0, "quadVal", MatValue::row(&[0.07, 0.08]));
    let err = EmitScanRecord::from_bytes(&to_bytes(data)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedRecord);
}

#[test]
fn test_probe_selects_emit_unpacker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Emittance-scan.mat");
    std::fs::write(&path, to_bytes(emit_scan())).unwrap();

    let mat = scanmat::MatFile::open(&path).unwrap();
    assert_eq!(
        RecordKind::probe(&mat, &UnpackOptions::default()),
        RecordKind::EmittanceScan
    );
    match load_scan(&path, &UnpackOptions::default()).unwrap() {
        Scan::EmittanceScan(scan) => {
            assert_eq!(scan.source(), Some(path.as_path()));
            assert_eq!(scan.iterations(), ITERS);
        }
        other => panic!("probed as {other:?}"),
    }
}
