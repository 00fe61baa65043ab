mod common;

use std::collections::BTreeSet;

use common::{beam_struct, full_scan, pv_struct, to_bytes, BEAM_NAMES, CTRL_PV};
use pretty_assertions::assert_eq;
use scanmat::{
    load_scan, ErrorKind, FitModel, MatValue, MatWriter, SampleShape, Scan, ScanRecord,
    StructArray, UnpackOptions,
};

#[test]
fn test_full_scan() {
    let scan = ScanRecord::from_bytes(&to_bytes(full_scan(10, 2))).unwrap();

    assert_eq!(
        scan.fields(),
        ["accelerator", "status", "ctrlPV", "beam", "profPV", "ts", "config"].map(String::from)
    );
    assert_eq!(scan.accelerator(), Some("LCLS2"));
    assert_eq!(scan.ctrl_pv(), Some(CTRL_PV));
    assert_eq!(scan.iterations(), 10);
    assert_eq!(scan.iterations(), scan.ctrl_vals().unwrap().len());
    assert_eq!((scan.ctrl_vals().unwrap()[0] * 1000.0).round() / 1000.0, 0.073);
    assert_eq!(scan.beam_names().unwrap(), BEAM_NAMES.map(String::from));
    assert_eq!(scan.timestamp(), Some(737_730.05));
    assert_eq!(scan.samples(), Some(2));
    assert_eq!(scan.status(), Some(&[1; 10][..]));
    assert!(scan.config().and_then(MatValue::as_struct).is_some());
    assert!(scan.source().is_none());

    let ctrl = &scan.control_pvs().unwrap()[0];
    assert_eq!(ctrl.egu, "kG-m");
    assert_eq!(ctrl.desc, "Solenoid BCTRL");
    assert_eq!(ctrl.vals.len(), ctrl.times.len());
}

#[test]
fn test_beam_table_shape_invariants() {
    let scan = ScanRecord::from_bytes(&to_bytes(full_scan(4, 3))).unwrap();
    let beam = scan.beam().unwrap();
    let names: BTreeSet<&str> = scan.beam_names().unwrap().iter().map(String::as_str).collect();

    assert_eq!(beam.iterations(), 4);
    for iteration in beam.iter() {
        assert_eq!(iteration.len(), scan.samples().unwrap());
        for sample in iteration {
            assert_eq!(sample.len(), FitModel::ALL.len());
            for fit in sample {
                let keys: BTreeSet<&str> = fit.channels.keys().map(String::as_str).collect();
                assert_eq!(keys, names);
            }
        }
    }
}

#[test]
fn test_beam_order_is_preserved() {
    let scan = ScanRecord::from_bytes(&to_bytes(full_scan(4, 3))).unwrap();
    let beam = scan.beam().unwrap();

    let picks = [
        (0, 0, FitModel::Gaussian),
        (3, 2, FitModel::RmsFloor),
        (2, 1, FitModel::Super),
    ];
    for (i, j, model) in picks {
        let fit = beam.fit(i, j, model).unwrap();
        assert_eq!(fit.model, model);
        let tag = (100 * i + 10 * j + model.index()) as f64;
        assert_eq!(fit.get("stats").unwrap().real, vec![tag; 6]);
        let profx = beam.channel(i, j, model, "profx").unwrap();
        assert_eq!(profx.dims, vec![2, 3]);
        assert_eq!(fit.get("method").unwrap().first(), Some((model.index() + 1) as f64));
    }
    assert!(beam.fit(4, 0, FitModel::Gaussian).is_none());
}

#[test]
fn test_decoding_is_idempotent() {
    let bytes = to_bytes(full_scan(5, 2));
    let first = ScanRecord::from_bytes(&bytes).unwrap();
    let second = ScanRecord::from_bytes(&bytes).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_decoding_with_empty_reading_is_idempotent() {
    let mut ctrl = pv_struct(vec![1, 3], CTRL_PV, |e| e as f64);
    ctrl.set(1, "val", MatValue::empty());
    let mut data = full_scan(3, 1);
    data.set(0, "ctrlPV", MatValue::Struct(ctrl));
    let bytes = to_bytes(data);

    let first = ScanRecord::from_bytes(&bytes).unwrap();
    let second = ScanRecord::from_bytes(&bytes).unwrap();
    let vals = first.ctrl_vals().unwrap();
    assert_eq!(vals[0], 0.0);
    assert!(vals[1].is_nan());
    assert_eq!(vals[2], 2.0);
    assert_eq!(first, second);
}

#[test]
fn test_minimal_record() {
    let data = StructArray::scalar([
        ("accelerator", MatValue::string("LCLS2")),
        ("status", MatValue::column(&[1.0, 1.0, 1.0])),
    ]);
    let scan = ScanRecord::from_bytes(&to_bytes(data)).unwrap();

    assert_eq!(scan.accelerator(), Some("LCLS2"));
    assert_eq!(scan.status(), Some(&[1, 1, 1][..]));
    assert!(scan.control_pvs().is_none());
    assert!(scan.readback_pvs().is_none());
    assert!(scan.beam().is_none());
    assert!(scan.profile_pvs().is_none());
    assert!(scan.timestamp().is_none());
    assert!(scan.config().is_none());
    assert_eq!(scan.ctrl_pv(), None);
    assert_eq!(scan.ctrl_vals(), None);
    assert_eq!(scan.beam_names(), None);
    assert_eq!(scan.samples(), None);
    assert_eq!(scan.iterations(), 0);
}

#[test]
fn test_single_iteration_sample_and_fit() {
    // MATLAB drops trailing singleton dimensions, so both layouts occur.
    for dims in [vec![1, 1, 1], vec![1, 1]] {
        let mut beam = beam_struct(1, 1, 1);
        beam.dims = dims;
        let ctrl = pv_struct(vec![1, 1], CTRL_PV, |_| 0.073);
        let data = StructArray::scalar([
            ("ctrlPV", MatValue::Struct(ctrl)),
            ("beam", MatValue::Struct(beam)),
        ]);
        let scan = ScanRecord::from_bytes(&to_bytes(data)).unwrap();
        let beam = scan.beam().unwrap();
        assert_eq!(beam.iterations(), 1);
        assert_eq!(beam.samples(), 1);
        assert_eq!(beam.fits(), 1);
        assert_eq!(beam.fit(0, 0, FitModel::Gaussian).unwrap().channels.len(), BEAM_NAMES.len());
    }
}

#[test]
fn test_qe_scan_without_beam() {
    let ctrl = pv_struct(vec![1, 400], "MIRR:LGUN:820:M3_MOTR_V", |j| 1.93 + 0.01 * j as f64);
    let read = pv_struct(vec![2, 400, 1], "BPMS:GUNB:314:TMIT", |e| e as f64);
    let data = StructArray::scalar([
        ("accelerator", MatValue::string("LCLS2")),
        ("status", MatValue::column(&[1.0; 400])),
        ("ctrlPV", MatValue::Struct(ctrl)),
        ("readPV", MatValue::Struct(read)),
        ("ts", MatValue::scalar(737_728.26)),
    ]);
    let scan = ScanRecord::from_bytes(&to_bytes(data)).unwrap();

    assert_eq!(scan.ctrl_pv(), Some("MIRR:LGUN:820:M3_MOTR_V"));
    assert_eq!(scan.iterations(), 400);
    assert_eq!(scan.beam_names(), None);
    assert_eq!(scan.samples(), None);

    let read = scan.readback_pvs().unwrap();
    assert_eq!(read.len(), 2);
    assert_eq!(read[1].vals.len(), 400);
    assert_eq!(read[1].vals[0], vec![1.0]);
    assert_eq!(read[1].vals[399], vec![799.0]);
}

#[test]
fn test_profile_pv_multiple_samples() {
    let scan = ScanRecord::from_bytes(&to_bytes(full_scan(3, 2))).unwrap();
    let prof = scan.profile_pvs().unwrap();
    let pv = &prof["YAGS:GUNB:753:XRMS"];
    assert_eq!(pv.shape, SampleShape::Multiple);
    assert_eq!(pv.readings.len(), 3);
    // Element (0, i, k) of a [1, 3, 2] array has linear index i + 3k.
    assert_eq!(pv.readings[2][1].val.real, vec![5.0]);
    assert_eq!(pv.readings[2][1].ts, 737_735.0);
}

#[test]
fn test_absent_vs_corrupt_field() {
    let absent = StructArray::scalar([("accelerator", MatValue::string("LCLS"))]);
    assert!(ScanRecord::from_bytes(&to_bytes(absent)).is_ok());

    let corrupt = StructArray::scalar([
        ("accelerator", MatValue::string("LCLS")),
        ("ctrlPV", MatValue::scalar(0.0)),
    ]);
    let err = ScanRecord::from_bytes(&to_bytes(corrupt)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedRecord);
    assert!(err.diagnostic().contains("ctrlPV"));
}

#[test]
fn test_beam_iterations_must_match_control_pv() {
    let mut data = full_scan(4, 1);
    data.set(0, "beam", MatValue::Struct(beam_struct(3, 1, 7)));
    let err = ScanRecord::from_bytes(&to_bytes(data)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedRecord);
    assert!(err.diagnostic().contains("3 iterations"), "{}", err.diagnostic());
}

#[test]
fn test_beam_channel_must_be_numeric() {
    let mut beam = beam_struct(1, 1, 2);
    beam.set(1, "method", MatValue::string("Asymmetric"));
    let data = StructArray::scalar([("beam", MatValue::Struct(beam))]);
    let err = ScanRecord::from_bytes(&to_bytes(data)).unwrap_err();
    assert!(err.diagnostic().contains("beam[0,0,1].method"), "{}", err.diagnostic());
}

#[test]
fn test_junk_input_is_unreadable() {
    for junk in [&b"junk"[..], &[0x5au8; 512][..]] {
        let err = ScanRecord::from_bytes(junk).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadableInput);
        assert!(!err.diagnostic().is_empty());
    }
}

#[test]
fn test_tampered_dimensions_are_unreadable() {
    let bytes = MatWriter::new()
        .compressed(false)
        .variable("data", MatValue::cell(vec![1, 2], vec![MatValue::empty(); 2]))
        .to_bytes()
        .unwrap();
    // Header, matrix tag and array flags precede the dimensions payload.
    let dims_at = 128 + 8 + 16 + 8;
    for (rows, cols) in [(i32::MAX, i32::MAX), (200_000, 200_000)] {
        let mut bad = bytes.clone();
        bad[dims_at..dims_at + 4].copy_from_slice(&rows.to_le_bytes());
        bad[dims_at + 4..dims_at + 8].copy_from_slice(&cols.to_le_bytes());
        let err = ScanRecord::from_bytes(&bad).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadableInput);
        assert!(err.diagnostic().contains("cell"), "{}", err.diagnostic());
    }
}

#[test]
fn test_missing_root_variable() {
    let bytes = MatWriter::new()
        .variable("img", MatValue::scalar(1.0))
        .to_bytes()
        .unwrap();
    let err = ScanRecord::from_bytes(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedRecord);

    let opts = UnpackOptions {
        root_variable: "img".into(),
        ..UnpackOptions::default()
    };
    let err = ScanRecord::from_bytes_with(&bytes, &opts).unwrap_err();
    assert!(err.diagnostic().contains("expected a struct array"));
}

#[test]
fn test_open_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("CorrelationPlot-test.mat");
    std::fs::write(&path, to_bytes(full_scan(10, 2))).unwrap();

    let scan = ScanRecord::open(&path).unwrap();
    assert_eq!(scan.source(), Some(path.as_path()));
    assert_eq!(
        scan.timestamp_datetime().unwrap().date().to_string(),
        "2019-11-01"
    );

    match load_scan(&path, &UnpackOptions::default()).unwrap() {
        Scan::CorrelationPlot(loaded) => assert_eq!(loaded, scan),
        other => panic!("probed as {other:?}"),
    }

    let err = ScanRecord::open(dir.path().join("missing.mat")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnreadableInput);
    assert!(err.diagnostic().contains("missing.mat"));
}

#[test]
fn test_uncompressed_big_endian_file() {
    let bytes = MatWriter::new()
        .compressed(false)
        .endian(scanmat::utils::Endian::Big)
        .variable("data", MatValue::Struct(full_scan(3, 1)))
        .to_bytes()
        .unwrap();
    let scan = ScanRecord::from_bytes(&bytes).unwrap();
    assert_eq!(scan, ScanRecord::from_bytes(&to_bytes(full_scan(3, 1))).unwrap());
    assert_eq!(
        scan.profile_pvs().unwrap()["YAGS:GUNB:753:XRMS"].shape,
        SampleShape::Single
    );
}
