use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use scanmat::{load_scan, Scan, UnpackOptions};

/// Print a summary of a correlation-plot or emittance-scan MAT-file.
#[derive(Parser)]
#[command(about, long_about = None)]
struct Args {
    /// The MAT-file to read
    path: PathBuf,

    /// Print the decoded record as JSON
    #[clap(long, default_value = "false")]
    json: bool,

    /// A JSON file of unpack options
    #[clap(long)]
    options: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let Args {
        path,
        json,
        options,
    } = Args::parse();

    let opts = match options {
        Some(p) => {
            let text = std::fs::read_to_string(&p)
                .with_context(|| format!("reading {}", p.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => UnpackOptions::default(),
    };

    let scan = load_scan(&path, &opts).map_err(|e| anyhow::anyhow!(e.diagnostic()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scan)?);
        return Ok(());
    }

    match scan {
        Scan::CorrelationPlot(scan) => {
            println!("Correlation plot: {}", path.display());
            println!("  Fields: {}", scan.fields().join(", "));
            println!("  Accelerator: {}", scan.accelerator().unwrap_or("-"));
            println!("  Control PV: {}", scan.ctrl_pv().unwrap_or("-"));
            println!("  Iterations: {}", scan.iterations());
            if let Some(samples) = scan.samples() {
                println!("  Samples: {samples}");
            }
            if let Some(names) = scan.beam_names() {
                println!("  Beam channels: {}", names.join(", "));
            }
            if let Some(prof) = scan.profile_pvs() {
                for (name, pv) in prof {
                    println!("  Profile PV {name}: {:?}", pv.shape);
                }
            }
            if let Some(when) = scan.timestamp_datetime() {
                println!("  Time: {when}");
            }
        }
        Scan::EmittanceScan(scan) => {
            println!("Emittance scan: {}", path.display());
            println!("  Fields: {}", scan.fields().join(", "));
            println!("  Monitor: {}", scan.name().unwrap_or("-"));
            println!("  Magnet: {}", scan.quad_name().unwrap_or("-"));
            println!("  Iterations: {}", scan.iterations());
            if let (Some(emit_x), Some(emit_y)) = (scan.emit_x(), scan.emit_y()) {
                for (model, x) in &emit_x {
                    let y = emit_y.get(model).copied().unwrap_or(f64::NAN);
                    println!("  {:>14}: emit x {x:.3}, emit y {y:.3}", model.label());
                }
            }
            if let Some(when) = scan.timestamp_datetime() {
                println!("  Time: {when}");
            }
        }
        Scan::Image(image) => {
            println!("Profile monitor image: {}", path.display());
            println!("  Fields: {}", image.fields().join(", "));
            println!("  Camera: {}", image.camera_name().unwrap_or("-"));
            if let Some(pixels) = image.image() {
                println!("  Image: {:?}", pixels.dims);
            }
            if let Some(res) = image.resolution() {
                println!("  Resolution: {res} um/px");
            }
            if let Some(pulse_id) = image.pulse_id() {
                println!("  Pulse id: {pulse_id}");
            }
            if let Some(when) = image.timestamp_datetime() {
                println!("  Time: {when}");
            }
        }
    }

    Ok(())
}
