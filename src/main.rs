use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use stagemap::calibration::{Calibration, CalibrationRegistry};
use stagemap::capture::{self, worker, CaptureUnit};
use stagemap::{Result, Settings};

/// Frames to stitch, with image paths relative to the manifest
#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    frames: Vec<ManifestFrame>,
}

#[derive(Debug, Deserialize)]
struct ManifestFrame {
    #[serde(default)]
    timestamp: Option<String>,
    x: f64,
    y: f64,
    z: f64,
    image: PathBuf,
}

fn usage() -> String {
    "usage:\n  \
     stagemap [--config SETTINGS.json] list [DIR]\n  \
     stagemap [--config SETTINGS.json] stitch CALIBRATION.json MANIFEST.json OUT.png [--low-res]\n  \
     stagemap dummy OUT.json"
        .to_string()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(env::args().skip(1).collect()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(mut args: Vec<String>) -> std::result::Result<(), String> {
    let settings = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).cloned().ok_or_else(usage)?;
            args.remove(i);
            args.remove(i);
            let settings = Settings::load(Path::new(&path)).map_err(|e| e.to_string())?;
            settings.apply().map_err(|e| e.to_string())?;
            settings
        }
        None => Settings::default(),
    };

    let low_res = match args.iter().position(|a| a == "--low-res") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };

    match args.first().map(String::as_str) {
        Some("list") => {
            let dir = args
                .get(1)
                .map(PathBuf::from)
                .unwrap_or_else(|| settings.calibration_dir.clone());
            list(&dir).map_err(|e| e.to_string())
        }
        Some("stitch") if args.len() == 4 => stitch(
            Path::new(&args[1]),
            Path::new(&args[2]),
            Path::new(&args[3]),
            low_res,
        )
        .map_err(|e| e.to_string()),
        Some("dummy") if args.len() == 2 => dummy(Path::new(&args[1])).map_err(|e| e.to_string()),
        _ => Err(usage()),
    }
}

fn list(dir: &Path) -> Result<()> {
    let registry = CalibrationRegistry::from_dir(dir)?;
    if registry.is_empty() {
        println!("No calibrations in {}", dir.display());
    }
    for calibration in registry.iter() {
        println!("{}", calibration.summary());
    }
    Ok(())
}

fn stitch(calibration_path: &Path, manifest_path: &Path, out: &Path, low_res: bool) -> Result<()> {
    let calibration = Calibration::load_json(calibration_path)?;
    let text = fs::read_to_string(manifest_path)?;
    let manifest: Manifest =
        serde_json::from_str(&text).map_err(|source| stagemap::Error::Parse {
            path: manifest_path.to_path_buf(),
            source,
        })?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut unit = CaptureUnit::new(manifest.name, calibration)?;
    for frame in manifest.frames {
        let image = image::open(base.join(&frame.image))?.into_rgb8();
        let timestamp = frame.timestamp.unwrap_or_else(capture::timestamp_now);
        unit.add_sample(timestamp, frame.x, frame.y, frame.z, image)?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let mosaic = runtime.block_on(worker::stitch_in_background(unit, low_res))?;

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    mosaic.image.save(out)?;

    println!(
        "✅ Mosaic {}x{} written to {}",
        mosaic.image.width(),
        mosaic.image.height(),
        out.display()
    );
    println!("   min: ({:.4}, {:.4}) mm", mosaic.min_mm.x, mosaic.min_mm.y);
    println!("   max: ({:.4}, {:.4}) mm", mosaic.max_mm.x, mosaic.max_mm.y);
    Ok(())
}

/// Write the reference calibration used for testing without hardware
fn dummy(out: &Path) -> Result<()> {
    let mut calibration = Calibration::with_id("dummy");
    calibration.set_params(19.0, 24.0, 0.03, 0.02, 0.02, Some(-1.0))?;
    calibration.save_json(out)?;
    println!("{}", calibration.summary());
    Ok(())
}
