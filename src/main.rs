use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use infra_calib::calibration::{CalibrationConfig, FrameSetOutcome, InfrastructureCalibration};
use infra_calib::camera::CameraPtr;
use infra_calib::io::rig_dataset::RigDataset;

const USAGE: &str = "usage: infra_calib <dataset_dir> <map_dir> [--config FILE] [--output FILE] \
                     [--save-frame-sets FILE] [--load-frame-sets FILE]";

struct Args {
    dataset: PathBuf,
    map: PathBuf,
    config: Option<PathBuf>,
    output: PathBuf,
    save_frame_sets: Option<PathBuf>,
    load_frame_sets: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut config = None;
    let mut output = PathBuf::from("extrinsics.yaml");
    let mut save_frame_sets = None;
    let mut load_frame_sets = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .map(PathBuf::from)
                .with_context(|| format!("{} needs a value\n{}", flag, USAGE))
        };
        match arg.as_str() {
            "--config" => config = Some(value("--config")?),
            "--output" => output = value("--output")?,
            "--save-frame-sets" => save_frame_sets = Some(value("--save-frame-sets")?),
            "--load-frame-sets" => load_frame_sets = Some(value("--load-frame-sets")?),
            _ if arg.starts_with("--") => bail!("unknown option {}\n{}", arg, USAGE),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let (Some(dataset), Some(map)) = (positional.next(), positional.next()) else {
        bail!(USAGE);
    };

    Ok(Args {
        dataset,
        map,
        config,
        output,
        save_frame_sets,
        load_frame_sets,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => CalibrationConfig::from_yaml_file(path)?,
        None => CalibrationConfig::default(),
    };

    info!("Loading rig dataset from {}", args.dataset.display());
    let dataset = RigDataset::new(&args.dataset)?;
    info!(
        "Loaded {} cameras, {} image sets, {} odometry samples",
        dataset.camera_count(),
        dataset.len(),
        dataset.odometry.len()
    );

    let cameras: Vec<CameraPtr> = dataset
        .cameras
        .iter()
        .map(|c| Arc::new(*c) as CameraPtr)
        .collect();
    let mut calib = InfrastructureCalibration::new(cameras, config)?;
    calib.load_map(&args.map)?;

    if let Some(path) = &args.load_frame_sets {
        calib.load_frame_sets(path)?;
        for odo in &dataset.odometry {
            calib.add_odometry(odo.x, odo.y, odo.yaw, odo.timestamp_ns);
        }
    } else {
        let mut fed_odometry = 0;
        let mut accepted = 0;
        for i in 0..dataset.len() {
            let set = dataset.image_set(i)?;

            let odometry = dataset.odometry_until(set.timestamp_ns);
            for odo in &odometry[fed_odometry..] {
                calib.add_odometry(odo.x, odo.y, odo.yaw, odo.timestamp_ns);
            }
            fed_odometry = odometry.len();

            match calib.add_frame_set(&set.images, set.timestamp_ns)? {
                FrameSetOutcome::Accepted { cameras, .. } => {
                    accepted += 1;
                    info!(
                        "Image set {} (ts={}): accepted with cameras {:?}",
                        i, set.timestamp_ns, cameras
                    );
                }
                FrameSetOutcome::InputMismatch { expected, got } => {
                    warn!("Image set {}: expected {} images, got {}", i, expected, got);
                }
                _ => {}
            }
        }
        info!("Accepted {} of {} image sets", accepted, dataset.len());

        if let Some(path) = &args.save_frame_sets {
            calib.save_frame_sets(path)?;
        }
    }

    let summary = calib.run()?;
    info!(
        "Initialized from frame set {} (avg {:.3} px)",
        summary.initialization.best().frame_set_index,
        summary.initialization.best().error.avg
    );
    info!(
        "Reprojection error: {:.3} px -> {:.3} px over {} features",
        summary.before.avg, summary.after.avg, summary.after.count
    );

    for (camera, pose) in calib.extrinsics().poses().iter().enumerate() {
        let t = pose.translation;
        let (roll, pitch, yaw) = pose.rotation.euler_angles();
        info!(
            "Camera {}: t = [{:.4}, {:.4}, {:.4}], rpy = [{:.4}, {:.4}, {:.4}]",
            camera, t.x, t.y, t.z, roll, pitch, yaw
        );
    }

    calib
        .extrinsics()
        .write_yaml(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Wrote extrinsics to {}", args.output.display());

    Ok(())
}
