use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use image::GrayImage;
use serde::Deserialize;
use tracing::warn;

use crate::camera::PinholeCamera;

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

/// Planar odometry sample from `odometry.csv`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometryEntry {
    pub timestamp_ns: u64,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// One synchronized capture instant. Cameras without an image at this
/// timestamp are `None`.
#[derive(Debug, Clone)]
pub struct ImageSet {
    pub timestamp_ns: u64,
    pub images: Vec<Option<GrayImage>>,
}

#[derive(Debug, Deserialize)]
struct CamerasYaml {
    cameras: Vec<PinholeCamera>,
}

/// Rig recording laid out as
///
/// ```text
/// cameras.yaml
/// cam0/data.csv   cam0/data/*.png
/// cam1/data.csv   cam1/data/*.png
/// ...
/// odometry.csv    (optional)
/// ```
#[derive(Debug)]
pub struct RigDataset {
    dataset_path: PathBuf,
    pub cameras: Vec<PinholeCamera>,
    pub camera_entries: Vec<Vec<ImageEntry>>,
    pub odometry: Vec<OdometryEntry>,
    timestamps: Vec<u64>,
}

impl RigDataset {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let cameras = load_cameras(&root.join("cameras.yaml"))?;
        if cameras.is_empty() {
            bail!("No cameras listed in {:?}", root.join("cameras.yaml"));
        }

        let camera_entries = (0..cameras.len())
            .map(|i| load_image_list(root.join(format!("cam{}/data.csv", i))))
            .collect::<Result<Vec<_>>>()?;

        let odometry_path = root.join("odometry.csv");
        let odometry = if odometry_path.exists() {
            load_odometry_list(odometry_path)?
        } else {
            warn!("No odometry.csv in {:?}. Continuing without odometry.", root);
            Vec::new()
        };

        let mut timestamps: Vec<u64> = camera_entries
            .iter()
            .flat_map(|entries| entries.iter().map(|e| e.timestamp_ns))
            .collect();
        timestamps.sort_unstable();
        timestamps.dedup();

        Ok(Self {
            dataset_path: root,
            cameras,
            camera_entries,
            odometry,
            timestamps,
        })
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Number of distinct capture instants across all cameras.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamp(&self, idx: usize) -> Option<u64> {
        self.timestamps.get(idx).copied()
    }

    /// Load every camera's image captured at the `idx`-th instant.
    pub fn image_set(&self, idx: usize) -> Result<ImageSet> {
        let timestamp_ns = self
            .timestamp(idx)
            .with_context(|| format!("No image set at index {}", idx))?;

        let mut images = Vec::with_capacity(self.camera_count());
        for (camera, entries) in self.camera_entries.iter().enumerate() {
            let image = match entries.binary_search_by_key(&timestamp_ns, |e| e.timestamp_ns) {
                Ok(i) => {
                    let path = self
                        .dataset_path
                        .join(format!("cam{}/data", camera))
                        .join(&entries[i].filename);
                    let img = image::open(&path)
                        .with_context(|| format!("Failed to read image {:?}", path))?
                        .to_luma8();
                    Some(img)
                }
                Err(_) => None,
            };
            images.push(image);
        }

        Ok(ImageSet { timestamp_ns, images })
    }

    /// Odometry samples up to (and including) the given timestamp.
    pub fn odometry_until(&self, timestamp_ns: u64) -> &[OdometryEntry] {
        let cutoff = self.odometry.partition_point(|o| o.timestamp_ns <= timestamp_ns);
        &self.odometry[..cutoff]
    }
}

fn load_cameras(path: &Path) -> Result<Vec<PinholeCamera>> {
    let yaml: CamerasYaml =
        serde_yaml::from_reader(File::open(path).with_context(|| format!("Failed to open {:?}", path))?)
            .with_context(|| format!("Failed to parse {:?}", path))?;
    Ok(yaml.cameras)
}

fn load_image_list(csv_path: PathBuf) -> Result<Vec<ImageEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    // Keyed on timestamp so the list comes out sorted and duplicate rows collapse.
    let mut entries = BTreeMap::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        let ts: u64 = rec[0].trim().parse()?;
        let filename = rec[1].trim().to_string();
        entries.insert(ts, filename);
    }
    Ok(entries
        .into_iter()
        .map(|(timestamp_ns, filename)| ImageEntry { timestamp_ns, filename })
        .collect())
}

fn load_odometry_list(csv_path: PathBuf) -> Result<Vec<OdometryEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        // timestamp, x, y, yaw
        if rec.len() < 4 {
            continue;
        }
        entries.push(OdometryEntry {
            timestamp_ns: rec[0].trim().parse()?,
            x: rec[1].trim().parse()?,
            y: rec[2].trim().parse()?,
            yaw: rec[3].trim().parse()?,
        });
    }
    entries.sort_by_key(|e| e.timestamp_ns);
    Ok(entries)
}
