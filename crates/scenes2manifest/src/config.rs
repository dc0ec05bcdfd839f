use clap::Parser;
use std::path::PathBuf;

/// `scenes2manifest` - builds per-scene label files and training/validation
/// scene manifests for a chip classification dataset.
///
/// Scenes whose bounding box intersects the region of interest are kept,
/// every building footprint is copied into the label file of each scene it
/// touches, and scenes are split by how much of the region they cover.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Region of interest: a FeatureCollection with at least one polygon feature.
    #[arg(long, env = "SCENESPLIT_REGION")]
    pub region: PathBuf,

    /// Building footprint labels: a FeatureCollection of polygons.
    #[arg(long, env = "SCENESPLIT_LABELS")]
    pub labels: PathBuf,

    /// Scene footprint index: a FeatureCollection whose features carry the
    /// scene locator in `properties.url` and outline the raster extent.
    ///
    /// Supplies every scene's bounding box, and the scene listing itself
    /// unless `--scene-dir` is given.
    #[arg(long, env = "SCENESPLIT_SCENE_INDEX")]
    pub scene_index: PathBuf,

    /// Enumerate scenes from this directory instead of the footprint index.
    #[arg(long, env = "SCENESPLIT_SCENE_DIR")]
    pub scene_dir: Option<PathBuf>,

    /// Only scenes whose key starts with this prefix are considered.
    #[arg(long, default_value = "")]
    pub scene_prefix: String,

    /// File extensions treated as scenes when walking `--scene-dir`.
    #[arg(long = "scene-ext", default_values = ["tif", "tiff"])]
    pub scene_extensions: Vec<String>,

    /// Directory receiving the label files and both manifests.
    #[arg(long, env = "SCENESPLIT_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Reference written artifacts as `<prefix>/<name>` in the manifests
    /// (e.g. the bucket they will be uploaded to) instead of local paths.
    #[arg(long, env = "SCENESPLIT_LABEL_URI_PREFIX")]
    pub label_uri_prefix: Option<String>,

    /// Share of the region's area to assign to training.
    #[arg(long, default_value_t = scenesplit::DEFAULT_TRAIN_RATIO)]
    pub train_ratio: f64,

    /// Class id injected into every label feature.
    #[arg(long, default_value_t = 1)]
    pub class_id: i64,

    /// Class name injected into every label feature.
    #[arg(long, default_value = "building")]
    pub class_name: String,

    #[arg(long, default_value = "train-scenes.csv")]
    pub train_manifest: String,

    #[arg(long, default_value = "val-scenes.csv")]
    pub val_manifest: String,

    /// Write the JSON run report to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Fail when any input declares no coordinate reference system.
    #[arg(long, default_value_t = false)]
    pub strict_crs: bool,

    /// Exit with status 2 when the training or validation group is empty.
    #[arg(long, default_value_t = false)]
    pub fail_on_degenerate: bool,

    /// Worker threads for bounds reads and label writes (0 = all cores).
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    pub fn pipeline(&self) -> scenesplit::PipelineConfig {
        scenesplit::PipelineConfig {
            train_ratio: self.train_ratio,
            class: scenesplit::ClassTag {
                id: self.class_id,
                name: self.class_name.clone(),
            },
            names: scenesplit::ManifestNames {
                training: self.train_manifest.clone(),
                validation: self.val_manifest.clone(),
                ..Default::default()
            },
            scene_prefix: self.scene_prefix.clone(),
            strict_crs: self.strict_crs,
        }
    }
}
