use std::{fmt, io, path::PathBuf};

/// A single artifact that could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactFailure {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for ArtifactFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input {} is missing or unreadable", path.display())]
    MissingInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {what}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid geometry in {context}: {reason}")]
    InvalidGeometry { context: String, reason: String },

    #[error("training ratio must be a finite value in [0, 1], got {0}")]
    InvalidRatio(f64),

    #[error("none of the {candidates} candidate scenes intersect the region of interest")]
    EmptyIntersection { candidates: usize },

    #[error("{source_name} is in {found}, expected {expected}")]
    CrsMismatch {
        expected: String,
        found: String,
        source_name: String,
    },

    #[error("{source_name} does not declare a coordinate reference system")]
    MissingCrs { source_name: String },

    #[error("scene listing failed: {0}")]
    SceneListing(String),

    #[error("bounds could not be read for {} scene(s): {}", failures.len(), join_failures(failures))]
    SceneMetadata { failures: Vec<(String, String)> },

    #[error("scenes {first} and {second} would both write {name}")]
    NameCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("scene {0} is in the split plan but has no label partition")]
    UnknownScene(String),

    #[error(
        "{} artifact(s) failed to persist ({}); not written: [{}]",
        failed.len(),
        failed.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "),
        skipped.join(", ")
    )]
    PartialWrite {
        failed: Vec<ArtifactFailure>,
        skipped: Vec<String>,
    },
}

fn join_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(locator, reason)| format!("{locator}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
