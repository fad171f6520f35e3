use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::document::Document;

/// Where the viewer loads its diff from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Subject(String),
    File(PathBuf),
}

impl DocumentSource {
    /// Subject id used in telemetry paths; files use their stem.
    pub fn subject(&self) -> String {
        match self {
            Self::Subject(subject) => subject.clone(),
            Self::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "local".to_owned()),
        }
    }
}

impl Display for DocumentSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subject(subject) => write!(f, "subject {subject}"),
            Self::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioCommand {
    Load { source: DocumentSource },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    LoadStarted {
        source: DocumentSource,
    },
    DocumentLoaded {
        source: DocumentSource,
        document: Document,
    },
    LoadFailed {
        source: DocumentSource,
        error: String,
    },
}
