//! Project files: the on-disk form of a [`DocumentState`].
//!
//! A project is a pretty-printed JSON object with three top-level keys:
//! `details` (story details, rating and author's note), `main_text` and
//! `memo_text`. Unknown keys are ignored so files written by newer versions
//! still load.

use crate::document::{DialogueLevel, DocumentState, Metadata, Rating};
use crate::error::ProjectError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// The `details` object of a project file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDetails {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub genres: Vec<String>,

    #[serde(default)]
    pub synopsis: String,

    #[serde(default)]
    pub setting: String,

    #[serde(default)]
    pub plot: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue_level: Option<DialogueLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,

    #[serde(default)]
    pub authors_note: String,
}

/// A saved writing project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub details: ProjectDetails,

    #[serde(default)]
    pub main_text: String,

    /// Scratch notes; never part of a prompt.
    #[serde(default)]
    pub memo_text: String,
}

impl ProjectFile {
    /// Load a project from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        if !path.exists() {
            return Err(ProjectError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ProjectError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let project: Self =
            serde_json::from_str(&content).map_err(|e| ProjectError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        debug!(path = %path.display(), body_chars = project.main_text.chars().count(), "Project loaded");
        Ok(project)
    }

    /// Save the project as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        let write_err = |reason: String| ProjectError::WriteError {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| write_err(e.to_string()))?;

        debug!(path = %path.display(), "Project saved");
        Ok(())
    }

    /// Snapshot the prompt-relevant part of the project.
    pub fn to_document(&self) -> DocumentState {
        let d = &self.details;
        DocumentState {
            body: self.main_text.clone(),
            metadata: Metadata {
                title: d.title.clone(),
                keywords: d.keywords.clone(),
                genres: d.genres.clone(),
                synopsis: d.synopsis.clone(),
                setting: d.setting.clone(),
                plot: d.plot.clone(),
                dialogue_level: d.dialogue_level,
            },
            authors_note: d.authors_note.clone(),
            rating: d.rating,
        }
    }

    /// Build a project from a document, keeping the given memo.
    pub fn from_document(doc: &DocumentState, memo_text: impl Into<String>) -> Self {
        let m = &doc.metadata;
        Self {
            details: ProjectDetails {
                title: m.title.clone(),
                keywords: m.keywords.clone(),
                genres: m.genres.clone(),
                synopsis: m.synopsis.clone(),
                setting: m.setting.clone(),
                plot: m.plot.clone(),
                dialogue_level: m.dialogue_level,
                rating: doc.rating,
                authors_note: doc.authors_note.clone(),
            },
            main_text: doc.body.clone(),
            memo_text: memo_text.into(),
        }
    }
}

/// Write generated output as plain text, optionally headed by `# {title}`.
pub fn save_output_text(path: &Path, text: &str, title: Option<&str>) -> Result<(), ProjectError> {
    let write_err = |e: std::io::Error| ProjectError::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let content = match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("# {title}\n\n{text}"),
        None => text.to_string(),
    };
    std::fs::write(path, content).map_err(write_err)
}
