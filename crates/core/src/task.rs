//! Generation task kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The generation intent inferred from document state.
///
/// Derived on every build, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// New text, no details.
    GenZero,
    /// New text guided by details.
    GenInfo,
    /// Continuation of an existing body.
    ContZero,
    /// Continuation guided by details.
    ContInfo,
    /// Brainstorm details from scratch.
    IdeaZero,
    /// Brainstorm details from partial details.
    IdeaInfo,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenZero => "GEN_ZERO",
            Self::GenInfo => "GEN_INFO",
            Self::ContZero => "CONT_ZERO",
            Self::ContInfo => "CONT_INFO",
            Self::IdeaZero => "IDEA_ZERO",
            Self::IdeaInfo => "IDEA_INFO",
        }
    }

    pub fn is_generation(&self) -> bool {
        matches!(self, Self::GenZero | Self::GenInfo)
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self, Self::ContZero | Self::ContInfo)
    }

    pub fn is_idea(&self) -> bool {
        matches!(self, Self::IdeaZero | Self::IdeaInfo)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_are_disjoint() {
        for task in [
            TaskType::GenZero,
            TaskType::GenInfo,
            TaskType::ContZero,
            TaskType::ContInfo,
            TaskType::IdeaZero,
            TaskType::IdeaInfo,
        ] {
            let families = [task.is_generation(), task.is_continuation(), task.is_idea()];
            assert_eq!(families.iter().filter(|f| **f).count(), 1, "{task}");
        }
    }

    #[test]
    fn serializes_as_screaming_snake() {
        let json = serde_json::to_string(&TaskType::ContInfo).unwrap();
        assert_eq!(json, "\"CONT_INFO\"");
    }
}
