//! Document domain types.
//!
//! A [`DocumentState`] is everything the writer has typed: the body text,
//! the structured story details, and the free-form author's note. It is
//! owned by the caller and only ever read (snapshotted) by the prompt layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content rating appended to every instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// All ages
    #[default]
    General,
    /// Adult content
    #[serde(alias = "r18")]
    Mature,
}

impl Rating {
    /// The token the model was trained on.
    pub fn as_prompt_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Mature => "r18",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_prompt_str())
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "mature" | "r18" | "r-18" => Ok(Self::Mature),
            other => Err(format!("unknown rating '{other}' (expected general or mature)")),
        }
    }
}

/// How much dialogue the generated text should contain.
///
/// Absence (`None` on [`Metadata::dialogue_level`]) means "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueLevel {
    #[serde(alias = "かなり少ない")]
    VeryFew,
    #[serde(alias = "少ない")]
    Few,
    #[serde(alias = "やや少ない")]
    SlightlyFew,
    #[serde(alias = "普通")]
    Normal,
    #[serde(alias = "やや多い")]
    SlightlyMany,
    #[serde(alias = "多い")]
    Many,
}

impl DialogueLevel {
    pub const ALL: [DialogueLevel; 6] = [
        Self::VeryFew,
        Self::Few,
        Self::SlightlyFew,
        Self::Normal,
        Self::SlightlyMany,
        Self::Many,
    ];

    /// Label rendered under the `セリフ量` header.
    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryFew => "かなり少ない",
            Self::Few => "少ない",
            Self::SlightlyFew => "やや少ない",
            Self::Normal => "普通",
            Self::SlightlyMany => "やや多い",
            Self::Many => "多い",
        }
    }
}

impl FromStr for DialogueLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.label() == s)
            .or(match s {
                "very_few" => Some(Self::VeryFew),
                "few" => Some(Self::Few),
                "slightly_few" => Some(Self::SlightlyFew),
                "normal" => Some(Self::Normal),
                "slightly_many" => Some(Self::SlightlyMany),
                "many" => Some(Self::Many),
                _ => None,
            })
            .ok_or_else(|| format!("unknown dialogue level '{s}'"))
    }
}

/// Structured story details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
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
}

impl Metadata {
    /// Whether any free-text detail is filled in. `dialogue_level` is not
    /// considered: idea generation ignores it.
    pub fn has_any_text(&self) -> bool {
        !self.title.trim().is_empty()
            || has_any_item(&self.keywords)
            || has_any_item(&self.genres)
            || !self.synopsis.trim().is_empty()
            || !self.setting.trim().is_empty()
            || !self.plot.trim().is_empty()
    }

    /// Whether anything at all is specified, including the dialogue level.
    pub fn has_any(&self) -> bool {
        self.has_any_text() || self.dialogue_level.is_some()
    }
}

fn has_any_item(items: &[String]) -> bool {
    items.iter().any(|item| !item.trim().is_empty())
}

/// The full writer-owned document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    /// Body text, lines separated by `\n` (or `\r\n`).
    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub authors_note: String,

    /// Explicit rating; `None` falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

impl DocumentState {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_authors_note(mut self, note: impl Into<String>) -> Self {
        self.authors_note = note.into();
        self
    }

    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// What the caller is doing when it asks for a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Write or continue the story body.
    Generate,
    /// Brainstorm story details.
    Idea,
    /// Anything else; classified as plain generation.
    Unknown(String),
}

impl Mode {
    /// Parse a mode name. Never fails: unrecognised names become
    /// [`Mode::Unknown`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "generate" | "gen" => Self::Generate,
            "idea" => Self::Idea,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl From<&str> for Mode {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => f.write_str("generate"),
            Self::Idea => f.write_str("idea"),
            Self::Unknown(name) => write!(f, "unknown({name})"),
        }
    }
}

/// Order of the reference and body blocks in continuation prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockOrder {
    #[default]
    ReferenceFirst,
    TextFirst,
}

impl FromStr for BlockOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reference_first" => Ok(Self::ReferenceFirst),
            "text_first" => Ok(Self::TextFirst),
            other => Err(format!(
                "unknown block order '{other}' (expected reference_first or text_first)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_renders_model_tokens() {
        assert_eq!(Rating::General.to_string(), "general");
        assert_eq!(Rating::Mature.to_string(), "r18");
        assert_eq!("r18".parse::<Rating>().unwrap(), Rating::Mature);
        assert!("pg13".parse::<Rating>().is_err());
    }

    #[test]
    fn rating_accepts_legacy_name_in_json() {
        let rating: Rating = serde_json::from_str("\"r18\"").unwrap();
        assert_eq!(rating, Rating::Mature);
    }

    #[test]
    fn dialogue_level_parses_labels_and_keys() {
        assert_eq!("普通".parse::<DialogueLevel>().unwrap(), DialogueLevel::Normal);
        assert_eq!("many".parse::<DialogueLevel>().unwrap(), DialogueLevel::Many);
        assert!("lots".parse::<DialogueLevel>().is_err());
    }

    #[test]
    fn unknown_mode_is_preserved() {
        assert_eq!(Mode::parse("generate"), Mode::Generate);
        assert_eq!(Mode::parse("IDEA"), Mode::Idea);
        assert_eq!(
            Mode::parse("autocomplete"),
            Mode::Unknown("autocomplete".into())
        );
    }

    #[test]
    fn metadata_presence_ignores_blank_values() {
        let mut meta = Metadata {
            title: "   ".into(),
            keywords: vec!["".into()],
            ..Metadata::default()
        };
        assert!(!meta.has_any());

        meta.dialogue_level = Some(DialogueLevel::Few);
        assert!(meta.has_any());
        assert!(!meta.has_any_text());
    }

    #[test]
    fn block_order_defaults_to_reference_first() {
        assert_eq!(BlockOrder::default(), BlockOrder::ReferenceFirst);
        assert_eq!("text_first".parse::<BlockOrder>().unwrap(), BlockOrder::TextFirst);
    }
}
