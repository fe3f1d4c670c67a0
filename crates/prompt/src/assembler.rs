//! Prompt assembly.
//!
//! Turns an evaluated document and a [`TaskType`] into one instruction
//! prompt:
//!
//! ```text
//! <s>[INST]{instruction} レーティング: {rating}\n{input}[/INST]{suffix}
//! ```
//!
//! The input section depends on the task family:
//!
//! | Task | Input | Suffix |
//! |------|-------|--------|
//! | GEN* | details block | short seed body, trimmed |
//! | IDEA* | details block without セリフ量 | none |
//! | CONT* | reference, body, author's note, tail | unfinished last line |
//!
//! Assembly is deterministic. All randomness happens earlier, when the
//! document is evaluated into an [`EvaluatedDocument`].

use crate::classifier::{self, instruction};
use crate::template::{self, Chooser, ThreadRngChooser};
use serde::Serialize;
use std::fmt;
use wannabe_config::PromptConfig;
use wannabe_core::{BlockOrder, DocumentState, Metadata, Mode, Rating, TaskType};

pub const INSTRUCTION_OPEN: &str = "<s>[INST]";
pub const INSTRUCTION_CLOSE: &str = "[/INST]";

/// Default character cap for the body block of continuation prompts.
pub const DEFAULT_MAX_MAIN_CHARS: usize = 8192;

pub const TITLE_HEADER: &str = "タイトル";
pub const KEYWORDS_HEADER: &str = "キーワード";
pub const GENRES_HEADER: &str = "ジャンル";
pub const SYNOPSIS_HEADER: &str = "あらすじ";
pub const SETTING_HEADER: &str = "設定";
pub const PLOT_HEADER: &str = "プロット";
pub const DIALOGUE_HEADER: &str = "セリフ量";

// ── Evaluation snapshot ───────────────────────────────────────────────────

/// A document with every free-text field template-evaluated once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedDocument {
    pub body: String,
    pub metadata: Metadata,
    pub authors_note: String,
    pub rating: Rating,
}

impl EvaluatedDocument {
    /// Snapshot `doc`, falling back to `default_rating` when it has none.
    pub fn evaluate(doc: &DocumentState, default_rating: Rating, chooser: &mut dyn Chooser) -> Self {
        Self {
            body: template::evaluate_template_with(&doc.body, chooser),
            metadata: evaluate_metadata(&doc.metadata, chooser),
            authors_note: template::evaluate_template_with(&doc.authors_note, chooser),
            rating: doc.rating.unwrap_or(default_rating),
        }
    }

    /// The same snapshot with a different body.
    pub fn with_body(&self, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..self.clone()
        }
    }
}

/// Evaluate every detail field. List items lose surrounding `"` and are
/// dropped when nothing is left.
pub fn evaluate_metadata(metadata: &Metadata, chooser: &mut dyn Chooser) -> Metadata {
    let mut eval_list = |items: &[String]| -> Vec<String> {
        items
            .iter()
            .map(|item| {
                template::evaluate_template_with(item, chooser)
                    .trim_matches('"')
                    .to_string()
            })
            .filter(|item| !item.trim().is_empty())
            .collect()
    };
    let keywords = eval_list(&metadata.keywords);
    let genres = eval_list(&metadata.genres);

    Metadata {
        title: template::evaluate_template_with(&metadata.title, chooser),
        keywords,
        genres,
        synopsis: template::evaluate_template_with(&metadata.synopsis, chooser),
        setting: template::evaluate_template_with(&metadata.setting, chooser),
        plot: template::evaluate_template_with(&metadata.plot, chooser),
        dialogue_level: metadata.dialogue_level,
    }
}

/// One `# {header}:\n{value}` section.
pub(crate) fn section(header: &str, value: &str) -> String {
    format!("# {header}:\n{value}")
}

pub(crate) fn join_items(items: &[String]) -> String {
    items
        .iter()
        .filter(|item| !item.trim().is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render evaluated details as header sections separated by blank lines.
/// Empty fields are skipped.
pub fn format_metadata(metadata: &Metadata, include_dialogue_level: bool) -> String {
    let mut sections = Vec::new();
    let mut push = |header: &str, value: &str| {
        let value = value.trim();
        if !value.is_empty() {
            sections.push(section(header, value));
        }
    };

    push(TITLE_HEADER, &metadata.title);
    push(KEYWORDS_HEADER, &join_items(&metadata.keywords));
    push(GENRES_HEADER, &join_items(&metadata.genres));
    push(SYNOPSIS_HEADER, &metadata.synopsis);
    push(SETTING_HEADER, &metadata.setting);
    push(PLOT_HEADER, &metadata.plot);
    if include_dialogue_level {
        if let Some(level) = metadata.dialogue_level {
            push(DIALOGUE_HEADER, level.label());
        }
    }

    sections.join("\n\n")
}

// ── Body partitioning ─────────────────────────────────────────────────────

/// How a continuation body is split across the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BodyPartition {
    /// Everything before the tail, whitespace preserved.
    pub main: String,
    /// Up to three non-blank lines right before the suffix.
    pub tail: String,
    /// The unfinished last line, or empty when the body ends a sentence.
    pub suffix: String,
    pub sentence_complete: bool,
    /// Byte offset in the body where the main part starts. Text before it
    /// is not in the prompt.
    pub start: usize,
}

/// Number of non-blank lines kept out of the body block.
pub const TAIL_LINES: usize = 3;

fn ends_sentence(c: char) -> bool {
    matches!(c, '。' | '」' | '』')
}

/// Split `body` into main part, tail, and suffix.
///
/// The main part keeps only its last `max_main_chars` characters.
pub fn partition_body(body: &str, max_main_chars: usize) -> BodyPartition {
    // Byte ranges of non-blank lines, without their terminators.
    let mut lines: Vec<(usize, usize)> = Vec::new();
    let mut pos = 0;
    for segment in body.split_inclusive('\n') {
        let content = segment.trim_end_matches('\n').trim_end_matches('\r');
        if !content.trim().is_empty() {
            lines.push((pos, pos + content.len()));
        }
        pos += segment.len();
    }

    let Some(&(last_start, last_end)) = lines.last() else {
        return BodyPartition::default();
    };

    let sentence_complete =
        body.trim_end().chars().next_back().is_some_and(ends_sentence) || last_end < body.len();

    let (tail_lines, suffix) = if sentence_complete {
        (&lines[lines.len().saturating_sub(TAIL_LINES)..], String::new())
    } else {
        let before_last = &lines[..lines.len() - 1];
        (
            &before_last[before_last.len().saturating_sub(TAIL_LINES)..],
            body[last_start..last_end].trim().to_string(),
        )
    };

    let (tail_start, tail) = match (tail_lines.first(), tail_lines.last()) {
        (Some(&(start, _)), Some(&(_, end))) => (start, body[start..end].to_string()),
        _ => (last_start, String::new()),
    };

    let main = keep_last_chars(&body[..tail_start], max_main_chars);
    BodyPartition {
        main: main.to_string(),
        tail,
        suffix,
        sentence_complete,
        start: tail_start - main.len(),
    }
}

/// The last `max_chars` characters of `text`.
pub fn keep_last_chars(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

// ── Blocks ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Bare details, used by GEN and IDEA prompts.
    Details,
    /// `【参考情報】` fenced details.
    Reference,
    /// `【本文】` fenced body.
    MainText,
    /// `【オーサーズノート】` fenced author's note.
    AuthorsNote,
    /// Bare tail lines.
    Tail,
}

/// A named input fragment. Blocks with blank content are absent and
/// render to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptBlock {
    pub kind: BlockKind,
    pub content: String,
}

impl PromptBlock {
    pub fn new(kind: BlockKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn is_present(&self) -> bool {
        !self.content.trim().is_empty()
    }

    pub fn render(&self) -> String {
        match self.kind {
            BlockKind::Details | BlockKind::Tail => self.content.clone(),
            BlockKind::Reference => fenced("【参考情報】", &self.content),
            BlockKind::MainText => fenced("【本文】", &self.content),
            BlockKind::AuthorsNote => fenced("【オーサーズノート】", &self.content),
        }
    }
}

fn fenced(label: &str, content: &str) -> String {
    format!("{label}\n```\n{content}\n```")
}

/// Everything that goes into one prompt, before rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptParts {
    pub task: TaskType,
    pub instruction: &'static str,
    pub rating: Rating,
    pub blocks: Vec<PromptBlock>,
    pub suffix: String,
    /// Present for continuation tasks.
    pub partition: Option<BodyPartition>,
}

impl PromptParts {
    /// Present blocks joined by single newlines.
    pub fn input(&self) -> String {
        self.blocks
            .iter()
            .filter(|b| b.is_present())
            .map(PromptBlock::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PromptParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{INSTRUCTION_OPEN}{} レーティング: {}",
            self.instruction,
            self.rating.as_prompt_str()
        )?;
        let input = self.input();
        if !input.is_empty() {
            write!(f, "\n{input}")?;
        }
        write!(f, "{INSTRUCTION_CLOSE}{}", self.suffix)
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds prompts from evaluated documents. Stateless; create one and reuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptAssembler {
    pub order: BlockOrder,
    pub max_main_chars: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            order: BlockOrder::default(),
            max_main_chars: DEFAULT_MAX_MAIN_CHARS,
        }
    }
}

impl PromptAssembler {
    pub fn new(order: BlockOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    pub fn from_config(config: &PromptConfig) -> Self {
        Self {
            order: config.cont_prompt_order,
            max_main_chars: config.max_main_chars,
        }
    }

    /// Classify, then build.
    pub fn build_for_mode(&self, mode: &Mode, doc: &EvaluatedDocument) -> PromptParts {
        let task = classifier::classify(mode, &doc.body, &doc.metadata);
        self.build(task, doc)
    }

    /// Build the parts of a prompt for `task`.
    pub fn build(&self, task: TaskType, doc: &EvaluatedDocument) -> PromptParts {
        let mut parts = PromptParts {
            task,
            instruction: instruction(task),
            rating: doc.rating,
            blocks: Vec::new(),
            suffix: String::new(),
            partition: None,
        };

        match task {
            TaskType::GenZero | TaskType::GenInfo => {
                parts
                    .blocks
                    .push(PromptBlock::new(BlockKind::Details, format_metadata(&doc.metadata, true)));
                parts.suffix = doc.body.trim().to_string();
            }
            TaskType::IdeaZero | TaskType::IdeaInfo => {
                parts
                    .blocks
                    .push(PromptBlock::new(BlockKind::Details, format_metadata(&doc.metadata, false)));
            }
            TaskType::ContZero | TaskType::ContInfo => {
                let partition = partition_body(&doc.body, self.max_main_chars);
                let reference =
                    PromptBlock::new(BlockKind::Reference, format_metadata(&doc.metadata, true));
                let main = PromptBlock::new(BlockKind::MainText, partition.main.clone());

                parts.blocks = match self.order {
                    BlockOrder::ReferenceFirst => vec![reference, main],
                    BlockOrder::TextFirst => vec![main, reference],
                };
                parts.blocks.push(PromptBlock::new(
                    BlockKind::AuthorsNote,
                    doc.authors_note.trim(),
                ));
                parts
                    .blocks
                    .push(PromptBlock::new(BlockKind::Tail, partition.tail.clone()));
                parts.suffix = partition.suffix.clone();
                parts.partition = Some(partition);
            }
        }

        parts
    }
}

/// Evaluate raw inputs, classify, and render the prompt in one call.
pub fn classify_and_build_prompt(
    mode: &Mode,
    body: &str,
    metadata: &Metadata,
    authors_note: &str,
    rating: Rating,
    ordering: BlockOrder,
) -> String {
    let doc = DocumentState {
        body: body.to_string(),
        metadata: metadata.clone(),
        authors_note: authors_note.to_string(),
        rating: Some(rating),
    };
    let evaluated = EvaluatedDocument::evaluate(&doc, rating, &mut ThreadRngChooser);
    PromptAssembler::new(ordering)
        .build_for_mode(mode, &evaluated)
        .render()
}
