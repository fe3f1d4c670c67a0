//! Task classification.
//!
//! Picks the [`TaskType`] from the caller's mode, the body, and the story
//! details. Pure: no I/O and no randomness.

use tracing::warn;
use wannabe_core::{Metadata, Mode, TaskType};

/// Bodies with at least this many non-blank lines are continued rather
/// than used as a seed.
pub const CONTINUATION_MIN_LINES: usize = 4;

pub const GEN_INFO_INSTRUCTION: &str = "以下の情報に基づいて小説本文を生成してください。";
pub const GEN_ZERO_INSTRUCTION: &str = "自由に小説を生成してください。";
pub const CONT_INFO_INSTRUCTION: &str =
    "参考情報と本文を踏まえ、最後の文章の自然な続きとなるように小説を生成してください。";
pub const CONT_ZERO_INSTRUCTION: &str =
    "本文を踏まえ、最後の文章の自然な続きとなるように小説を生成してください。";
pub const IDEA_INFO_INSTRUCTION: &str = "以下の情報に基づいて、完全な小説のアイデア（タイトル、キーワード、ジャンル、あらすじ、設定、プロット）を生成してください。";
pub const IDEA_ZERO_INSTRUCTION: &str =
    "自由に小説のアイデア（タイトル、キーワード、ジャンル、あらすじ、設定、プロット）を生成してください。";

/// The base instruction for a task, without the rating.
pub fn instruction(task: TaskType) -> &'static str {
    match task {
        TaskType::GenInfo => GEN_INFO_INSTRUCTION,
        TaskType::GenZero => GEN_ZERO_INSTRUCTION,
        TaskType::ContInfo => CONT_INFO_INSTRUCTION,
        TaskType::ContZero => CONT_ZERO_INSTRUCTION,
        TaskType::IdeaInfo => IDEA_INFO_INSTRUCTION,
        TaskType::IdeaZero => IDEA_ZERO_INSTRUCTION,
    }
}

pub fn count_non_blank_lines(body: &str) -> usize {
    body.lines().filter(|line| !line.trim().is_empty()).count()
}

/// Select the task for a build.
///
/// `metadata` should already be template-evaluated so that fields which
/// evaluate to nothing do not count as present.
pub fn classify(mode: &Mode, body: &str, metadata: &Metadata) -> TaskType {
    match mode {
        Mode::Idea => {
            if metadata.has_any_text() {
                TaskType::IdeaInfo
            } else {
                TaskType::IdeaZero
            }
        }
        Mode::Generate => {
            let has_info = metadata.has_any();
            let continues = count_non_blank_lines(body) >= CONTINUATION_MIN_LINES;
            match (continues, has_info) {
                (true, true) => TaskType::ContInfo,
                (true, false) => TaskType::ContZero,
                (false, true) => TaskType::GenInfo,
                (false, false) => TaskType::GenZero,
            }
        }
        Mode::Unknown(name) => {
            warn!(mode = %name, "Unknown mode, defaulting to GEN_ZERO");
            TaskType::GenZero
        }
    }
}
