//! Idea brainstorming.
//!
//! Idea prompts ask the model for story details as `# {header}:` sections.
//! A single detail can be targeted two ways:
//!
//! - **safe**: ask for everything, stop at the next section, then keep
//!   only the targeted section with [`filter_output`]
//! - **fast**: prefill the answer with the details that precede the target
//!   so the model starts writing right at it
//!
//! [`parse_sections`] turns model output back into [`Metadata`].

use crate::assembler::{self, EvaluatedDocument, PromptAssembler};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use wannabe_core::{Metadata, Mode, TaskType};

/// Details an idea run can produce, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaItem {
    Title,
    Keywords,
    Genres,
    Synopsis,
    Setting,
    Plot,
}

impl IdeaItem {
    pub const ALL: [IdeaItem; 6] = [
        Self::Title,
        Self::Keywords,
        Self::Genres,
        Self::Synopsis,
        Self::Setting,
        Self::Plot,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Self::Title => assembler::TITLE_HEADER,
            Self::Keywords => assembler::KEYWORDS_HEADER,
            Self::Genres => assembler::GENRES_HEADER,
            Self::Synopsis => assembler::SYNOPSIS_HEADER,
            Self::Setting => assembler::SETTING_HEADER,
            Self::Plot => assembler::PLOT_HEADER,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Keywords => "keywords",
            Self::Genres => "genres",
            Self::Synopsis => "synopsis",
            Self::Setting => "setting",
            Self::Plot => "plot",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|i| i == self).unwrap_or(0)
    }

    pub fn next(&self) -> Option<IdeaItem> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Items before this one in output order.
    pub fn preceding(&self) -> &'static [IdeaItem] {
        &Self::ALL[..self.index()]
    }

    /// Fast mode needs at least one preceding item to prefill.
    pub fn supports_fast(&self) -> bool {
        *self != Self::Title
    }

    fn is_list(&self) -> bool {
        matches!(self, Self::Keywords | Self::Genres)
    }

    /// The item's value as it appears in a section body.
    fn value(&self, metadata: &Metadata) -> String {
        match self {
            Self::Title => metadata.title.trim().to_string(),
            Self::Keywords => trimmed_items(&metadata.keywords),
            Self::Genres => trimmed_items(&metadata.genres),
            Self::Synopsis => metadata.synopsis.trim().to_string(),
            Self::Setting => metadata.setting.trim().to_string(),
            Self::Plot => metadata.plot.trim().to_string(),
        }
    }

    fn section_marker(&self) -> String {
        format!("# {}:", self.header())
    }
}

fn trimmed_items(items: &[String]) -> String {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl fmt::Display for IdeaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for IdeaItem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|item| item.key().eq_ignore_ascii_case(s) || item.header() == s)
            .ok_or_else(|| format!("unknown idea item '{s}'"))
    }
}

/// What an idea run should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdeaTarget {
    All,
    Item(IdeaItem),
}

impl IdeaTarget {
    fn item(&self) -> Option<IdeaItem> {
        match self {
            Self::All => None,
            Self::Item(item) => Some(*item),
        }
    }
}

impl FromStr for IdeaTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") || s.trim() == "全部" {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Item)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaMethod {
    #[default]
    Safe,
    Fast,
}

impl FromStr for IdeaMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "fast" => Ok(Self::Fast),
            other => Err(format!("unknown idea method '{other}' (expected safe or fast)")),
        }
    }
}

/// Preceding items that are still empty. Fast mode works best when this
/// is empty.
pub fn missing_prerequisites(metadata: &Metadata, item: IdeaItem) -> Vec<IdeaItem> {
    item.preceding()
        .iter()
        .copied()
        .filter(|prev| prev.value(metadata).is_empty())
        .collect()
}

/// Stop at the header of the item after the target.
pub fn stop_sequence(target: IdeaTarget) -> Option<String> {
    let next = target.item()?.next()?;
    Some(format!("\n{}", next.section_marker()))
}

/// The preceding items as sections, ready to prefill the answer.
pub fn fast_suffix(metadata: &Metadata, item: IdeaItem) -> String {
    let sections: Vec<String> = item
        .preceding()
        .iter()
        .filter_map(|prev| {
            let value = prev.value(metadata);
            (!value.is_empty()).then(|| assembler::section(prev.header(), &value))
        })
        .collect();

    if sections.is_empty() {
        String::new()
    } else {
        format!("{}\n\n", sections.join("\n\n"))
    }
}

/// Keep the target's section of `output`, header included.
///
/// The section ends at the first later item whose header occurs. Returns
/// an empty string when the target header is missing, and all of `output`
/// for [`IdeaTarget::All`].
pub fn filter_output(output: &str, target: IdeaTarget) -> String {
    let Some(item) = target.item() else {
        return output.to_string();
    };

    let marker = item.section_marker();
    let Some(start) = output.find(&marker) else {
        warn!(header = %marker, "Idea header not found in output");
        return String::new();
    };

    let mut content_start = start + marker.len();
    if output[content_start..].starts_with('\n') {
        content_start += 1;
    }

    let end = IdeaItem::ALL[item.index() + 1..]
        .iter()
        .find_map(|later| {
            let later_marker = later.section_marker();
            let with_newline = output[content_start..]
                .find(&format!("\n{later_marker}"))
                .map(|i| i + content_start);
            let bare = output[content_start..]
                .find(&later_marker)
                .map(|i| i + content_start);
            with_newline.into_iter().chain(bare).min()
        })
        .unwrap_or(output.len());

    output[start..end].trim().to_string()
}

/// Parse `# {header}:` sections into details. The first section for each
/// item wins. List items may carry a leading `-`.
pub fn parse_sections(output: &str) -> Metadata {
    // (line start, item, content start) for every `# ` line
    let mut boundaries: Vec<(usize, Option<(IdeaItem, usize)>)> = Vec::new();
    let mut pos = 0;
    for line in output.split_inclusive('\n') {
        if line.starts_with("# ") {
            let item = IdeaItem::ALL
                .into_iter()
                .find(|item| line.starts_with(&item.section_marker()))
                .map(|item| (item, pos + item.section_marker().len()));
            boundaries.push((pos, item));
        }
        pos += line.len();
    }

    let mut metadata = Metadata::default();
    let mut seen: Vec<IdeaItem> = Vec::new();
    for (k, (_, found)) in boundaries.iter().enumerate() {
        let Some((item, content_start)) = *found else {
            continue;
        };
        if seen.contains(&item) {
            continue;
        }
        seen.push(item);

        let end = boundaries.get(k + 1).map_or(output.len(), |(next, _)| *next);
        let value = output[content_start..end].trim();

        if item.is_list() {
            let items: Vec<String> = value
                .lines()
                .map(|l| l.trim().trim_start_matches('-').trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
            match item {
                IdeaItem::Keywords => metadata.keywords = items,
                _ => metadata.genres = items,
            }
        } else {
            let value = value.to_string();
            match item {
                IdeaItem::Title => metadata.title = value,
                IdeaItem::Synopsis => metadata.synopsis = value,
                IdeaItem::Setting => metadata.setting = value,
                _ => metadata.plot = value,
            }
        }
    }
    metadata
}

/// Copy parsed details into `metadata`.
///
/// For a single item only that field is touched. For [`IdeaTarget::All`]
/// every non-empty parsed field replaces the current one.
pub fn merge_sections(metadata: &mut Metadata, parsed: &Metadata, target: IdeaTarget) {
    let items: &[IdeaItem] = match &target {
        IdeaTarget::All => &IdeaItem::ALL,
        IdeaTarget::Item(item) => std::slice::from_ref(item),
    };

    for item in items {
        if item.value(parsed).is_empty() {
            continue;
        }
        match item {
            IdeaItem::Title => metadata.title = parsed.title.clone(),
            IdeaItem::Keywords => metadata.keywords = parsed.keywords.clone(),
            IdeaItem::Genres => metadata.genres = parsed.genres.clone(),
            IdeaItem::Synopsis => metadata.synopsis = parsed.synopsis.clone(),
            IdeaItem::Setting => metadata.setting = parsed.setting.clone(),
            IdeaItem::Plot => metadata.plot = parsed.plot.clone(),
        }
    }
}

/// A ready-to-send idea prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdeaPrompt {
    pub prompt: String,
    pub task: TaskType,
    /// Stop sequences specific to the target, to add to the configured ones.
    pub stop_sequences: Vec<String>,
    /// Empty preceding items when fast mode was requested.
    pub missing: Vec<IdeaItem>,
    /// Answer prefill appended in fast mode, empty otherwise. Prepend it to
    /// the model output before filtering.
    pub prefill: String,
}

/// Build the prompt for an idea run.
///
/// Fast mode is ignored for [`IdeaTarget::All`] and for the title, which
/// have nothing to prefill.
pub fn build_idea_prompt(
    assembler: &PromptAssembler,
    doc: &EvaluatedDocument,
    target: IdeaTarget,
    method: IdeaMethod,
) -> IdeaPrompt {
    let parts = assembler.build_for_mode(&Mode::Idea, doc);
    let mut prompt = parts.render();

    let fast_item = match (method, target.item()) {
        (IdeaMethod::Fast, Some(item)) if item.supports_fast() => Some(item),
        (IdeaMethod::Fast, _) => {
            warn!(idea = ?target, "Fast idea mode needs a preceding item, using safe mode");
            None
        }
        (IdeaMethod::Safe, _) => None,
    };

    let mut missing = Vec::new();
    let mut prefill = String::new();
    if let Some(item) = fast_item {
        missing = missing_prerequisites(&doc.metadata, item);
        if !missing.is_empty() {
            warn!(
                item = %item,
                missing = ?missing.iter().map(|m| m.key()).collect::<Vec<_>>(),
                "Fast idea mode without all preceding items"
            );
        }
        prefill = fast_suffix(&doc.metadata, item);
        prompt.push_str(&prefill);
    }

    IdeaPrompt {
        prompt,
        task: parts.task,
        stop_sequences: stop_sequence(target).into_iter().collect(),
        missing,
        prefill,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wannabe_core::Rating;

    fn details() -> Metadata {
        Metadata {
            title: "星降る夜".into(),
            keywords: vec![" 魔法 ".into(), "".into(), "旅".into()],
            synopsis: "見習い魔法使いが旅に出る。".into(),
            ..Metadata::default()
        }
    }

    #[test]
    fn items_follow_output_order() {
        assert_eq!(IdeaItem::Title.next(), Some(IdeaItem::Keywords));
        assert_eq!(IdeaItem::Plot.next(), None);
        assert_eq!(IdeaItem::Genres.preceding(), &[IdeaItem::Title, IdeaItem::Keywords]);
        assert!(!IdeaItem::Title.supports_fast());
        assert_eq!("あらすじ".parse::<IdeaItem>().unwrap(), IdeaItem::Synopsis);
        assert_eq!("all".parse::<IdeaTarget>().unwrap(), IdeaTarget::All);
    }

    #[test]
    fn missing_prerequisites_lists_empty_predecessors() {
        let missing = missing_prerequisites(&details(), IdeaItem::Setting);
        assert_eq!(missing, vec![IdeaItem::Genres]);
        assert!(missing_prerequisites(&details(), IdeaItem::Title).is_empty());
    }

    #[test]
    fn stop_sequence_is_next_header() {
        assert_eq!(
            stop_sequence(IdeaTarget::Item(IdeaItem::Synopsis)).as_deref(),
            Some("\n# 設定:")
        );
        assert_eq!(stop_sequence(IdeaTarget::Item(IdeaItem::Plot)), None);
        assert_eq!(stop_sequence(IdeaTarget::All), None);
    }

    #[test]
    fn fast_suffix_formats_preceding_items() {
        assert_eq!(
            fast_suffix(&details(), IdeaItem::Genres),
            "# タイトル:\n星降る夜\n\n# キーワード:\n魔法\n旅\n\n"
        );
        assert_eq!(fast_suffix(&Metadata::default(), IdeaItem::Plot), "");
    }

    #[test]
    fn filter_keeps_target_section() {
        let output = "# タイトル:\n星降る夜\n\n# キーワード:\n魔法\n\n# あらすじ:\n旅に出る。\n# 設定:\n王国";
        assert_eq!(
            filter_output(output, IdeaTarget::Item(IdeaItem::Keywords)),
            "# キーワード:\n魔法"
        );
        assert_eq!(
            filter_output(output, IdeaTarget::Item(IdeaItem::Setting)),
            "# 設定:\n王国"
        );
        assert_eq!(filter_output(output, IdeaTarget::Item(IdeaItem::Plot)), "");
        assert_eq!(filter_output(output, IdeaTarget::All), output);
    }

    #[test]
    fn filter_skips_missing_next_header() {
        let output = "# タイトル:\n星\n# あらすじ:\n旅";
        assert_eq!(filter_output(output, IdeaTarget::Item(IdeaItem::Title)), "# タイトル:\n星");
    }

    #[test]
    fn parse_sections_reads_all_items() {
        let output = "前置き\n# タイトル: 星降る夜\n# キーワード:\n- 魔法\n- 旅\n\n# ジャンル:\nファンタジー\n# あらすじ:\n見習いが\n旅に出る。\n# メモ:\n無視\n# 設定:\n王国\n# タイトル:\n二つ目";
        let meta = parse_sections(output);
        assert_eq!(meta.title, "星降る夜");
        assert_eq!(meta.keywords, vec!["魔法".to_string(), "旅".to_string()]);
        assert_eq!(meta.genres, vec!["ファンタジー".to_string()]);
        assert_eq!(meta.synopsis, "見習いが\n旅に出る。");
        assert_eq!(meta.setting, "王国");
        assert!(meta.plot.is_empty());
    }

    #[test]
    fn merge_touches_only_target() {
        let parsed = parse_sections("# タイトル:\n新題\n# あらすじ:\n新しい筋");
        let mut meta = details();
        merge_sections(&mut meta, &parsed, IdeaTarget::Item(IdeaItem::Synopsis));
        assert_eq!(meta.title, "星降る夜");
        assert_eq!(meta.synopsis, "新しい筋");

        merge_sections(&mut meta, &parsed, IdeaTarget::All);
        assert_eq!(meta.title, "新題");
        assert_eq!(meta.keywords.len(), 3);
    }

    fn snapshot(metadata: Metadata) -> EvaluatedDocument {
        EvaluatedDocument {
            body: String::new(),
            metadata,
            authors_note: String::new(),
            rating: Rating::General,
        }
    }

    #[test]
    fn fast_prompt_appends_prefill() {
        let doc = snapshot(details());
        let idea = build_idea_prompt(
            &PromptAssembler::default(),
            &doc,
            IdeaTarget::Item(IdeaItem::Genres),
            IdeaMethod::Fast,
        );
        assert!(idea.prefill.starts_with("# タイトル:"));
        assert_eq!(idea.task, TaskType::IdeaInfo);
        assert!(idea.prompt.ends_with("[/INST]# タイトル:\n星降る夜\n\n# キーワード:\n魔法\n旅\n\n"));
        assert_eq!(idea.stop_sequences, vec!["\n# あらすじ:".to_string()]);
        assert!(idea.missing.is_empty());
    }

    #[test]
    fn fast_title_falls_back_to_safe() {
        let doc = snapshot(Metadata::default());
        let idea = build_idea_prompt(
            &PromptAssembler::default(),
            &doc,
            IdeaTarget::Item(IdeaItem::Title),
            IdeaMethod::Fast,
        );
        assert!(idea.prefill.is_empty());
        assert_eq!(idea.task, TaskType::IdeaZero);
        assert!(idea.prompt.ends_with("[/INST]"));
        assert_eq!(idea.stop_sequences, vec!["\n# キーワード:".to_string()]);
    }
}
