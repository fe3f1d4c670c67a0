//! Template evaluation for free-text fields.
//!
//! Every free-text field may embed a small directive language:
//!
//! | Syntax | Effect |
//! |--------|--------|
//! | `@// ...` | line comment, removed together with its line break |
//! | `@/* ... @*/` | block comment, may span lines |
//! | `@break`, `@startpoint` | the active region starts after the last one |
//! | `@endpoint` | the active region ends before the first one after the start |
//! | `{a\|b\|"c d"}` | replaced by one option chosen at random |
//!
//! Comments and markers are located once into sorted, non-overlapping
//! [`Span`]s ([`TemplateSpans`]). Evaluation and the cursor predicate
//! [`is_position_in_active_region`] share that computation.
//!
//! Evaluation never fails. Anything that does not parse is passed through.

use rand::Rng;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)@/\*.*?@\*/").expect("valid block comment pattern"));
static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@//[^\r\n]*").expect("valid line comment pattern"));
static START_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@break|@startpoint").expect("valid start marker pattern"));
static END_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@endpoint").expect("valid end marker pattern"));
static ALTERNATIVES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("valid alternatives pattern"));
static OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|'[^']*'|[^|]+"#).expect("valid option pattern"));

// ── Random choice ─────────────────────────────────────────────────────────

/// Source of the random pick for `{a|b}` groups.
pub trait Chooser {
    /// Pick an index in `0..n`. `n` is never zero.
    fn choose(&mut self, n: usize) -> usize;
}

/// Uniform choice from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngChooser;

impl Chooser for ThreadRngChooser {
    fn choose(&mut self, n: usize) -> usize {
        rand::thread_rng().gen_range(0..n)
    }
}

/// Always the first option. Makes evaluation deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstChooser;

impl Chooser for FirstChooser {
    fn choose(&mut self, _n: usize) -> usize {
        0
    }
}

/// Replays a fixed list of picks (wrapped modulo `n`), then falls back to 0.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChooser {
    picks: std::collections::VecDeque<usize>,
}

impl ScriptedChooser {
    pub fn new(picks: impl IntoIterator<Item = usize>) -> Self {
        Self {
            picks: picks.into_iter().collect(),
        }
    }
}

impl Chooser for ScriptedChooser {
    fn choose(&mut self, n: usize) -> usize {
        self.picks.pop_front().map_or(0, |pick| pick % n)
    }
}

// ── Spans ─────────────────────────────────────────────────────────────────

/// Half-open byte range `[start, end)` into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Drop empty spans, sort, and merge overlapping or touching ones.
fn normalize_spans(mut spans: Vec<Span>) -> Vec<Span> {
    spans.retain(|s| !s.is_empty());
    spans.sort();

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(prev) if span.start <= prev.end => prev.end = prev.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Whether `pos` falls inside any span of a normalized list.
fn in_spans(spans: &[Span], pos: usize) -> bool {
    let idx = spans.partition_point(|s| s.start <= pos);
    idx > 0 && spans[idx - 1].contains(pos)
}

/// Directive layout of one text, in byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSpans {
    /// Comment spans, line comments including their line break.
    pub comments: Vec<Span>,
    /// `@break`, `@startpoint` and `@endpoint` occurrences outside comments.
    pub controls: Vec<Span>,
    /// Text outside the active region.
    pub disabled: Vec<Span>,
    /// The active region.
    pub active: Span,
}

impl TemplateSpans {
    /// Locate comments, markers, and the active region of `text`.
    pub fn scan(text: &str) -> Self {
        let mut comments: Vec<Span> = BLOCK_COMMENT
            .find_iter(text)
            .map(|m| Span::new(m.start(), m.end()))
            .collect();

        let bytes = text.as_bytes();
        for m in LINE_COMMENT.find_iter(text) {
            let mut end = m.end();
            match bytes.get(end) {
                Some(b'\r') if bytes.get(end + 1) == Some(&b'\n') => end += 2,
                Some(b'\r') | Some(b'\n') => end += 1,
                _ => {}
            }
            comments.push(Span::new(m.start(), end));
        }
        let comments = normalize_spans(comments);

        let mut controls = Vec::new();
        let mut last_start_marker_end = None;
        for m in START_MARKER.find_iter(text) {
            if in_spans(&comments, m.start()) {
                continue;
            }
            last_start_marker_end = Some(m.end());
            controls.push(Span::new(m.start(), m.end()));
        }
        let start = last_start_marker_end.unwrap_or(0);

        let mut end = None;
        for m in END_MARKER.find_iter(text) {
            if in_spans(&comments, m.start()) {
                continue;
            }
            controls.push(Span::new(m.start(), m.end()));
            if end.is_none() && m.start() >= start {
                end = Some(m.start());
            }
        }
        let end = end.unwrap_or(text.len());

        let disabled = normalize_spans(vec![Span::new(0, start), Span::new(end, text.len())]);

        Self {
            comments,
            controls: normalize_spans(controls),
            disabled,
            active: Span::new(start, end),
        }
    }

    /// The active region with comments and markers cut out.
    pub fn active_text(&self, text: &str) -> String {
        let removed: Vec<Span> = self.comments.iter().chain(&self.controls).copied().collect();
        let removed = normalize_spans(removed);

        let mut out = String::with_capacity(self.active.end - self.active.start);
        let mut cursor = self.active.start;
        for span in removed {
            if span.end <= cursor {
                continue;
            }
            if span.start >= self.active.end {
                break;
            }
            if span.start > cursor {
                out.push_str(&text[cursor..span.start]);
            }
            cursor = span.end;
        }
        if cursor < self.active.end {
            out.push_str(&text[cursor..self.active.end]);
        }
        out
    }
}

// ── Evaluation ────────────────────────────────────────────────────────────

/// Evaluate `text` with uniformly random alternatives.
pub fn evaluate_template(text: &str) -> String {
    evaluate_template_with(text, &mut ThreadRngChooser)
}

/// Evaluate `text`, picking alternatives with `chooser`.
pub fn evaluate_template_with(text: &str, chooser: &mut dyn Chooser) -> String {
    let stripped = strip_directives(text);
    if !stripped.contains('{') {
        return stripped;
    }
    expand_alternatives(&stripped, chooser)
}

/// Apply comments and range markers only. Deterministic.
pub fn strip_directives(text: &str) -> String {
    if !text.contains('@') {
        return text.to_string();
    }
    TemplateSpans::scan(text).active_text(text)
}

fn expand_alternatives(text: &str, chooser: &mut dyn Chooser) -> String {
    ALTERNATIVES
        .replace_all(text, |caps: &Captures<'_>| {
            let options: Vec<&str> = OPTION
                .find_iter(&caps[1])
                .map(|m| m.as_str().trim())
                .filter(|opt| !opt.is_empty())
                .collect();

            if options.is_empty() {
                return caps[0].to_string();
            }

            let picked = options[chooser.choose(options.len()).min(options.len() - 1)];
            strip_outer_quotes(picked).to_string()
        })
        .into_owned()
}

fn strip_outer_quotes(option: &str) -> &str {
    if option.len() >= 2 {
        for quote in ['"', '\''] {
            if option.starts_with(quote) && option.ends_with(quote) {
                return &option[1..option.len() - 1];
            }
        }
    }
    option
}

/// Whether the character at `offset` (counted in chars, like an editor
/// cursor) takes part in evaluation.
///
/// True when the offset lies in the active region and outside every comment
/// and marker. A cursor at the very end of the text counts as inside when
/// the active region runs to the end.
pub fn is_position_in_active_region(text: &str, offset: usize) -> bool {
    let Some(pos) = char_to_byte(text, offset) else {
        return false;
    };

    let spans = TemplateSpans::scan(text);
    let active = spans.active;
    let in_active = active.contains(pos) || (pos == text.len() && active.end == text.len());

    in_active && !in_spans(&spans.comments, pos) && !in_spans(&spans.controls, pos)
}

fn char_to_byte(text: &str, offset: usize) -> Option<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .nth(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_braces_is_unchanged() {
        for text in [
            "",
            "plain text",
            "改行を含む\n本文です。\r\n",
            "trailing } brace and | pipe",
            "mail@example.com",
        ] {
            assert_eq!(evaluate_template(text), text);
        }
    }

    #[test]
    fn chosen_alternative_is_member() {
        for pick in 0..4 {
            let out = evaluate_template_with(
                r#"Mix: {A|"B C"|D|'E F G'}."#,
                &mut ScriptedChooser::new([pick]),
            );
            assert!(
                ["Mix: A.", "Mix: B C.", "Mix: D.", "Mix: E F G."].contains(&out.as_str()),
                "{out}"
            );
        }
    }

    #[test]
    fn quoted_option_keeps_pipe_and_loses_quotes() {
        let out = evaluate_template_with(r#"{"a | b"|c}"#, &mut FirstChooser);
        assert_eq!(out, "a | b");
    }

    #[test]
    fn options_are_trimmed() {
        let out = evaluate_template_with("{  option1  |  \" option 2 \" }", &mut ScriptedChooser::new([1]));
        assert_eq!(out, " option 2 ");
    }

    #[test]
    fn every_alternative_is_reachable() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(evaluate_template("{1|2|3}"));
        }
        assert_eq!(seen.len(), 3, "{seen:?}");
    }

    #[test]
    fn adjacent_groups_evaluate_independently() {
        let out = evaluate_template_with("{one|two}{three|four}", &mut ScriptedChooser::new([1, 0]));
        assert_eq!(out, "twothree");
    }

    #[test]
    fn empty_groups_stay_verbatim() {
        assert_eq!(evaluate_template("No options: {}"), "No options: {}");
        assert_eq!(evaluate_template("Empty: { | }"), "Empty: { | }");
    }

    #[test]
    fn line_comment_removed_with_newline() {
        assert_eq!(evaluate_template("@//comment\nrest"), "rest");
        assert_eq!(evaluate_template("a@// note\r\nb"), "ab");
        assert_eq!(evaluate_template("a\n@// last line"), "a\n");
    }

    #[test]
    fn block_comment_spans_lines() {
        assert_eq!(evaluate_template("前@/* 一行目\n二行目 @*/後"), "前後");
        assert_eq!(evaluate_template("@/*a@*/x@/*b@*/"), "x");
    }

    #[test]
    fn unterminated_block_comment_is_text() {
        assert_eq!(evaluate_template("keep @/* this"), "keep @/* this");
    }

    #[test]
    fn break_and_endpoint_select_region() {
        assert_eq!(evaluate_template("A@breakB@endpointC"), "B");
    }

    #[test]
    fn last_start_marker_wins() {
        assert_eq!(evaluate_template("x@breaky@startpointz"), "z");
    }

    #[test]
    fn endpoint_before_start_is_ignored() {
        assert_eq!(evaluate_template("a@endpointb@breakc@endpointd@endpointe"), "c");
    }

    #[test]
    fn markers_inside_comments_do_not_count() {
        assert_eq!(evaluate_template("A@//@break\nB"), "AB");
        assert_eq!(evaluate_template("A@/*@endpoint@*/B"), "AB");
    }

    #[test]
    fn comments_removed_before_alternatives() {
        let out = evaluate_template_with("{a|@//x\nb}", &mut ScriptedChooser::new([1]));
        assert_eq!(out, "b");
    }

    #[test]
    fn position_validity_follows_region() {
        let text = "A@breakB@endpointC";
        let valid: Vec<usize> = (0..=text.chars().count())
            .filter(|&i| is_position_in_active_region(text, i))
            .collect();
        assert_eq!(valid, vec![7]);
    }

    #[test]
    fn position_validity_excludes_comments() {
        let text = "本文@//注釈\n続き";
        assert!(is_position_in_active_region(text, 0));
        assert!(is_position_in_active_region(text, 1));
        assert!(!is_position_in_active_region(text, 2));
        assert!(!is_position_in_active_region(text, 7));
        assert!(is_position_in_active_region(text, 8));
        // end of text
        assert!(is_position_in_active_region(text, 10));
        assert!(!is_position_in_active_region(text, 11));
    }

    #[test]
    fn spans_are_sorted_and_merged() {
        let text = "@/* a @// b @*/ c @// d\ne";
        let spans = TemplateSpans::scan(text);
        // the block comment and both line comments overlap into one span
        assert_eq!(spans.comments, vec![Span::new(0, 24)]);
        assert_eq!(spans.active, Span::new(0, text.len()));
        assert!(spans.disabled.is_empty());
        assert_eq!(evaluate_template(text), "e");

        let merged = normalize_spans(vec![Span::new(5, 8), Span::new(0, 2), Span::new(2, 3), Span::new(9, 9)]);
        assert_eq!(merged, vec![Span::new(0, 3), Span::new(5, 8)]);
    }

    #[test]
    fn disabled_spans_cover_outside_region() {
        let text = "head@breakbody@endpointtail";
        let spans = TemplateSpans::scan(text);
        assert_eq!(spans.active, Span::new(10, 14));
        assert_eq!(spans.disabled, vec![Span::new(0, 10), Span::new(14, text.len())]);
        assert_eq!(spans.controls.len(), 2);
    }
}
