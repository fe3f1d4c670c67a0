//! End-to-end tests for the Wannabe pipeline.
//!
//! These run a project file through template evaluation, classification,
//! assembly and fitting against scripted servers, then feed the prompt to a
//! scripted generator the way the CLI does.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wannabe_core::error::ProviderError;
use wannabe_core::oracle::{GenerationRequest, TextGenerator, TokenOracle, TokenStream};
use wannabe_core::project::save_output_text;
use wannabe_core::{DocumentState, Metadata, Mode, ProjectFile, Rating, TaskType};
use wannabe_prompt::idea::{filter_output, parse_sections};
use wannabe_prompt::{
    CompressionMode, CompressionPolicy, CompressionQuality, EvaluatedDocument, FitError,
    IdeaItem, IdeaMethod, IdeaTarget, PromptAssembler, PromptFitter, QualityThresholds,
    ScriptedChooser, build_idea_prompt, merge_sections,
};

// ── Scripted server ──────────────────────────────────────────────────────

/// Counts one token per character against a fixed context window.
struct ScriptedOracle {
    context: Option<u32>,
    counting: bool,
}

impl ScriptedOracle {
    fn with_context(context: u32) -> Self {
        Self {
            context: Some(context),
            counting: true,
        }
    }

    fn offline() -> Self {
        Self {
            context: None,
            counting: false,
        }
    }
}

#[async_trait::async_trait]
impl TokenOracle for ScriptedOracle {
    async fn count_tokens(&self, text: &str) -> Option<u32> {
        self.counting.then(|| text.chars().count() as u32)
    }

    async fn true_max_context_length(&self) -> Option<u32> {
        self.context
    }
}

/// Streams a fixed list of fragments and records the request it got.
struct ScriptedGenerator {
    fragments: Vec<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn last_request(&self) -> GenerationRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<TokenStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = mpsc::channel(16);
        for fragment in &self.fragments {
            tx.send(Ok(fragment.clone())).await.unwrap();
        }
        Ok(rx)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn story_body(lines: usize) -> String {
    let mut body: Vec<String> = (0..lines).map(|i| format!("第{i:02}行の文章です。")).collect();
    body.push("最後の行です。".into());
    body.join("\n")
}

fn story_project() -> ProjectFile {
    let doc = DocumentState::new(story_body(30))
        .with_metadata(Metadata {
            title: "星降る夜".into(),
            keywords: vec!["魔法".into(), "旅".into()],
            ..Metadata::default()
        })
        .with_rating(Rating::General);
    ProjectFile::from_document(&doc, "メモは送らない")
}

fn policy() -> CompressionPolicy {
    CompressionPolicy::new(CompressionMode::TokenDynamic { step_chars: 20 })
}

// ── Generation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn project_file_to_saved_continuation() {
    let dir = tempfile::tempdir().unwrap();
    let project_path = dir.path().join("story.json");
    story_project().save(&project_path).unwrap();

    let project = ProjectFile::load(&project_path).unwrap();
    let oracle = ScriptedOracle::with_context(4096);
    let result = PromptFitter::new(&oracle, policy())
        .fit(&Mode::Generate, &project.to_document(), 250)
        .await
        .unwrap();

    assert_eq!(result.task, TaskType::ContInfo);
    assert!(!result.overflow);
    assert!(!result.is_compressed());
    assert!(result.prompt.starts_with("<s>[INST]"));
    assert!(result.prompt.contains("# タイトル:\n星降る夜"));
    assert!(!result.prompt.contains("メモは送らない"));

    let generator = ScriptedGenerator::new(&["彼は", "歩き出した。"]);
    let text = generator
        .generate(GenerationRequest::new(result.prompt.clone(), 250))
        .await
        .unwrap();
    assert_eq!(text, "彼は歩き出した。");
    assert_eq!(generator.last_request().prompt, result.prompt);

    let out_path = dir.path().join("out").join("continuation.txt");
    save_output_text(&out_path, &text, Some(&project.details.title)).unwrap();
    let saved = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(saved, "# 星降る夜\n\n彼は歩き出した。");
}

#[tokio::test]
async fn tight_context_trims_oldest_text() {
    let project = story_project();
    let oracle = ScriptedOracle::with_context(300);
    let result = PromptFitter::new(&oracle, policy())
        .fit(&Mode::Generate, &project.to_document(), 50)
        .await
        .unwrap();

    assert!(!result.overflow);
    assert!(result.is_compressed());
    assert!(result.total_tokens <= 250);
    assert!(result.prompt.contains("最後の行です。"));
    assert!(!result.prompt.contains("第00行"));
    assert_eq!(
        result.quality(&QualityThresholds::default()),
        CompressionQuality::Degraded
    );
}

#[tokio::test]
async fn offline_server_uses_fallbacks() {
    let project = story_project();
    let oracle = ScriptedOracle::offline();
    let result = PromptFitter::new(&oracle, policy())
        .fit(&Mode::Generate, &project.to_document(), 250)
        .await
        .unwrap();

    assert_eq!(result.available_tokens, 8192 - 250);
    assert!(!result.overflow);
    assert!(!result.is_compressed());
}

#[tokio::test]
async fn cancelled_run_never_returns_a_prompt() {
    let token = CancellationToken::new();
    token.cancel();
    let oracle = ScriptedOracle::with_context(4096);
    let outcome = PromptFitter::new(&oracle, policy())
        .with_cancellation(token)
        .fit(&Mode::Generate, &story_project().to_document(), 250)
        .await;
    assert!(matches!(outcome, Err(FitError::Cancelled)));
}

#[tokio::test]
async fn templates_resolve_before_fitting() {
    let doc = DocumentState::new("没の冒頭\n@break\n一行目。\n@// 内緒\n二行目。\n三行目。\n四行目。")
        .with_authors_note("{静かに|激しく}描写する");
    let snapshot = EvaluatedDocument::evaluate(&doc, Rating::Mature, &mut ScriptedChooser::new([1]));
    assert_eq!(snapshot.authors_note, "激しく描写する");

    let oracle = ScriptedOracle::with_context(4096);
    let result = PromptFitter::new(&oracle, policy())
        .fit_evaluated(&Mode::Generate, snapshot, 250)
        .await
        .unwrap();

    assert_eq!(result.task, TaskType::ContZero);
    assert!(result.prompt.contains("レーティング: r18"));
    assert!(result.prompt.contains("【オーサーズノート】\n```\n激しく描写する\n```"));
    assert!(!result.prompt.contains("没の冒頭"));
    assert!(!result.prompt.contains("内緒"));
}

// ── Ideas ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fast_idea_fills_in_genres() {
    let dir = tempfile::tempdir().unwrap();
    let project_path = dir.path().join("story.json");
    let project = story_project();
    project.save(&project_path).unwrap();

    let mut document = project.to_document();
    let snapshot = EvaluatedDocument::evaluate(&document, Rating::General, &mut ScriptedChooser::default());
    let idea = build_idea_prompt(
        &PromptAssembler::default(),
        &snapshot,
        IdeaTarget::Item(IdeaItem::Genres),
        IdeaMethod::Fast,
    );
    assert_eq!(idea.task, TaskType::IdeaInfo);
    assert!(idea.missing.is_empty());

    let generator = ScriptedGenerator::new(&["# ジャンル:\n", "ファンタジー\n- 冒険\n", "# あらすじ:\n余計"]);
    let mut request = GenerationRequest::new(idea.prompt.clone(), 1000);
    request.stop_sequences = idea.stop_sequences.clone();
    let text = generator.generate(request).await.unwrap();
    assert_eq!(generator.last_request().stop_sequences, vec!["\n# あらすじ:".to_string()]);

    let answer = format!("{}{}", idea.prefill, text);
    let section = filter_output(&answer, IdeaTarget::Item(IdeaItem::Genres));
    assert_eq!(section, "# ジャンル:\nファンタジー\n- 冒険");

    let parsed = parse_sections(&section);
    merge_sections(&mut document.metadata, &parsed, IdeaTarget::Item(IdeaItem::Genres));
    ProjectFile::from_document(&document, project.memo_text.clone())
        .save(&project_path)
        .unwrap();

    let reloaded = ProjectFile::load(&project_path).unwrap();
    assert_eq!(reloaded.details.genres, vec!["ファンタジー".to_string(), "冒険".to_string()]);
    assert_eq!(reloaded.details.title, "星降る夜");
    assert_eq!(reloaded.memo_text, "メモは送らない");
}

#[tokio::test]
async fn idea_prompt_ignores_body() {
    let snapshot = EvaluatedDocument::evaluate(
        &story_project().to_document(),
        Rating::General,
        &mut ScriptedChooser::default(),
    );
    let oracle = ScriptedOracle::with_context(4096);
    let result = PromptFitter::new(&oracle, policy())
        .fit_evaluated(&Mode::Idea, snapshot, 1000)
        .await
        .unwrap();

    assert_eq!(result.task, TaskType::IdeaInfo);
    assert!(!result.prompt.contains("最後の行です。"));
    assert!(result.prompt.ends_with("[/INST]"));
}
