//! Prompt composition for Wannabe.
//!
//! A document goes through four stages before it reaches the model:
//!
//! 1. **Evaluate** the body, details and author's note as templates
//!    (comments, `@break`/`@endpoint` regions, `{a|b}` alternatives)
//! 2. **Classify** the document into a [`TaskType`](wannabe_core::TaskType)
//! 3. **Assemble** the instruction-wrapped prompt for that task
//! 4. **Fit** the prompt into the server's context window, shrinking the
//!    body from the front until it fits
//!
//! Idea runs use the same assembler, plus the section helpers in [`idea`].

pub mod assembler;
pub mod classifier;
pub mod fitter;
pub mod idea;
pub mod template;
pub mod token;

pub use assembler::{
    BodyPartition, EvaluatedDocument, PromptAssembler, PromptParts, classify_and_build_prompt,
};
pub use classifier::classify;
pub use fitter::{
    CompressionMode, CompressionPolicy, CompressionQuality, CompressionResult, FitError,
    PromptFitter, QualityThresholds, fit_prompt_to_budget,
};
pub use idea::{IdeaItem, IdeaMethod, IdeaPrompt, IdeaTarget, build_idea_prompt, merge_sections};
pub use template::{
    Chooser, FirstChooser, ScriptedChooser, TemplateSpans, ThreadRngChooser, evaluate_template,
    is_position_in_active_region,
};
pub use token::estimate_tokens;
