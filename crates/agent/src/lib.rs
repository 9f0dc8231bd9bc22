//! Domain classifier, decomposer, rewriter, response generator, evaluator,
//! and action-suggestion rules (components L6-L8, L10-L11, §4.5-§4.9).
//!
//! Each stage is independently constructible and testable against a mock
//! `LanguageModel`; the router crate wires them into the `RouterState`
//! pipeline in classify -> decompose -> rewrite -> retrieve -> generate ->
//! evaluate order.

pub mod actions;
pub mod classifier;
pub mod decomposer;
pub mod evaluator;
pub mod generator;
pub mod rewriter;

pub use actions::suggest_actions;
pub use classifier::{ClassifierConfig, DomainClassifier};
pub use decomposer::{DecomposerConfig, QuestionDecomposer};
pub use evaluator::{Evaluator, EvaluatorConfig};
pub use generator::{DomainContext, GeneratedAnswer, GeneratorConfig, ResponseGenerator};
pub use rewriter::{QueryRewriter, RewriterConfig};
