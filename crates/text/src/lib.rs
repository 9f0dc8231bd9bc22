//! Prompt-injection sanitization and Korean PII masking
//!
//! Two independent passes (§4.1): `sanitize` runs on the user query before
//! it reaches the classifier/generator and replaces injection attempts
//! with `[FILTERED]`; `pii_masker` runs only on text headed for logs.

pub mod pii_masker;
pub mod sanitizer;

pub use pii_masker::{detect, mask_for_logging};
pub use sanitizer::{sanitize, SanitizeReason, SanitizeResult};
