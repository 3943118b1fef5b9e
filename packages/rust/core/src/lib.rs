//! Core domain logic for numsheet.
//!
//! This crate turns cached source data into a corpus of number pages and
//! verifies the result:
//! - [`facts`]: arithmetic facts for `0..=999`
//! - [`page`] and [`render`]: the page model and its Markdown form
//! - [`generator`]: the per-range generate pipeline (`generate`)
//! - [`linkcheck`]: navigation and link integrity of a written corpus

pub mod corpus;
pub mod facts;
pub mod generator;
pub mod linkcheck;
pub mod page;
pub mod render;

pub use corpus::{Corpus, WriteOutcome};
pub use generator::{
    GenerateReport, ProgressReporter, RangeReport, RunContext, SilentProgress, SourcePlan, generate,
};
pub use linkcheck::{LinkReport, LinkViolation, ViolationKind, check_corpus};
pub use page::{NavKind, NumberPage};
