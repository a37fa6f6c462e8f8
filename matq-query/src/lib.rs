//! Question answering over material qualification data.
//!
//! [`resolver::QueryResolver`] tries each configured strategy in order
//! (fact store, exact table match, semantic fallback) and returns the first
//! answer. [`pipeline`] builds the resolver and its collaborators from a
//! [`matq_core::MatqConfig`].

pub mod pipeline;
pub mod resolver;
pub mod strategies;

pub use pipeline::{bootstrap, PipelineError, StrategyKind};
pub use resolver::{QueryContext, QueryResolver, Resolution, ResolutionStrategy, ResolveError};
