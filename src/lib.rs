#![deny(missing_docs)]

//! Tag-scoped semantic search over a document memory store.
//!
//! The storage, embedding, and text-generation backends are selected at
//! runtime from configuration: a raw configuration tree is normalized,
//! validated, and composed into an [`composer::Engine`] whose
//! [`search::SearchExecutor`] answers tag-filtered, relevance-thresholded
//! queries with ranked citations.

/// Backend traits and built-in implementations.
pub mod backends;
/// One-time service composition into a shareable engine.
pub mod composer;
/// Configuration tree, typed sections, and normalization.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Named backend factories with case-insensitive resolution.
pub mod registry;
/// Search filters, execution, and result shaping.
pub mod search;
