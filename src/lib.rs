//! IEDP - Intelligent Enterprise Document Processing
//!
//! Indexes text, tables, PDFs and images with a hybrid dense+sparse retriever,
//! reasons over retrieved fragments with a multimodal reasoner, and runs
//! multi-step analysis and extraction tasks through a bounded orchestrator.
//! The same engine backs the `iedp` CLI and the HTTP API.

pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod reasoning;
pub mod retrieval;
pub mod server;
pub mod text;

pub use error::{IedpError, Result};
