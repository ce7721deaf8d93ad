//! ARGO float profile store with a natural-language query pipeline.
//!
//! Profiles are ingested in bulk, stored in SQLite, and queried either
//! directly or through a chat endpoint that asks a generative model for a
//! filter, normalizes it, runs it and summarizes the matches.

pub mod app;
pub mod chat;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod filter;
pub mod ingestion;
pub mod llm;
pub mod observability;
pub mod profile;
pub mod server;
pub mod summarizer;
pub mod time;
pub mod translator;

pub use app::App;
pub use error::{ArgoError, Result};
