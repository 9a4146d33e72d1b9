//! Metadata resolution engine for human-typed media filenames.
//!
//! The crate turns a noisy filename (`Show.Name.S02E05.mkv`) into structured
//! search criteria, resolves those criteria against a remote metadata
//! provider, ranks the candidates, and renders a canonical name from a
//! user-configurable template. Presentation, manual disambiguation and any
//! file-system side effects are left to the caller.

mod batch;
mod cache;
mod criteria;
mod matcher;
mod orchestrator;
mod parser;
mod provider;
mod template;
mod tree;


pub use batch::{BatchDriver, BatchConfig};
pub use cache::{RequestCache, RequestKey, RequestKind};
pub use criteria::{MediaType, SearchCriteria, SeedFields};
pub use matcher::{RankedResults, is_better_match, is_match};
pub use orchestrator::{
    ImageConfig, Orchestrator, OrchestratorConfig, SearchEvent, SearchOutcome,
};
pub use parser::{NameParser, ParsedName, ParserConfig};
pub use provider::{HttpTransport, Transport, TransportResponse};
pub use template::{ResultView, TemplateEngine};
pub use tree::{
    CandidateData, DELETE_MARKER_TITLE, NOT_FOUND_TITLE, NodeId, ResultTree,
};

/// Engine result type
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Id mismatch: requested {requested}, provider returned {received}")]
    IdMismatch { requested: String, received: String },

    #[error("Configuration fetch failed after {attempts} attempts: {message}")]
    ConfigFetch { attempts: u32, message: String },

    #[error("No results match search criteria: {0}")]
    NoMatch(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is the provider's "resource not found" response
    /// rather than a transport or protocol failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
