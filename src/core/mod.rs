// Public modules
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod push;
pub mod retry;
pub mod scheduler;
pub mod secrets;
pub mod selector;
pub mod source;
pub mod template;
pub mod validator;
pub mod variables;
pub mod version;

// Internal modules - not part of public API
pub(crate) mod document;
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use output::{
    AppDeployment, BulkSummary, DeployReport, ItemOutcome, PromoteReport, PromotedContainer,
    PushReport,
};
pub use pipeline::{DeployOptions, Pipeline, PromoteOptions, PushOptions, Services};
