pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod research;
pub mod tools;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{ErrorDescriptor, FailureStage, ResearchError};
pub use research::{
    Collaborators, ControllerOptions, ResearchMode, ResearchRequest, ResearchResponse,
    ResearchService, RoundController, SessionStatus,
};
