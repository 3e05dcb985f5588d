pub mod cli;
pub mod config;
pub mod error;
pub mod language;
pub mod output;
pub mod render;
pub mod sandbox;

pub use error::{PolyrunError, Result};
pub use language::{EngineBinding, LanguageDescriptor};
pub use output::{ExecutionOutput, OutputKind, SqlResult};
pub use sandbox::{create_router, ExecutionRequest, ProjectFile, Router};
