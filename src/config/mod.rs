pub mod loader;
pub mod types;

pub use loader::{get_cache_dir, get_config_path, load_config};
pub use types::{
    DatabaseConfig, PolyrunConfig, PythonConfig, RemoteConfig, ScriptConfig,
    DEFAULT_ALLOWED_GLOBALS,
};
