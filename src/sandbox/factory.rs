use std::path::Path;
use std::sync::Arc;

use crate::config::{get_cache_dir, PolyrunConfig};
use crate::error::Result;
use crate::sandbox::router::{Backends, Router};
use crate::sandbox::traits::ExecutionBackend;

#[cfg(feature = "javascript")]
use crate::sandbox::backends::ScriptBackend;

#[cfg(feature = "python")]
use crate::sandbox::backends::{PackageInstaller, PythonBackend, WasiLoader};

#[cfg(not(all(feature = "javascript", feature = "python")))]
use crate::sandbox::traits::UnavailableBackend;

use crate::sandbox::backends::{RemoteBackend, SqlBackend};

/// Create a router with every backend built from the configuration.
///
/// Runtimes are not loaded here; the Python interpreter and the database are
/// opened on first use.
pub fn create_router(config: &PolyrunConfig) -> Result<Router> {
    create_router_in(config, &get_cache_dir())
}

/// Like [`create_router`], with downloads and installed packages kept under `cache_dir`.
pub fn create_router_in(config: &PolyrunConfig, cache_dir: &Path) -> Result<Router> {
    Ok(Router::new(Backends {
        script: script_backend(config),
        python: python_backend(config, cache_dir),
        sql: Arc::new(SqlBackend::new(&config.database)),
        remote: Arc::new(RemoteBackend::new(config.remote.clone())?),
    }))
}

#[cfg(feature = "javascript")]
fn script_backend(config: &PolyrunConfig) -> Arc<dyn ExecutionBackend> {
    Arc::new(ScriptBackend::new(&config.script))
}

#[cfg(not(feature = "javascript"))]
fn script_backend(_config: &PolyrunConfig) -> Arc<dyn ExecutionBackend> {
    Arc::new(UnavailableBackend::new(
        "script",
        "JavaScript support was not compiled in. Rebuild with --features javascript",
    ))
}

#[cfg(feature = "python")]
fn python_backend(config: &PolyrunConfig, cache_dir: &Path) -> Arc<dyn ExecutionBackend> {
    let loader = WasiLoader::new(config.python.clone(), cache_dir);
    let installer = PackageInstaller::new(
        config.python.package_index_url.clone(),
        loader.site_packages(),
    );
    Arc::new(PythonBackend::new(Arc::new(loader)).with_packages(installer))
}

#[cfg(not(feature = "python"))]
fn python_backend(_config: &PolyrunConfig, _cache_dir: &Path) -> Arc<dyn ExecutionBackend> {
    Arc::new(UnavailableBackend::new(
        "python",
        "Python support was not compiled in. Rebuild with --features python",
    ))
}

/// Get information about the execution backends in this build.
pub fn available_backends(config: &PolyrunConfig) -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "javascript")]
    {
        backends.push(BackendInfo {
            name: "script",
            available: true,
            description: "JavaScript and TypeScript on embedded V8",
            unavailable_reason: None,
        });
    }

    #[cfg(not(feature = "javascript"))]
    {
        backends.push(BackendInfo {
            name: "script",
            available: false,
            description: "JavaScript and TypeScript on embedded V8",
            unavailable_reason: Some("Not compiled in (use --features javascript)".to_string()),
        });
    }

    #[cfg(feature = "python")]
    {
        backends.push(BackendInfo {
            name: "python",
            available: true,
            description: "CPython compiled to WASI, run on Wasmtime",
            unavailable_reason: None,
        });
    }

    #[cfg(not(feature = "python"))]
    {
        backends.push(BackendInfo {
            name: "python",
            available: false,
            description: "CPython compiled to WASI, run on Wasmtime",
            unavailable_reason: Some("Not compiled in (use --features python)".to_string()),
        });
    }

    backends.push(BackendInfo {
        name: "sql",
        available: true,
        description: "Embedded SQLite",
        unavailable_reason: None,
    });

    backends.push(BackendInfo {
        name: "remote",
        available: !config.remote.base_url.is_empty(),
        description: "Compiled languages on a Piston-compatible service",
        unavailable_reason: if config.remote.base_url.is_empty() {
            Some("No execution service configured (remote.base_url)".to_string())
        } else {
            None
        },
    });

    backends
}

/// Information about an execution backend.
pub struct BackendInfo {
    pub name: &'static str,
    pub available: bool,
    pub description: &'static str,
    pub unavailable_reason: Option<String>,
}
