//! CPython compiled for WASI, run under Wasmtime.
//!
//! Artifacts come from the configured URLs and are cached under the cache
//! directory:
//!
//! ```text
//! <cache>/python/python.wasm       interpreter module
//! <cache>/python/root/             guest "/" (usr/local/lib/python3.x lives here)
//! <cache>/python/site-packages/    guest "/site-packages", on PYTHONPATH
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, Linker, Module, Store, Trap};
use wasmtime_wasi::p1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit, WasiCtxBuilder};

use super::capture::CaptureContext;
use super::{GuestExit, Interpreter, InterpreterLoader, RunOutcome};
use crate::config::PythonConfig;
use crate::error::{PolyrunError, Result};

const GUEST_SITE_PACKAGES: &str = "/site-packages";

/// Environment of every guest run. stdout is a pipe, so it must be unbuffered
/// for output written before a trap to reach the capture.
const GUEST_ENV: &[(&str, &str)] = &[
    ("PYTHONPATH", GUEST_SITE_PACKAGES),
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONDONTWRITEBYTECODE", "1"),
];

/// Marks a fully extracted standard library.
const EXTRACTED_MARKER: &str = ".extracted";

fn load_error(reason: impl Into<String>) -> PolyrunError {
    PolyrunError::RuntimeLoad {
        runtime: "Python".to_string(),
        reason: reason.into(),
    }
}

pub struct WasiLoader {
    config: PythonConfig,
    cache_dir: PathBuf,
}

impl WasiLoader {
    /// `cache_dir` is the crate cache directory; artifacts go into `python/` below it.
    pub fn new(config: PythonConfig, cache_dir: &Path) -> Self {
        Self {
            config,
            cache_dir: cache_dir.join("python"),
        }
    }

    pub fn site_packages(&self) -> PathBuf {
        self.cache_dir.join("site-packages")
    }
}

#[async_trait]
impl InterpreterLoader for WasiLoader {
    async fn load(&self) -> Result<Box<dyn Interpreter>> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| load_error(format!("Failed to create HTTP client: {}", e)))?;

        let wasm_path = match &self.config.wasm_path {
            Some(path) => {
                if !path.exists() {
                    return Err(load_error(format!("{} does not exist", path.display())));
                }
                path.clone()
            }
            None => {
                let path = self.cache_dir.join("python.wasm");
                get_or_download_wasm(&client, &self.config.wasm_url, &path).await?;
                path
            }
        };

        let root = match &self.config.stdlib_dir {
            Some(dir) => dir.clone(),
            None => {
                let dir = self.cache_dir.join("root");
                get_or_download_stdlib(&client, &self.config.stdlib_url, &dir).await?;
                dir
            }
        };

        let site_packages = self.site_packages();
        tokio::fs::create_dir_all(&site_packages).await?;

        let fuel = self.config.fuel;
        let interpreter = tokio::task::spawn_blocking(move || {
            WasiInterpreter::compile(&wasm_path, root, site_packages, fuel)
        })
        .await
        .map_err(|e| load_error(format!("Compilation task failed: {}", e)))??;

        Ok(Box::new(interpreter))
    }
}

/// Download `url` to `dest` unless it is already cached.
async fn get_or_download_wasm(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        info!(path = %dest.display(), "Using cached Python runtime");
        return Ok(());
    }

    info!(url = %url, "Downloading Python runtime...");
    let bytes = download(client, url).await?;

    // Validate WASM magic
    if bytes.len() < 8 || &bytes[0..4] != b"\0asm" {
        return Err(load_error("Downloaded file is not a WebAssembly module"));
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = dest.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, dest).await?;

    info!(path = %dest.display(), size = bytes.len(), "Cached Python runtime");
    Ok(())
}

/// Download and unpack the standard library archive into `dest`.
async fn get_or_download_stdlib(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    if dest.join(EXTRACTED_MARKER).exists() {
        info!(path = %dest.display(), "Using cached Python standard library");
        return Ok(());
    }

    info!(url = %url, "Downloading Python standard library...");
    let bytes = download(client, url).await?;

    info!("Extracting Python standard library...");
    if dest.exists() {
        // Left over from an interrupted extraction
        tokio::fs::remove_dir_all(dest).await?;
    }
    tokio::fs::create_dir_all(dest).await?;

    let tar_gz = std::io::Cursor::new(bytes);
    let tar = flate2::read::GzDecoder::new(tar_gz);
    let mut archive = tar::Archive::new(tar);
    archive
        .unpack(dest)
        .map_err(|e| load_error(format!("Failed to extract standard library: {}", e)))?;

    tokio::fs::write(dest.join(EXTRACTED_MARKER), b"").await?;
    info!(path = %dest.display(), "Python standard library ready");
    Ok(())
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| load_error(format!("Failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(load_error(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|e| load_error(format!("Failed to read {}: {}", url, e)))
}

/// A compiled interpreter module plus the directories every run mounts.
pub struct WasiInterpreter {
    engine: Engine,
    module: Module,
    root: PathBuf,
    site_packages: PathBuf,
    fuel: u64,
}

impl WasiInterpreter {
    pub fn compile(wasm_path: &Path, root: PathBuf, site_packages: PathBuf, fuel: u64) -> Result<Self> {
        let mut config = Config::new();
        config.consume_fuel(true);

        let engine = Engine::new(&config).map_err(|e| {
            PolyrunError::WasmCompilation(format!("Failed to create Wasmtime engine: {}", e))
        })?;

        info!(path = %wasm_path.display(), "Compiling Python module");
        let module = Module::from_file(&engine, wasm_path)
            .map_err(|e| PolyrunError::WasmCompilation(e.to_string()))?;

        Ok(Self {
            engine,
            module,
            root,
            site_packages,
            fuel,
        })
    }
}

impl Interpreter for WasiInterpreter {
    fn run(&self, code: &str) -> Result<RunOutcome> {
        let capture = CaptureContext::new();

        let mut builder = WasiCtxBuilder::new();
        capture.attach(&mut builder);
        builder.args(&["python", "-c", code]);
        for (key, value) in GUEST_ENV {
            builder.env(*key, *value);
        }
        builder.preopened_dir(&self.root, "/", DirPerms::READ, FilePerms::READ)?;
        builder.preopened_dir(
            &self.site_packages,
            GUEST_SITE_PACKAGES,
            DirPerms::READ,
            FilePerms::READ,
        )?;

        let mut store = Store::new(&self.engine, builder.build_p1());
        store.set_fuel(self.fuel)?;

        let mut linker = Linker::new(&self.engine);
        wasmtime_wasi::p1::add_to_linker_sync(&mut linker, |ctx: &mut WasiP1Ctx| ctx)?;

        let instance = linker.instantiate(&mut store, &self.module)?;
        let start = instance.get_typed_func::<(), ()>(&mut store, "_start")?;

        let exit = match start.call(&mut store, ()) {
            Ok(()) => GuestExit::Exited(0),
            Err(e) => {
                if let Some(exit) = e.downcast_ref::<I32Exit>() {
                    GuestExit::Exited(exit.0)
                } else if matches!(e.downcast_ref::<Trap>(), Some(Trap::OutOfFuel)) {
                    warn!("Python run exhausted its fuel");
                    GuestExit::OutOfFuel
                } else {
                    GuestExit::Trapped(e.to_string())
                }
            }
        };
        drop(store);

        let captured = capture.finish();
        debug!(
            stdout_len = captured.stdout.len(),
            stderr_len = captured.stderr.len(),
            "Python run captured"
        );

        Ok(RunOutcome {
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::testing::serve;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn gzip_tar(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_guest_output_is_unbuffered() {
        assert!(GUEST_ENV.contains(&("PYTHONUNBUFFERED", "1")));
        assert!(GUEST_ENV.contains(&("PYTHONPATH", "/site-packages")));
    }

    #[tokio::test]
    async fn test_wasm_download_is_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let base = serve(axum::Router::new().route(
            "/python.wasm",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { b"\0asm\x01\0\0\0".to_vec() }
            }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("python.wasm");
        let client = reqwest::Client::new();
        let url = format!("{}/python.wasm", base);

        get_or_download_wasm(&client, &url, &dest).await.unwrap();
        get_or_download_wasm(&client, &url, &dest).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_non_wasm_download_is_rejected() {
        let base = serve(axum::Router::new().route(
            "/python.wasm",
            get(|| async { "<html>not found</html>" }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("python.wasm");
        let err = get_or_download_wasm(&reqwest::Client::new(), &format!("{}/python.wasm", base), &dest)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_stdlib_is_extracted_once() {
        let archive = gzip_tar(&[("usr/local/lib/python3.12/os.py", "# os\n")]);
        let base = serve(axum::Router::new().route(
            "/stdlib.tar.gz",
            get(move || {
                let archive = archive.clone();
                async move { archive }
            }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let url = format!("{}/stdlib.tar.gz", base);
        get_or_download_stdlib(&reqwest::Client::new(), &url, &root).await.unwrap();

        assert!(root.join("usr/local/lib/python3.12/os.py").exists());
        assert!(root.join(EXTRACTED_MARKER).exists());
    }

    #[tokio::test]
    async fn test_http_error_is_load_failure() {
        let base = serve(axum::Router::new()).await;
        let dir = tempfile::tempdir().unwrap();
        let err = get_or_download_stdlib(
            &reqwest::Client::new(),
            &format!("{}/missing.tar.gz", base),
            &dir.path().join("root"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PolyrunError::RuntimeLoad { .. }));
        assert!(err.to_string().contains("HTTP 404"));
    }
}
