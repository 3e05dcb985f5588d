//! Best-effort installation of pure-Python packages.
//!
//! Packages are fetched as source distributions from a PyPI-compatible JSON
//! API and only their importable part (`<module>/` or `<module>.py`, at the top
//! of the sdist or under `src/`) is copied into the site-packages directory
//! the interpreter mounts. Nothing is built, so packages with native
//! extensions will not import.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{PolyrunError, Result};
use crate::output::{ansi, ExecutionOutput};

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    info: ProjectMeta,
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

#[derive(Debug, Deserialize)]
struct ProjectMeta {
    name: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    packagetype: String,
    filename: String,
    url: String,
}

pub struct PackageInstaller {
    client: reqwest::Client,
    index_url: String,
    site_packages: PathBuf,
}

impl PackageInstaller {
    pub fn new(index_url: impl Into<String>, site_packages: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            index_url: index_url.into(),
            site_packages,
        }
    }

    /// Install each package independently; one failure does not stop the rest.
    pub async fn install(&self, packages: &[String]) -> ExecutionOutput {
        if packages.is_empty() {
            return ExecutionOutput::console("No packages requested");
        }

        let mut lines = Vec::new();
        let mut failed = false;
        for package in packages {
            match self.install_one(package.trim()).await {
                Ok(line) => lines.push(line),
                Err(e) => {
                    warn!(package = %package, error = %e, "Package installation failed");
                    failed = true;
                    lines.push(ansi::red(&e.to_string()));
                }
            }
        }

        if failed {
            ExecutionOutput::failure(lines.join("\n"))
        } else {
            ExecutionOutput::console(lines.join("\n"))
        }
    }

    async fn install_one(&self, package: &str) -> Result<String> {
        let fail = |reason: String| PolyrunError::PackageInstall {
            package: package.to_string(),
            reason,
        };

        if package.is_empty()
            || !package
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(fail("not a valid package name".to_string()));
        }

        let url = format!("{}/{}/json", self.index_url.trim_end_matches('/'), package);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fail(format!("package index unreachable: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(fail("not found on the package index".to_string()));
        }
        if !response.status().is_success() {
            return Err(fail(format!("package index returned HTTP {}", response.status())));
        }

        let project: ProjectInfo = response
            .json()
            .await
            .map_err(|e| fail(format!("unexpected package index response: {}", e)))?;

        let sdist = project
            .urls
            .iter()
            .find(|file| file.packagetype == "sdist" && file.filename.ends_with(".tar.gz"))
            .ok_or_else(|| fail("no source distribution available".to_string()))?;

        info!(package = %project.info.name, version = %project.info.version, "Downloading sdist");
        let archive = self
            .client
            .get(&sdist.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| fail(format!("download failed: {}", e)))?
            .bytes()
            .await
            .map_err(|e| fail(format!("download failed: {}", e)))?;

        let module = import_name(&project.info.name);
        let site_packages = self.site_packages.clone();
        let extracted = {
            let module = module.clone();
            tokio::task::spawn_blocking(move || extract_package(&archive, &module, &site_packages))
                .await
                .map_err(|e| fail(format!("extraction task failed: {}", e)))?
                .map_err(|e| fail(format!("extraction failed: {}", e)))?
        };

        if extracted == 0 {
            return Err(fail(format!("no importable '{}' module in the sdist", module)));
        }

        info!(package = %project.info.name, files = extracted, "Package installed");
        Ok(format!("Installed {} {}", project.info.name, project.info.version))
    }
}

/// Conventional import name of a distribution (`Foo-Bar` -> `foo_bar`).
fn import_name(project: &str) -> String {
    project.to_ascii_lowercase().replace(['-', '.'], "_")
}

/// Copy the files belonging to `module` out of a `.tar.gz` sdist.
fn extract_package(archive: &[u8], module: &str, site_packages: &Path) -> Result<usize> {
    let tar = flate2::read::GzDecoder::new(archive);
    let mut archive = tar::Archive::new(tar);

    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.into_owned();
        let Some(relative) = package_relative_path(&path, module) else {
            continue;
        };

        let dest = site_packages.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest)?;
        count += 1;
    }
    Ok(count)
}

/// Where an sdist member lands in site-packages, if it belongs to `module`.
///
/// Drops the `<name>-<version>/` prefix and an optional `src/`. Paths with
/// anything but plain components are rejected.
fn package_relative_path(path: &Path, module: &str) -> Option<PathBuf> {
    let parts = path
        .components()
        .map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    let mut rest = parts.get(1..)?;
    if rest.len() > 1 && rest[0] == "src" {
        rest = &rest[1..];
    }

    let first = rest.first()?;
    let belongs = if rest.len() == 1 {
        first.eq_ignore_ascii_case(&format!("{}.py", module))
    } else {
        first.eq_ignore_ascii_case(module)
    };

    belongs.then(|| rest.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::testing::{listen, spawn};
    use axum::routing::get;
    use axum::Json;

    fn sdist(files: &[(&str, &str)]) -> Vec<u8> {
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

    async fn mock_index() -> String {
        let (listener, base) = listen().await;
        let archive = sdist(&[
            ("demo-pkg-1.0/setup.py", "from setuptools import setup\n"),
            ("demo-pkg-1.0/src/demo_pkg/__init__.py", "VERSION = '1.0'\n"),
            ("demo-pkg-1.0/src/demo_pkg/util.py", "def f():\n    return 1\n"),
            ("demo-pkg-1.0/tests/test_util.py", "\n"),
        ]);
        let project = serde_json::json!({
            "info": {"name": "demo-pkg", "version": "1.0"},
            "urls": [
                {"packagetype": "bdist_wheel", "filename": "demo_pkg-1.0-py3-none-any.whl", "url": format!("{}/files/demo.whl", base)},
                {"packagetype": "sdist", "filename": "demo-pkg-1.0.tar.gz", "url": format!("{}/files/demo-pkg-1.0.tar.gz", base)}
            ]
        });

        let app = axum::Router::new()
            .route(
                "/demo-pkg/json",
                get(move || {
                    let project = project.clone();
                    async move { Json(project) }
                }),
            )
            .route(
                "/files/demo-pkg-1.0.tar.gz",
                get(move || {
                    let archive = archive.clone();
                    async move { archive }
                }),
            );
        spawn(listener, app);
        base
    }

    #[tokio::test]
    async fn test_installs_module_from_sdist() {
        let base = mock_index().await;
        let dir = tempfile::tempdir().unwrap();
        let installer = PackageInstaller::new(base, dir.path().to_path_buf());

        let out = installer.install(&["demo-pkg".to_string()]).await;
        assert!(!out.error, "{}", out.output);
        assert_eq!(out.output, "Installed demo-pkg 1.0");
        assert!(dir.path().join("demo_pkg/__init__.py").exists());
        assert!(dir.path().join("demo_pkg/util.py").exists());
        assert!(!dir.path().join("tests").exists());
        assert!(!dir.path().join("setup.py").exists());
    }

    #[tokio::test]
    async fn test_failures_are_reported_per_package() {
        let base = mock_index().await;
        let dir = tempfile::tempdir().unwrap();
        let installer = PackageInstaller::new(base, dir.path().to_path_buf());

        let out = installer
            .install(&["no-such-pkg".to_string(), "demo-pkg".to_string()])
            .await;
        assert!(out.error);
        let lines: Vec<&str> = out.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("no-such-pkg"));
        assert!(lines[0].contains("not found"));
        assert_eq!(lines[1], "Installed demo-pkg 1.0");
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let installer = PackageInstaller::new("http://127.0.0.1:9", dir.path().to_path_buf());
        let out = installer.install(&["../etc".to_string()]).await;
        assert!(out.error);
        assert!(out.output.contains("not a valid package name"));
    }

    #[test]
    fn test_package_relative_path() {
        let path = |p: &str| package_relative_path(Path::new(p), "six");
        assert_eq!(path("six-1.16.0/six.py"), Some(PathBuf::from("six.py")));
        assert_eq!(path("six-1.16.0/src/six/__init__.py"), Some(PathBuf::from("six/__init__.py")));
        assert_eq!(path("six-1.16.0/setup.py"), None);
        assert_eq!(path("six-1.16.0/../six/evil.py"), None);
        assert_eq!(path("six.py"), None);
    }

    #[test]
    fn test_import_name() {
        assert_eq!(import_name("Demo-Pkg"), "demo_pkg");
        assert_eq!(import_name("zope.interface"), "zope_interface");
    }
}
