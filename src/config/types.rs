use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolyrunConfig {
    pub script: ScriptConfig,
    pub python: PythonConfig,
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
}

/// In-process JavaScript/TypeScript evaluator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Wall-clock deadline for one run
    pub timeout_seconds: u64,
    /// Globals left visible to user code; everything else is removed from the context
    pub allowed_globals: Vec<String>,
}

pub const DEFAULT_ALLOWED_GLOBALS: &[&str] = &[
    "Object",
    "Function",
    "Array",
    "Number",
    "Boolean",
    "String",
    "Symbol",
    "BigInt",
    "Date",
    "RegExp",
    "Error",
    "TypeError",
    "RangeError",
    "SyntaxError",
    "ReferenceError",
    "EvalError",
    "URIError",
    "AggregateError",
    "Promise",
    "Map",
    "Set",
    "WeakMap",
    "WeakSet",
    "WeakRef",
    "Proxy",
    "Reflect",
    "JSON",
    "Math",
    "Intl",
    "ArrayBuffer",
    "DataView",
    "Uint8Array",
    "Int8Array",
    "Uint16Array",
    "Int16Array",
    "Uint32Array",
    "Int32Array",
    "Float32Array",
    "Float64Array",
    "BigInt64Array",
    "BigUint64Array",
    "Uint8ClampedArray",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURI",
    "encodeURIComponent",
    "decodeURI",
    "decodeURIComponent",
    "NaN",
    "Infinity",
    "undefined",
    "globalThis",
];

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            allowed_globals: DEFAULT_ALLOWED_GLOBALS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// WASI Python interpreter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Download URL of the WASI CPython module
    pub wasm_url: String,
    /// Download URL of the matching standard library archive (.tar.gz)
    pub stdlib_url: String,
    /// Use a local python.wasm instead of downloading
    pub wasm_path: Option<PathBuf>,
    /// Use a local directory as the guest root (holding `usr/local/lib/python3.x`) instead of downloading
    pub stdlib_dir: Option<PathBuf>,
    /// Instruction budget per run; exhausting it is reported as a timeout
    pub fuel: u64,
    /// Package index used by `install_packages`
    pub package_index_url: String,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            wasm_url: "https://github.com/vmware-labs/webassembly-language-runtimes/releases/download/python%2F3.12.0%2B20231211-040d5a6/python-3.12.0.wasm".to_string(),
            stdlib_url: "https://github.com/vmware-labs/webassembly-language-runtimes/releases/download/python%2F3.12.0%2B20231211-040d5a6/python-3.12.0-wasi-sdk-20.0.tar.gz".to_string(),
            wasm_path: None,
            stdlib_dir: None,
            fuel: 20_000_000_000,
            package_index_url: "https://pypi.org/pypi".to_string(),
        }
    }
}

/// Embedded SQL engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; the default keeps everything in memory
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
        }
    }
}

/// Remote execution service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of a Piston-compatible API (the adapter POSTs to `{base_url}/execute`)
    pub base_url: String,
    /// HTTP request timeout
    pub request_timeout_seconds: u64,
    /// Compile stage limit passed to the service
    pub compile_timeout_ms: u64,
    /// Run stage limit passed to the service
    pub run_timeout_ms: u64,
    /// Per-language version pins; unlisted languages use "*"
    pub versions: HashMap<String, String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://emkc.org/api/v2/piston".to_string(),
            request_timeout_seconds: 60,
            compile_timeout_ms: 10_000,
            run_timeout_ms: 3_000,
            versions: HashMap::new(),
        }
    }
}

impl RemoteConfig {
    pub fn version_for(&self, service_language: &str) -> String {
        self.versions
            .get(service_language)
            .cloned()
            .unwrap_or_else(|| "*".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PolyrunConfig = toml::from_str(
            r#"
            [script]
            timeout_seconds = 5

            [remote]
            base_url = "http://localhost:2000/api/v2"
            versions = { java = "15.0.2" }
            "#,
        )
        .unwrap();

        assert_eq!(config.script.timeout_seconds, 5);
        assert!(config.script.allowed_globals.contains(&"JSON".to_string()));
        assert_eq!(config.remote.base_url, "http://localhost:2000/api/v2");
        assert_eq!(config.remote.version_for("java"), "15.0.2");
        assert_eq!(config.remote.version_for("go"), "*");
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn test_default_roundtrips_through_toml() {
        let text = toml::to_string_pretty(&PolyrunConfig::default()).unwrap();
        let parsed: PolyrunConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.python.fuel, PythonConfig::default().fuel);
    }
}
