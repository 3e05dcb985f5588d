use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::info;

use crate::cli::args::{ConfigAction, ConfigArgs, InitArgs, InstallArgs, OutputFormat, RunArgs};
use crate::config::loader::get_config_path;
use crate::config::types::PolyrunConfig;
use crate::error::{PolyrunError, Result};
use crate::language::{self, LanguageDescriptor, LANGUAGES};
use crate::output::ExecutionOutput;
use crate::sandbox::{available_backends, create_router, ProjectFile};

// ============================================================================
// Execution Commands
// ============================================================================

/// Run one source file and print its output
pub async fn run(args: RunArgs, config: PolyrunConfig, format: OutputFormat) -> Result<()> {
    let language = resolve_language(args.language.as_deref(), &args.file)?;
    let code = read_source(&args.file).await?;

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(ProjectFile {
            path: file_name(path),
            content: tokio::fs::read_to_string(path).await?,
        });
    }

    info!(language = language.key, file = %args.file.display(), "Running");
    let router = create_router(&config)?;
    let output = router.execute(language.key, &code, &files).await;
    print_output(&output, format)
}

/// Install Python packages into the shared site-packages directory
pub async fn install(args: InstallArgs, config: PolyrunConfig, format: OutputFormat) -> Result<()> {
    let router = create_router(&config)?;
    let output = router.install_packages(&args.packages).await;
    print_output(&output, format)
}

pub async fn languages(config: PolyrunConfig, format: OutputFormat) -> Result<()> {
    let backends = available_backends(&config);
    let capabilities = create_router(&config)?.capabilities();
    let labels_of = |name: &str| {
        capabilities
            .iter()
            .find(|(backend, _)| backend == name)
            .map(|(_, caps)| caps.labels())
            .unwrap_or_default()
    };

    match format {
        OutputFormat::Text => {
            println!("{:<12} {:<14} {:<10} ALIASES", "KEY", "NAME", "ENGINE");
            for language in LANGUAGES {
                println!(
                    "{:<12} {:<14} {:<10} {}",
                    language.key,
                    language.name,
                    language.binding.name(),
                    language.aliases.join(", ")
                );
            }

            println!("\nBackends:");
            for backend in &backends {
                let status = if backend.available { "available" } else { "unavailable" };
                print!("  {:<8} {:<12} {}", backend.name, status, backend.description);
                if let Some(reason) = &backend.unavailable_reason {
                    print!(" ({})", reason);
                }
                let labels = labels_of(backend.name);
                if !labels.is_empty() {
                    print!(" [{}]", labels.join(", "));
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let languages: Vec<_> = LANGUAGES
                .iter()
                .map(|language| {
                    serde_json::json!({
                        "key": language.key,
                        "name": language.name,
                        "aliases": language.aliases,
                        "engine": language.binding.name(),
                        "runnable": language.binding.is_runnable(),
                        "extension": language.extension,
                        "icon": language.icon,
                        "editor_mode": language.editor_mode,
                    })
                })
                .collect();
            let backends: Vec<_> = backends
                .iter()
                .map(|backend| {
                    serde_json::json!({
                        "name": backend.name,
                        "available": backend.available,
                        "description": backend.description,
                        "unavailable_reason": backend.unavailable_reason,
                        "capabilities": labels_of(backend.name),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "languages": languages,
                    "backends": backends,
                }))?
            );
        }
    }
    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn init(args: InitArgs) -> Result<()> {
    let config_path = get_config_path();

    if config_path.exists() && !args.force {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let default_config = PolyrunConfig::default();
    let toml_str = toml::to_string_pretty(&default_config)
        .map_err(|e| PolyrunError::Config(e.to_string()))?;

    std::fs::write(&config_path, toml_str)?;

    println!("Created configuration at: {}", config_path.display());
    println!("\nQuick start:");
    println!("  # Run a file; the language follows the extension");
    println!("  polyrun run hello.py");
    println!();
    println!("  # Pick the language explicitly and read from stdin");
    println!("  echo 'console.log(1 + 1)' | polyrun run - --language js");
    println!();
    println!("  # Point compiled languages at your own execution service");
    println!("  # by editing [remote] base_url in the file above");

    Ok(())
}

pub async fn config(args: ConfigArgs, config: PolyrunConfig) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| PolyrunError::Config(e.to_string()))?;
            println!("{}", toml_str);
        }
        ConfigAction::Path => {
            println!("{}", get_config_path().display());
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn resolve_language(requested: Option<&str>, file: &Path) -> Result<&'static LanguageDescriptor> {
    let resolved = match requested {
        Some(key) => language::lookup(key),
        None => language::for_path(file),
    };
    resolved.ok_or_else(|| PolyrunError::UnknownLanguage {
        language: requested
            .map(str::to_string)
            .or_else(|| {
                file.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| file.display().to_string()),
    })
}

async fn read_source(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut code = String::new();
        tokio::io::stdin().read_to_string(&mut code).await?;
        Ok(code)
    } else {
        Ok(tokio::fs::read_to_string(file).await?)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_output(output: &ExecutionOutput, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", output.render_text());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(output)?);
        }
    }
    // Exit non-zero when the program failed
    if output.error {
        std::process::exit(1);
    }
    Ok(())
}
