//! The fixed language descriptor table.
//!
//! Each key maps to display metadata and an [`EngineBinding`] that names the
//! backend the router dispatches to. The table is immutable and shared for the
//! life of the process.

use serde::Serialize;

/// Source dialect accepted by the in-process evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptDialect {
    JavaScript,
    /// Type annotations are stripped on a best-effort basis before evaluation.
    TypeScript,
}

/// What a no-op language reports when "run".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StaticKind {
    /// Rendered by the caller as a live document preview.
    Preview,
    /// Structured data or prose with nothing to execute.
    Document,
}

/// Which backend a language is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "engine", rename_all = "kebab-case")]
pub enum EngineBinding {
    InProcess {
        dialect: ScriptDialect,
    },
    Interpreter,
    Database,
    Remote {
        /// Language name understood by the execution service.
        service_language: &'static str,
        /// File name the primary source is submitted under.
        entry_file: &'static str,
    },
    NoOp {
        kind: StaticKind,
    },
}

impl EngineBinding {
    pub fn name(&self) -> &'static str {
        match self {
            EngineBinding::InProcess { .. } => "in-process",
            EngineBinding::Interpreter => "interpreter",
            EngineBinding::Database => "database",
            EngineBinding::Remote { .. } => "remote",
            EngineBinding::NoOp { .. } => "no-op",
        }
    }

    pub fn is_runnable(&self) -> bool {
        !matches!(self, EngineBinding::NoOp { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub binding: EngineBinding,
    pub icon: &'static str,
    pub extension: &'static str,
    /// Syntax-highlighting mode for the editor.
    pub editor_mode: &'static str,
}

const fn remote(service_language: &'static str, entry_file: &'static str) -> EngineBinding {
    EngineBinding::Remote {
        service_language,
        entry_file,
    }
}

pub static LANGUAGES: &[LanguageDescriptor] = &[
    LanguageDescriptor {
        key: "javascript",
        name: "JavaScript",
        aliases: &["js", "node"],
        binding: EngineBinding::InProcess {
            dialect: ScriptDialect::JavaScript,
        },
        icon: "javascript",
        extension: "js",
        editor_mode: "javascript",
    },
    LanguageDescriptor {
        key: "typescript",
        name: "TypeScript",
        aliases: &["ts"],
        binding: EngineBinding::InProcess {
            dialect: ScriptDialect::TypeScript,
        },
        icon: "typescript",
        extension: "ts",
        editor_mode: "typescript",
    },
    LanguageDescriptor {
        key: "python",
        name: "Python",
        aliases: &["py", "python3"],
        binding: EngineBinding::Interpreter,
        icon: "python",
        extension: "py",
        editor_mode: "python",
    },
    LanguageDescriptor {
        key: "sql",
        name: "SQL",
        aliases: &["sqlite"],
        binding: EngineBinding::Database,
        icon: "database",
        extension: "sql",
        editor_mode: "sql",
    },
    LanguageDescriptor {
        key: "java",
        name: "Java",
        aliases: &[],
        binding: remote("java", "Main.java"),
        icon: "java",
        extension: "java",
        editor_mode: "java",
    },
    LanguageDescriptor {
        key: "c",
        name: "C",
        aliases: &[],
        binding: remote("c", "main.c"),
        icon: "c",
        extension: "c",
        editor_mode: "c",
    },
    LanguageDescriptor {
        key: "cpp",
        name: "C++",
        aliases: &["c++", "cxx"],
        binding: remote("c++", "main.cpp"),
        icon: "cplusplus",
        extension: "cpp",
        editor_mode: "cpp",
    },
    LanguageDescriptor {
        key: "csharp",
        name: "C#",
        aliases: &["cs", "c#"],
        binding: remote("csharp", "Program.cs"),
        icon: "csharp",
        extension: "cs",
        editor_mode: "csharp",
    },
    LanguageDescriptor {
        key: "go",
        name: "Go",
        aliases: &["golang"],
        binding: remote("go", "main.go"),
        icon: "go",
        extension: "go",
        editor_mode: "go",
    },
    LanguageDescriptor {
        key: "rust",
        name: "Rust",
        aliases: &["rs"],
        binding: remote("rust", "main.rs"),
        icon: "rust",
        extension: "rs",
        editor_mode: "rust",
    },
    LanguageDescriptor {
        key: "ruby",
        name: "Ruby",
        aliases: &["rb"],
        binding: remote("ruby", "main.rb"),
        icon: "ruby",
        extension: "rb",
        editor_mode: "ruby",
    },
    LanguageDescriptor {
        key: "php",
        name: "PHP",
        aliases: &[],
        binding: remote("php", "main.php"),
        icon: "php",
        extension: "php",
        editor_mode: "php",
    },
    LanguageDescriptor {
        key: "kotlin",
        name: "Kotlin",
        aliases: &["kt"],
        binding: remote("kotlin", "Main.kt"),
        icon: "kotlin",
        extension: "kt",
        editor_mode: "kotlin",
    },
    LanguageDescriptor {
        key: "swift",
        name: "Swift",
        aliases: &[],
        binding: remote("swift", "main.swift"),
        icon: "swift",
        extension: "swift",
        editor_mode: "swift",
    },
    LanguageDescriptor {
        key: "bash",
        name: "Bash",
        aliases: &["sh", "shell"],
        binding: remote("bash", "main.sh"),
        icon: "terminal",
        extension: "sh",
        editor_mode: "shell",
    },
    LanguageDescriptor {
        key: "html",
        name: "HTML",
        aliases: &["htm"],
        binding: EngineBinding::NoOp {
            kind: StaticKind::Preview,
        },
        icon: "html5",
        extension: "html",
        editor_mode: "html",
    },
    LanguageDescriptor {
        key: "css",
        name: "CSS",
        aliases: &[],
        binding: EngineBinding::NoOp {
            kind: StaticKind::Preview,
        },
        icon: "css3",
        extension: "css",
        editor_mode: "css",
    },
    LanguageDescriptor {
        key: "json",
        name: "JSON",
        aliases: &[],
        binding: EngineBinding::NoOp {
            kind: StaticKind::Document,
        },
        icon: "json",
        extension: "json",
        editor_mode: "json",
    },
    LanguageDescriptor {
        key: "markdown",
        name: "Markdown",
        aliases: &["md"],
        binding: EngineBinding::NoOp {
            kind: StaticKind::Document,
        },
        icon: "markdown",
        extension: "md",
        editor_mode: "markdown",
    },
    LanguageDescriptor {
        key: "yaml",
        name: "YAML",
        aliases: &["yml"],
        binding: EngineBinding::NoOp {
            kind: StaticKind::Document,
        },
        icon: "yaml",
        extension: "yaml",
        editor_mode: "yaml",
    },
];

/// Find a descriptor by key or alias, ignoring case and surrounding whitespace.
pub fn lookup(key: &str) -> Option<&'static LanguageDescriptor> {
    let key = key.trim().to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|lang| lang.key == key || lang.aliases.contains(&key.as_str()))
}

/// Find the language whose file extension matches `path`.
pub fn for_path(path: &std::path::Path) -> Option<&'static LanguageDescriptor> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|lang| lang.extension == ext)
        .or_else(|| lookup(&ext))
}
