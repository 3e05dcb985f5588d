use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "polyrun")]
#[clap(version, about = "Run code snippets in many languages")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "POLYRUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a source file
    Run(RunArgs),

    /// List supported languages and backends
    Languages,

    /// Install Python packages for later runs
    Install(InstallArgs),

    /// Initialize a new polyrun configuration
    Init(InitArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source file to run ("-" reads standard input)
    pub file: PathBuf,

    /// Language key or alias (defaults to the file extension)
    #[clap(short, long)]
    pub language: Option<String>,

    /// Extra project files sent along with the source (remote languages)
    #[clap(long = "with")]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Package names as published on the package index
    #[clap(required = true)]
    pub packages: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "polyrun", "run", "main.go", "--with", "util.go", "-l", "go", "--format", "json",
        ]);
        assert!(matches!(cli.global_opts.format, OutputFormat::Json));
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.file, PathBuf::from("main.go"));
        assert_eq!(args.language.as_deref(), Some("go"));
        assert_eq!(args.files, vec![PathBuf::from("util.go")]);
    }

    #[test]
    fn test_install_requires_a_package() {
        assert!(Cli::try_parse_from(["polyrun", "install"]).is_err());
    }
}
