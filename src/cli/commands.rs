use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `confwarden` - detects and remediates policy violations in configuration files.
#[derive(Parser, Debug)]
#[command(name = "confwarden")]
#[command(version)]
#[command(about = "Agent workflow that validates configuration files and patches policy violations.", long_about = None)]
pub struct Cli {
    /// Config file (default: ./confwarden.toml, then ~/.confwarden/confwarden.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Subscribe to the event stream and remediate incoming files
    Watch,

    /// Remediate a single local file
    Run {
        /// File to validate and patch
        #[arg(short, long)]
        file: PathBuf,

        /// Repository path reported for the file (default: the file name)
        #[arg(long)]
        remote_path: Option<String>,

        /// Repository (`owner/name`) to open a pull request against
        #[arg(long)]
        repo: Option<String>,
    },

    /// Build the documentation index used by the command step
    Index {
        /// Rebuild even if a persisted index exists
        #[arg(long)]
        rebuild: bool,
    },

    /// Print the workflow graph as a Mermaid flowchart
    Graph,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_file_and_optional_targets() {
        let cli = Cli::parse_from([
            "confwarden",
            "--verbose",
            "run",
            "--file",
            "tmp/application.properties",
            "--repo",
            "acme/shop",
        ]);
        assert!(cli.verbose);
        let Commands::Run {
            file,
            remote_path,
            repo,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(file, PathBuf::from("tmp/application.properties"));
        assert!(remote_path.is_none());
        assert_eq!(repo.as_deref(), Some("acme/shop"));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["confwarden", "graph", "--config", "alt.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Commands::Graph));
    }
}
