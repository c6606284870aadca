use std::path::PathBuf;

use clap::Parser;

/// Mirrors one Discord channel into another.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Load and validate the config, then exit
    #[arg(long)]
    pub check_config: bool,
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;

    use super::Cli;

    #[test]
    fn config_flag_sets_path() {
        let cli = Cli::try_parse_from(["channel-mirror", "--config", "/etc/mirror.yaml"])
            .expect("cli should parse");
        assert_eq!(cli.config.as_deref(), Some(Path::new("/etc/mirror.yaml")));
        assert!(!cli.check_config);
    }

    #[test]
    fn check_config_flag_is_parsed() {
        let cli = Cli::try_parse_from(["channel-mirror", "-c", "mirror.yaml", "--check-config"])
            .expect("cli should parse");
        assert!(cli.check_config);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["channel-mirror", "--verbose-mode"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
