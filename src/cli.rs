use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "coedit", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the shout relay server
    Relay {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Join a document and print collaborator presence
    Watch {
        /// Document id
        #[arg(short, long)]
        doc: String,

        /// Own user id
        #[arg(short, long)]
        user: String,

        /// Field to focus
        #[arg(long, requires = "locale")]
        field: Option<String>,

        /// Locale of the focused field
        #[arg(long, requires = "field")]
        locale: Option<String>,

        /// Relay URL (overrides config)
        #[arg(long)]
        url: Option<String>,
    },

    /// Generate sample configuration
    ConfigSample {
        /// Output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let cli = Cli::parse_from([
            "coedit", "watch", "--doc", "entry-1", "--user", "u1", "--field", "title", "--locale",
            "en-US",
        ]);
        match cli.command {
            Commands::Watch {
                doc,
                user,
                field,
                locale,
                url,
            } => {
                assert_eq!(doc, "entry-1");
                assert_eq!(user, "u1");
                assert_eq!(field.as_deref(), Some("title"));
                assert_eq!(locale.as_deref(), Some("en-US"));
                assert!(url.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_field_requires_locale() {
        let result = Cli::try_parse_from([
            "coedit", "watch", "--doc", "d", "--user", "u1", "--field", "title",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_path() {
        let cli = Cli::parse_from(["coedit", "relay", "--port", "9000", "-c", "/tmp/c.yaml"]);
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/c.yaml")));
        assert!(matches!(cli.command, Commands::Relay { port: Some(9000), .. }));
    }
}
