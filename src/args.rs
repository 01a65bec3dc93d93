// src/args.rs
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Detects UP/DOWN cortical states in a multichannel recording.")]
pub struct Cli {
    /// JSON-encoded channel batch.
    #[arg(index = 1)]
    pub recording: PathBuf,
    /// JSON pipeline configuration; must set a threshold rule.
    #[arg(index = 2)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn positional_paths() {
        let cli = Cli::try_parse_from(["updown", "rec.json", "cfg.json"]).unwrap();
        assert_eq!(cli.recording, PathBuf::from("rec.json"));
        assert_eq!(cli.config, Some(PathBuf::from("cfg.json")));

        let cli = Cli::try_parse_from(["updown", "rec.json"]).unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn help_is_not_a_recording_path() {
        let err = Cli::try_parse_from(["updown", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn recording_is_required() {
        let err = Cli::try_parse_from(["updown"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
