//! Command-line interface: flags, defaults and range validation.
//!
//! clap handles parsing and `--help`/`--version`; the range rules the
//! engine depends on are enforced by [`Args::into_config`] so they can be
//! tested without spawning a process.

use clap::Parser;
use netorcai_server::ServerConfig;

/// Generic turn-based game orchestrator.
#[derive(Debug, Parser)]
#[command(name = "netorcai", version, about)]
pub struct Args {
    /// TCP port to listen on
    #[arg(long, default_value_t = 4242)]
    pub port: u16,

    /// Maximum number of players
    #[arg(long, default_value_t = 4)]
    pub nb_players_max: u32,

    /// Maximum number of special players (validated, currently unused)
    #[arg(long, default_value_t = 0)]
    pub nb_splayers_max: u32,

    /// Maximum number of visualizations
    #[arg(long, default_value_t = 1)]
    pub nb_visus_max: u32,

    /// Number of turns to play
    #[arg(long, default_value_t = 100)]
    pub nb_turns_max: u32,

    /// Milliseconds to wait before the first turn
    #[arg(long, default_value_t = 1000.0)]
    pub delay_first_turn: f64,

    /// Milliseconds to wait between two turns
    #[arg(long, default_value_t = 1000.0)]
    pub delay_turns: f64,

    /// Suppress delays and advance a turn as soon as all players acked
    #[arg(long)]
    pub fast: bool,

    /// Detailed logs
    #[arg(long, conflicts_with_all = ["debug", "quiet"])]
    pub verbose: bool,

    /// Most detailed logs
    #[arg(long, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only warnings and errors
    #[arg(long)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Args {
    /// Validates the value ranges and builds the engine configuration.
    pub fn into_config(self) -> Result<ServerConfig, String> {
        if self.port == 0 {
            return Err("--port must be in [1, 65535], got 0".into());
        }
        check_u32("--nb-players-max", self.nb_players_max, 0, 1024)?;
        check_u32("--nb-splayers-max", self.nb_splayers_max, 0, 1024)?;
        check_u32("--nb-visus-max", self.nb_visus_max, 0, 1024)?;
        check_u32("--nb-turns-max", self.nb_turns_max, 1, 65535)?;
        check_delay("--delay-first-turn", self.delay_first_turn)?;
        check_delay("--delay-turns", self.delay_turns)?;

        Ok(ServerConfig {
            port: self.port,
            nb_players_max: self.nb_players_max,
            nb_special_players_max: self.nb_splayers_max,
            nb_visus_max: self.nb_visus_max,
            nb_turns_max: self.nb_turns_max,
            ms_before_first_turn: self.delay_first_turn,
            ms_between_turns: self.delay_turns,
            fast: self.fast,
        })
    }
}

fn check_u32(flag: &str, value: u32, min: u32, max: u32) -> Result<(), String> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{flag} must be in [{min}, {max}], got {value}"))
    }
}

fn check_delay(flag: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (50.0..=10000.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{flag} must be in [50, 10000], got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("netorcai").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap().into_config().unwrap();
        assert_eq!(config.port, 4242);
        assert_eq!(config.nb_players_max, 4);
        assert_eq!(config.nb_special_players_max, 0);
        assert_eq!(config.nb_visus_max, 1);
        assert_eq!(config.nb_turns_max, 100);
        assert_eq!(config.ms_before_first_turn, 1000.0);
        assert_eq!(config.ms_between_turns, 1000.0);
        assert!(!config.fast);
    }

    #[test]
    fn test_help_and_version_are_not_usage_errors() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);

        let err = parse(&["--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(parse(&["--this-option-should-not-exist"]).is_err());
    }

    #[test]
    fn test_verbosity_flags_conflict() {
        assert!(parse(&["--debug", "--verbose"]).is_err());
        assert!(parse(&["--debug", "--quiet"]).is_err());
        assert!(parse(&["--verbose", "--quiet"]).is_err());
        assert!(parse(&["--verbose"]).is_ok());
    }

    #[test]
    fn test_port_bounds() {
        // 65536 does not fit in a u16: parse-time rejection.
        assert!(parse(&["--port=65536"]).is_err());
        assert!(parse(&["--port=meh"]).is_err());

        let err = parse(&["--port=0"]).unwrap().into_config().unwrap_err();
        assert!(err.contains("--port"));

        assert!(parse(&["--port=1"]).unwrap().into_config().is_ok());
        assert!(parse(&["--port=65535"]).unwrap().into_config().is_ok());
    }

    #[test]
    fn test_nb_players_max_bounds() {
        assert!(parse(&["--nb-players-max=meh"]).is_err());
        assert!(parse(&["--nb-players-max=-1"]).is_err());
        assert!(parse(&["--nb-players-max=1025"])
            .unwrap()
            .into_config()
            .is_err());
        assert!(parse(&["--nb-players-max=0"]).unwrap().into_config().is_ok());
        assert!(parse(&["--nb-players-max=1024"])
            .unwrap()
            .into_config()
            .is_ok());
    }

    #[test]
    fn test_nb_splayers_max_bounds() {
        assert!(parse(&["--nb-splayers-max=1025"])
            .unwrap()
            .into_config()
            .is_err());
        assert!(parse(&["--nb-splayers-max=1024"])
            .unwrap()
            .into_config()
            .is_ok());
    }

    #[test]
    fn test_nb_visus_max_bounds() {
        assert!(parse(&["--nb-visus-max=1025"])
            .unwrap()
            .into_config()
            .is_err());
        assert!(parse(&["--nb-visus-max=0"]).unwrap().into_config().is_ok());
    }

    #[test]
    fn test_nb_turns_max_bounds() {
        assert!(parse(&["--nb-turns-max=0"]).unwrap().into_config().is_err());
        assert!(parse(&["--nb-turns-max=65536"])
            .unwrap()
            .into_config()
            .is_err());
        assert!(parse(&["--nb-turns-max=1"]).unwrap().into_config().is_ok());
        assert!(parse(&["--nb-turns-max=65535"])
            .unwrap()
            .into_config()
            .is_ok());
    }

    #[test]
    fn test_delay_bounds() {
        assert!(parse(&["--delay-first-turn=meh"]).is_err());
        assert!(parse(&["--delay-first-turn=49.999"])
            .unwrap()
            .into_config()
            .is_err());
        assert!(parse(&["--delay-first-turn=10000.001"])
            .unwrap()
            .into_config()
            .is_err());
        assert!(parse(&["--delay-first-turn=50"])
            .unwrap()
            .into_config()
            .is_ok());
        assert!(parse(&["--delay-turns=10000"])
            .unwrap()
            .into_config()
            .is_ok());
    }

    #[test]
    fn test_fast_flag() {
        assert!(parse(&["--fast"]).unwrap().into_config().unwrap().fast);
    }
}
