//! CLI argument definitions using clap
//!
//! ```text
//! uwatch [-p DUR] [-t DUR] [-v] [--] COMMAND [ARGS...]
//! ```

use clap::Parser;
use std::ffi::OsString;
use std::time::Duration;
use uwatch_core::WatchConfig;

#[derive(Parser, Debug)]
#[command(name = "uwatch")]
#[command(about = "Run a command in its own process group and take the whole group down with it")]
#[command(
    long_about = r#"Run a command in its own process group and take the whole group down with it.

SIGHUP, SIGINT and SIGTERM are forwarded to the command's process group. If the
group has not exited after the death timeout, it is sent SIGKILL. When uwatch
itself loses its parent, it behaves as if it had received SIGHUP.

Exit status is 0 if the command exited with status 0, and 1 otherwise."#
)]
#[command(version)]
pub struct Cli {
    /// Interval between parent liveness checks (0 disables them)
    #[arg(
        short = 'p',
        long,
        env = "UWATCH_POLL_INTERVAL",
        default_value = "100ms",
        value_parser = parse_duration
    )]
    pub poll_interval: Duration,

    /// Grace period between the forwarded signal and SIGKILL (0 waits forever)
    #[arg(
        short = 't',
        long,
        env = "UWATCH_DEATH_TIMEOUT",
        default_value = "1s",
        value_parser = parse_duration
    )]
    pub death_timeout: Duration,

    /// Log diagnostics to stderr
    #[arg(short, long, env = "UWATCH_VERBOSE")]
    pub verbose: bool,

    /// Command to supervise, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

impl Cli {
    /// Supervisor configuration described by the flags
    pub fn config(&self) -> WatchConfig {
        WatchConfig::default()
            .with_poll_interval(self.poll_interval)
            .with_death_timeout(self.death_timeout)
    }
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["uwatch", "sleep", "1"]);
        assert_eq!(cli.poll_interval, Duration::from_millis(100));
        assert_eq!(cli.death_timeout, Duration::from_secs(1));
        assert!(!cli.verbose);
        assert_eq!(cli.command, vec![OsString::from("sleep"), OsString::from("1")]);
    }

    #[test]
    fn test_flags() {
        let cli = parse(&["uwatch", "-p", "0", "-t", "50ms", "-v", "--", "true"]);
        assert!(cli.verbose);
        assert_eq!(cli.command, vec![OsString::from("true")]);

        let config = cli.config();
        assert_eq!(config.poll_interval, Duration::ZERO);
        assert_eq!(config.death_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_target_arguments_pass_through() {
        let cli = parse(&["uwatch", "-t", "2s", "sh", "-c", "exit 3", "-v"]);
        assert!(!cli.verbose);
        assert_eq!(
            cli.command,
            vec![
                OsString::from("sh"),
                OsString::from("-c"),
                OsString::from("exit 3"),
                OsString::from("-v"),
            ]
        );
    }

    #[test]
    fn test_double_dash_separates_target() {
        let cli = parse(&["uwatch", "--", "-weird-name", "--help"]);
        assert_eq!(
            cli.command,
            vec![OsString::from("-weird-name"), OsString::from("--help")]
        );
    }

    #[test]
    fn test_missing_command_parses_empty() {
        let cli = parse(&["uwatch", "-v"]);
        assert!(cli.command.is_empty());
    }

    #[test]
    fn test_invalid_duration_rejected() {
        assert!(Cli::try_parse_from(["uwatch", "-t", "soon", "true"]).is_err());
    }
}
