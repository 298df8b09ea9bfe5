mod backend;
mod cmd;
mod exit;
mod logging;
mod output;

use std::time::Duration;

use clap::Parser;
use vbiasctl_board::DEFAULT_RETRIES;
use vbiasctl_relay::DEFAULT_INTERFACE;

use crate::backend::Settings;
use crate::cmd::{Command, Globals};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "vbiasctl", version, about = "SiPM bias board control")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// How long to wait for each board response (e.g. 2s, 500ms).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration,
          default_value = "2s", global = true)]
    timeout: Duration,

    /// Attempts per board request.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_RETRIES, global = true)]
    retries: u32,

    /// Interface used when a destination names none.
    #[arg(long, value_name = "IFACE", env = "VBIASCTL_INTERFACE",
          default_value = DEFAULT_INTERFACE, global = true)]
    interface: String,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    init_logging(cli.log_format, cli.log_level);

    let globals = Globals {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        settings: Settings::new(cli.timeout, cli.retries.max(1)),
        interface: cli.interface,
    };

    match cmd::run(cli.command, &globals) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;

    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use vbiasctl_board::DEFAULT_RESPONSE_TIMEOUT;

    use super::*;

    #[test]
    fn parses_read_subcommand() {
        let cli = Cli::try_parse_from(["vbiasctl", "read", "0x9f@daq::eth1", "--timeout", "500ms"])
            .expect("read args should parse");
        assert!(matches!(cli.command, Command::Read(_)));
        assert_eq!(cli.timeout, Duration::from_millis(500));
    }

    #[test]
    fn set_accepts_short_health_flag() {
        let cli = Cli::try_parse_from([
            "vbiasctl", "set", "-r", "1-5", "-c", "1-100", "-g", "0.45", "-h", "12.5", "-H",
        ])
        .expect("set args should parse");
        let Command::Set(args) = cli.command else {
            panic!("expected set subcommand");
        };
        assert_eq!(args.health, 12.5);
        assert!(args.high);
        assert_eq!(args.gain_pc, 0.45);
    }

    #[test]
    fn rejects_conflicting_gain_modes() {
        let err = Cli::try_parse_from(["vbiasctl", "set", "-r", "1", "-c", "1", "-H", "-L"])
            .expect_err("conflicting gain modes should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_level_with_gain() {
        let err = Cli::try_parse_from(["vbiasctl", "set", "-r", "1", "-c", "1", "-V", "70", "-g", "0.5"])
            .expect_err("fixed level and gain should conflict");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn default_timeout_matches_session_default() {
        let cli = Cli::try_parse_from(["vbiasctl", "probe", "-l"]).expect("probe should parse");
        assert_eq!(cli.timeout, DEFAULT_RESPONSE_TIMEOUT);
        assert_eq!(cli.retries, DEFAULT_RETRIES);
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
    }
}
