use std::path::PathBuf;

use clap::{ArgAction, Args, Subcommand};
use vbiasctl_transport::DEFAULT_RELAY_PORT;

use crate::backend::Settings;
use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod probe;
pub mod read;
pub mod reset;
pub mod serve;
pub mod set;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every board answering on a segment.
    Probe(ProbeArgs),
    /// Print every status reading and channel voltage of one board.
    Read(ReadArgs),
    /// Hard-reset one board, or all of them with 0xff.
    Reset(ResetArgs),
    /// Ramp channel voltages to new settings.
    Set(SetArgs),
    /// Run the relay daemon on this host.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    pub format: OutputFormat,
    pub settings: Settings,
    /// Interface used when a destination names none.
    pub interface: String,
}

pub fn run(command: Command, globals: &Globals) -> CliResult<i32> {
    match command {
        Command::Probe(args) => probe::run(args, globals),
        Command::Read(args) => read::run(args, globals),
        Command::Reset(args) => reset::run(args, globals),
        Command::Set(args) => set::run(args, globals),
        Command::Serve(args) => serve::run(args, globals),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// List the responding boards (the default action).
    #[arg(short = 'l', long = "list")]
    pub list: bool,
    /// Where the boards are: [host[:port]::]interface.
    #[arg(value_name = "DEST")]
    pub dest: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Board to read: <geoaddr>[@dest], e.g. 0x9f or 0x9f@daq::eth1.
    #[arg(value_name = "BOARD")]
    pub target: String,
}

#[derive(Args, Debug)]
pub struct ResetArgs {
    /// Board to reset: <geoaddr>[@dest]; 0xff resets every board.
    #[arg(value_name = "BOARD")]
    pub target: String,
}

#[derive(Args, Debug)]
#[command(disable_help_flag = true)]
pub struct SetArgs {
    /// Voltage file: lines starting with a space hold `geoaddr channel volts`.
    #[arg(short = 'f', long = "file", value_name = "FILE",
          conflicts_with_all = ["rows", "columns", "level", "high", "low"])]
    pub file: Option<PathBuf>,
    /// Rows to set, e.g. 1-5 or 2,4.
    #[arg(short = 'r', long = "rows", value_name = "ROWS")]
    pub rows: Option<String>,
    /// Columns to set, e.g. 1-100 or 2,5,8-14.
    #[arg(short = 'c', long = "columns", value_name = "COLUMNS")]
    pub columns: Option<String>,
    /// Bias each channel for this single-pixel gain, in pC.
    #[arg(short = 'g', long = "gain-pc", value_name = "PC", default_value_t = set::DEFAULT_GAIN_PC)]
    pub gain_pc: f64,
    /// Bias each channel for this mean charge per axial hit, in pC, capped by --gain-pc.
    #[arg(short = 'p', long = "peak-pc", value_name = "PC", default_value_t = set::DEFAULT_PEAK_PC)]
    pub peak_pc: f64,
    /// Set every selected channel to this fixed level instead.
    #[arg(short = 'V', long = "level", value_name = "VOLTS", conflicts_with_all = ["gain_pc", "peak_pc"])]
    pub level: Option<f64>,
    /// Switch the addressed boards to high gain.
    #[arg(short = 'H', long = "high-gain", conflicts_with = "low")]
    pub high: bool,
    /// Switch the addressed boards to low gain.
    #[arg(short = 'L', long = "low-gain")]
    pub low: bool,
    /// DAC health level for the addressed boards.
    #[arg(short = 'h', long = "health", value_name = "VOLTS", default_value_t = set::DEFAULT_HEALTH_V)]
    pub health: f64,
    /// Channel map with thresholds and pixel capacitances.
    #[arg(short = 'C', long = "config", value_name = "FILE", env = "VBIASCTL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Where the boards are: [host[:port]::]interface.
    #[arg(value_name = "DEST")]
    pub dest: Option<String>,
    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// TCP port to listen on.
    #[arg(short = 'p', long, env = "VBIASCTL_PORT", default_value_t = DEFAULT_RELAY_PORT)]
    pub port: u16,
    /// Interface used when a request names none.
    #[arg(value_name = "INTERFACE")]
    pub interface: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
