use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use vbiasctl_board::{BoardAccess, BoardAddress};

use crate::backend::{destination, Backend};
use crate::cmd::{Globals, SetArgs};
use crate::exit::{
    CliError, CliResult, BAD_SEQUENCE, INPUT_UNREADABLE, OPERATION_FAILED, SUCCESS, USAGE,
};
use crate::output::{hex_words, print_json, table, OutputFormat};

pub const DEFAULT_GAIN_PC: f64 = 0.50;
pub const DEFAULT_PEAK_PC: f64 = 0.0;
pub const DEFAULT_HEALTH_V: f64 = 13.0;

pub const MAX_ROWS: u32 = 5;
pub const MAX_COLUMNS: u32 = 102;

/// Channel driving the preamp gain-mode switch.
const GAIN_MODE_CHANNEL: usize = 30;
const LOW_GAIN_V: f64 = 5.0;
const HIGH_GAIN_V: f64 = 10.0;
/// Channel carrying the DAC health level.
const HEALTH_CHANNEL: usize = 31;

const DEFAULT_CONFIG_NAME: &str = "vbias.conf";

/// Voltage settings per board, in file order within each board.
type Plan = BTreeMap<u8, Vec<(usize, f64)>>;

/// How channel levels are derived from the channel map.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bias {
    /// The same level on every selected channel.
    Fixed(f64),
    /// Threshold plus the overvoltage giving `gain_pc` per pixel; with a
    /// positive `peak_pc`, lowered to the level giving that mean charge.
    Gain { gain_pc: f64, peak_pc: f64 },
}

/// One line of the channel map.
#[derive(Debug, Clone, PartialEq)]
struct MapEntry {
    geoaddr: u8,
    channel: usize,
    column: u32,
    row: u32,
    threshold_v: f64,
    pixel_cap_pf: f64,
    mean_yield: f64,
}

impl Bias {
    fn volts(self, entry: &MapEntry) -> f64 {
        match self {
            Bias::Fixed(volts) => volts,
            Bias::Gain { gain_pc, peak_pc } => {
                let by_gain = entry.threshold_v + gain_pc / entry.pixel_cap_pf;
                if peak_pc > 0.0 {
                    let by_peak = entry.threshold_v
                        + (peak_pc / (entry.pixel_cap_pf * entry.mean_yield)).sqrt();
                    by_gain.min(by_peak)
                } else {
                    by_gain
                }
            }
        }
    }
}

/// What the channel-map mode writes besides the per-channel levels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BoardLevels {
    high_gain: bool,
    health_v: f64,
}

#[derive(Serialize)]
struct BoardResult {
    geoaddr: u8,
    channels: usize,
    voltages_packet: Option<String>,
    status_packet: Option<String>,
}

pub fn run(args: SetArgs, globals: &Globals) -> CliResult<i32> {
    let plan = match &args.file {
        Some(file) => load_settings(file)?,
        None => {
            let (Some(rows), Some(columns)) = (&args.rows, &args.columns) else {
                return Err(CliError::new(
                    USAGE,
                    "either --file or both --rows and --columns are required",
                ));
            };
            let rows = parse_sequence(rows, MAX_ROWS)?;
            let columns = parse_sequence(columns, MAX_COLUMNS)?;
            let bias = match args.level {
                Some(volts) => Bias::Fixed(volts),
                None => Bias::Gain {
                    gain_pc: args.gain_pc,
                    peak_pc: args.peak_pc,
                },
            };
            let levels = BoardLevels {
                high_gain: args.high,
                health_v: args.health,
            };
            let config = args.config.clone().unwrap_or_else(default_config_path);
            load_channel_map(&config, &rows, &columns, bias, levels)?
        }
    };

    let dest = destination(args.dest.as_deref(), &globals.interface)?;
    let backend = Backend::open(&dest)?;

    // Every board is selected before any of them is touched.
    let mut boards = Vec::with_capacity(plan.len());
    for (&geoaddr, settings) in &plan {
        let board = backend.board(BoardAddress::Geo(geoaddr), &globals.settings)?;
        boards.push((geoaddr, board, settings));
    }

    let mut results = Vec::with_capacity(boards.len());
    for (geoaddr, mut board, settings) in boards {
        for &(channel, volts) in settings {
            board.set_voltage(channel, volts).map_err(|err| {
                CliError::new(
                    OPERATION_FAILED,
                    format!("cannot set board {geoaddr:x} channel {channel}: {err}"),
                )
            })?;
        }
        board.ramp().map_err(|err| {
            CliError::new(
                OPERATION_FAILED,
                format!("ramp failed for board at {geoaddr:x}: {err}"),
            )
        })?;
        info!(geoaddr, channels = settings.len(), "board ramped");
        results.push(confirm(geoaddr, board.as_mut(), settings.len()));
    }

    print_results(&results, globals.format);
    Ok(SUCCESS)
}

/// Capture the board's final voltage and status packets.
fn confirm(geoaddr: u8, board: &mut dyn BoardAccess, channels: usize) -> BoardResult {
    BoardResult {
        geoaddr,
        channels,
        voltages_packet: read_back(geoaddr, board, true),
        status_packet: read_back(geoaddr, board, false),
    }
}

fn read_back(geoaddr: u8, board: &mut dyn BoardAccess, voltages: bool) -> Option<String> {
    let latched = if voltages {
        board.latch_voltages()
    } else {
        board.latch_status()
    };
    match latched.and_then(|()| board.last_packet()) {
        Ok(Some(packet)) => Some(hex_words(&packet)),
        Ok(None) => {
            warn!(geoaddr, "board returned no packet");
            None
        }
        Err(err) => {
            warn!(geoaddr, error = %err, "final read-back failed");
            None
        }
    }
}

fn print_results(results: &[BoardResult], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for result in results {
                print_json(result);
            }
        }
        OutputFormat::Table => {
            let mut out = table(["board", "channels", "voltages packet", "status packet"]);
            for result in results {
                out.add_row([
                    format!("{:x}", result.geoaddr),
                    result.channels.to_string(),
                    result.voltages_packet.clone().unwrap_or_default(),
                    result.status_packet.clone().unwrap_or_default(),
                ]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty => {
            for result in results {
                for packet in [&result.voltages_packet, &result.status_packet]
                    .into_iter()
                    .flatten()
                {
                    println!("{packet}");
                }
            }
        }
    }
}

/// `<executable dir>/../vbias.conf`, next to the installed tree.
fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent()?.parent().map(Path::to_path_buf))
        .map(|dir| dir.join(DEFAULT_CONFIG_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Parse a row or column selection such as `2,5,8-14`.
///
/// Indices start at 1. A range end beyond `max` is clamped; a start
/// outside `1..=max` is an error.
pub fn parse_sequence(seq: &str, max: u32) -> CliResult<BTreeSet<u32>> {
    let invalid = |detail: &str| {
        CliError::new(
            BAD_SEQUENCE,
            format!("invalid sequence {seq:?}: {detail} (indices are 1..={max})"),
        )
    };
    let mut selected = BTreeSet::new();
    for token in seq.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (first, last) = match token.split_once('-') {
            Some((first, last)) => (first.trim(), Some(last.trim())),
            None => (token, None),
        };
        let first: u32 = first.parse().map_err(|_| invalid(token))?;
        if first < 1 || first > max {
            return Err(invalid(token));
        }
        let last = match last {
            Some(last) => last.parse::<u32>().map_err(|_| invalid(token))?,
            None => first,
        };
        if last < first {
            return Err(invalid(token));
        }
        selected.extend(first..=last.min(max));
    }
    if selected.is_empty() {
        return Err(invalid("nothing selected"));
    }
    Ok(selected)
}

fn parse_geoaddr(field: &str) -> Option<u8> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u8::from_str_radix(digits, 16).ok()
}

/// Data lines start with a space; everything else is commentary.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.starts_with(' '))
        .map(|(index, line)| (index + 1, line.split_whitespace().collect()))
}

/// Read `geoaddr channel volts` lines.
fn load_settings(path: &Path) -> CliResult<Plan> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        CliError::new(
            INPUT_UNREADABLE,
            format!("cannot read input file {}: {err}", path.display()),
        )
    })?;
    let mut plan = Plan::new();
    for (line_no, fields) in data_lines(&text) {
        let parsed = match fields.as_slice() {
            [geo, chan, volts, ..] => parse_geoaddr(geo)
                .zip(chan.parse::<usize>().ok())
                .zip(volts.parse::<f64>().ok()),
            _ => None,
        };
        match parsed {
            Some(((geoaddr, channel), volts)) => {
                plan.entry(geoaddr).or_default().push((channel, volts));
            }
            None => debug!(line = line_no, "skipping unparsable settings line"),
        }
    }
    Ok(plan)
}

fn parse_map_entry(fields: &[&str]) -> Option<MapEntry> {
    let [geo, chan, col, row, thresh, cap, yield_, ..] = fields else {
        return None;
    };
    Some(MapEntry {
        geoaddr: parse_geoaddr(geo)?,
        channel: chan.parse().ok()?,
        column: col.parse().ok()?,
        row: row.parse().ok()?,
        threshold_v: thresh.parse().ok()?,
        pixel_cap_pf: cap.parse().ok()?,
        mean_yield: yield_.parse().ok()?,
    })
}

/// Read the channel map and compute levels for the selected rows and
/// columns. Each addressed board also gets its gain-mode and health
/// levels, ahead of its channel levels.
fn load_channel_map(
    path: &Path,
    rows: &BTreeSet<u32>,
    columns: &BTreeSet<u32>,
    bias: Bias,
    levels: BoardLevels,
) -> CliResult<Plan> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        CliError::new(
            OPERATION_FAILED,
            format!("cannot read config file {}: {err}", path.display()),
        )
    })?;
    let mut plan = Plan::new();
    for (line_no, fields) in data_lines(&text) {
        let Some(entry) = parse_map_entry(&fields) else {
            debug!(line = line_no, "skipping unparsable channel map line");
            continue;
        };
        if !rows.contains(&entry.row) || !columns.contains(&entry.column) {
            continue;
        }
        let settings = plan.entry(entry.geoaddr).or_insert_with(|| {
            let gain_v = if levels.high_gain { HIGH_GAIN_V } else { LOW_GAIN_V };
            vec![(HEALTH_CHANNEL, levels.health_v), (GAIN_MODE_CHANNEL, gain_v)]
        });
        settings.push((entry.channel, bias.volts(&entry)));
    }
    Ok(plan)
}
