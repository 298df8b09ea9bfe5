use std::collections::BTreeMap;

use serde::Serialize;
use vbiasctl_board::{BoardAccess, GainMode, Reading};
use vbiasctl_frame::CHANNELS;

use crate::backend::{target, Backend};
use crate::cmd::{Globals, ReadArgs};
use crate::exit::{CliError, CliResult, CONNECTION_FAILED, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

/// Channels per printed row.
const CHANNELS_PER_ROW: usize = 5;

#[derive(Serialize)]
struct BoardReport {
    geoaddr: u8,
    mac: String,
    readings: BTreeMap<&'static str, f64>,
    gain_mode: GainMode,
    voltages: Vec<f64>,
}

pub fn run(args: ReadArgs, globals: &Globals) -> CliResult<i32> {
    let (address, dest) = target(&args.target, &globals.interface)?;
    let backend = Backend::open(&dest)?;
    let mut board = backend.board(address, &globals.settings)?;
    let report = collect(board.as_mut()).map_err(|err| {
        CliError::new(
            CONNECTION_FAILED,
            format!("cannot read board {:#04x}: {err}", board.geoaddr()),
        )
    })?;

    match globals.format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => print_table(&report),
        OutputFormat::Pretty => print_pretty(&report),
    }
    Ok(SUCCESS)
}

/// Everything in the report comes from one status and one voltage snapshot.
fn collect(board: &mut dyn BoardAccess) -> vbiasctl_board::Result<BoardReport> {
    board.latch_status()?;
    board.latch_voltages()?;

    let mut readings = BTreeMap::new();
    for reading in shown_readings() {
        readings.insert(key(reading), board.reading(reading)?);
    }
    let gain_mode = board.gain_mode()?;
    let voltages = (0..CHANNELS)
        .map(|chan| board.voltage(chan))
        .collect::<vbiasctl_board::Result<Vec<_>>>()?;

    Ok(BoardReport {
        geoaddr: board.geoaddr(),
        mac: board.mac_addr().to_string(),
        readings,
        gain_mode,
        voltages,
    })
}

/// The gain mode is printed with its monitor voltage rather than as a number.
fn shown_readings() -> impl Iterator<Item = Reading> {
    Reading::ALL
        .into_iter()
        .filter(|reading| *reading != Reading::Gainmode)
}

fn key(reading: Reading) -> &'static str {
    reading.verb().trim_start_matches("get_")
}

fn print_table(report: &BoardReport) {
    let mut out = table(["reading", "value", "unit"]);
    for reading in shown_readings() {
        let value = report.readings[key(reading)];
        let value = if reading == Reading::Vgainmode {
            format!("{value:.3} ({})", report.gain_mode)
        } else {
            format!("{value:.3}")
        };
        out.add_row([reading.label().to_string(), value, reading.unit().to_string()]);
    }
    println!("board {:x} ({})", report.geoaddr, report.mac);
    println!("{out}");

    let mut header = Vec::with_capacity(CHANNELS_PER_ROW);
    for col in 0..CHANNELS_PER_ROW {
        header.push(format!("+{col}"));
    }
    let mut channels = table(std::iter::once("channel".to_string()).chain(header));
    for (row, volts) in report.voltages.chunks(CHANNELS_PER_ROW).enumerate() {
        let mut cells = vec![(row * CHANNELS_PER_ROW).to_string()];
        cells.extend(volts.iter().map(|v| format!("{v:.3}")));
        channels.add_row(cells);
    }
    println!("{channels}");
}

fn print_pretty(report: &BoardReport) {
    println!();
    println!("Readings received from Vbias board {:x}:", report.geoaddr);
    for reading in shown_readings() {
        let value = report.readings[key(reading)];
        if reading == Reading::Vgainmode {
            println!("    {} = {value} V ({})", reading.label(), report.gain_mode);
        } else {
            println!("    {} = {value} {}", reading.label(), reading.unit());
        }
    }
    print!("    channel voltages are (V):");
    for (row, volts) in report.voltages.chunks(CHANNELS_PER_ROW).enumerate() {
        print!("\n    ");
        for (col, v) in volts.iter().enumerate() {
            print!("{:4}:{v:7.3}", row * CHANNELS_PER_ROW + col);
        }
    }
    println!();
    println!();
}
