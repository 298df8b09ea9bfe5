use tracing::debug;
use vbiasctl_board::BoardIdentity;

use crate::backend::{destination, Backend};
use crate::cmd::{Globals, ProbeArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

pub fn run(args: ProbeArgs, globals: &Globals) -> CliResult<i32> {
    let dest = destination(args.dest.as_deref(), &globals.interface)?;
    debug!(%dest, list = args.list, "probing for boards");
    let mut backend = Backend::open(&dest)?;
    let boards: Vec<BoardIdentity> = backend
        .probe(&globals.settings)?
        .into_iter()
        .map(|(geoaddr, mac)| BoardIdentity { geoaddr, mac })
        .collect();

    match globals.format {
        OutputFormat::Json => print_json(&boards),
        _ if boards.is_empty() => println!("No boards responding"),
        OutputFormat::Table => {
            let mut out = table(["backplane address", "Vbias board MAC"]);
            for board in &boards {
                out.add_row([format!("{:x}", board.geoaddr), board.mac.to_string()]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty => {
            println!();
            println!("backplane address     Vbias board MAC");
            println!("---------------------------------------");
            for board in &boards {
                println!("      {:<2x}              {}", board.geoaddr, board.mac);
            }
        }
    }
    Ok(SUCCESS)
}
