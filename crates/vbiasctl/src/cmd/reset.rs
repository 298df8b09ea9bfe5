use serde::Serialize;
use tracing::info;
use vbiasctl_board::BoardAddress;
use vbiasctl_frame::BROADCAST_GEOADDR;

use crate::backend::{target, Backend};
use crate::cmd::{Globals, ResetArgs};
use crate::exit::{CliError, CliResult, OPERATION_FAILED, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct ResetOutput {
    reset: Vec<u8>,
}

pub fn run(args: ResetArgs, globals: &Globals) -> CliResult<i32> {
    let (address, dest) = target(&args.target, &globals.interface)?;
    let mut backend = Backend::open(&dest)?;

    let addresses: Vec<BoardAddress> = if address == BoardAddress::Geo(BROADCAST_GEOADDR) {
        let boards = backend.probe(&globals.settings)?;
        info!(boards = boards.len(), "resetting every responding board");
        boards.into_keys().map(BoardAddress::Geo).collect()
    } else {
        vec![address]
    };

    let mut reset = Vec::with_capacity(addresses.len());
    for address in addresses {
        let mut board = backend.board(address, &globals.settings)?;
        let geoaddr = board.geoaddr();
        board.reset().map_err(|err| {
            CliError::new(
                OPERATION_FAILED,
                format!("reset failed for board at {geoaddr:x}: {err}"),
            )
        })?;
        reset.push(geoaddr);
    }

    match globals.format {
        OutputFormat::Json => print_json(&ResetOutput { reset }),
        _ if reset.is_empty() => println!("No boards responding"),
        OutputFormat::Table | OutputFormat::Pretty => {
            for geoaddr in reset {
                println!("board {geoaddr:x} reset");
            }
        }
    }
    Ok(SUCCESS)
}
