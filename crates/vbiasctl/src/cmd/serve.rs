use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vbiasctl_relay::RelayConfig;

use crate::cmd::{Globals, ServeArgs};
use crate::exit::{CliError, CliResult, OPERATION_FAILED};

pub fn run(args: ServeArgs, globals: &Globals) -> CliResult<i32> {
    let config = RelayConfig {
        port: args.port,
        default_interface: args.interface.unwrap_or_else(|| globals.interface.clone()),
        session: globals.settings.session.clone(),
        probe: globals.settings.probe.clone(),
        ..RelayConfig::default()
    };
    serve(config)
}

#[cfg(target_os = "linux")]
fn serve(config: RelayConfig) -> CliResult<i32> {
    use vbiasctl_relay::{RawOpener, RelayServer};

    use crate::exit::{relay_error, SUCCESS};

    let port = config.port;
    let mut server = RelayServer::bind(RawOpener, config)
        .map_err(|err| relay_error(&format!("cannot listen on port {port}"), err))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(shutdown.clone())?;

    server
        .run(&shutdown)
        .map_err(|err| relay_error("relay daemon failed", err))?;
    Ok(SUCCESS)
}

#[cfg(not(target_os = "linux"))]
fn serve(config: RelayConfig) -> CliResult<i32> {
    Err(CliError::new(
        crate::exit::CONNECTION_FAILED,
        format!(
            "cannot serve {}: raw interface access needs Linux",
            config.default_interface
        ),
    ))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            OPERATION_FAILED,
            format!("signal handler setup failed: {err}"),
        )
    })
}
