//! EPC MME (Mobility Management Entity) authentication daemon

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use epc_mmed::{HssLink, MmeContext, NasPath, UeDispatcher};

/// EPC MME - Mobility Management Entity
#[derive(Parser, Debug)]
#[command(name = "epc-mmed")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EPC Mobility Management Entity")]
struct Args {
    /// Diameter Origin-Host for S6a sessions
    #[arg(long, default_value = "mme.localdomain")]
    origin_host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    log::info!("EPC MME v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(MmeContext::new());
    store.init();

    let (hss, mut air_rx) = HssLink::new(&args.origin_host);
    let (nas, mut nas_rx) = NasPath::new();
    let mut dispatcher = UeDispatcher::new(Arc::clone(&store), Arc::new(hss), nas);

    // The S6a transport and the NAS stack are external to this daemon;
    // until they are wired in, drain their channel ends.
    tokio::spawn(async move {
        while let Some(air) = air_rx.recv().await {
            log::debug!("AIR out [IMSI:{} Session-Id:{}]", air.imsi_bcd, air.session_id);
        }
    });
    tokio::spawn(async move {
        while let Some(ev) = nas_rx.recv().await {
            log::debug!("NAS outcome [session_id:{}]", ev.session_id());
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let (event_tx, mut event_rx) = mpsc::channel(256);
    // external producers (NAS stack, Diameter transport) feed this
    let _event_tx = event_tx;

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            ev = event_rx.recv() => match ev {
                Some(ev) => dispatcher.dispatch(ev).await,
                None => break,
            },
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    store.final_();
    log::info!("EPC MME terminated");
    Ok(())
}
