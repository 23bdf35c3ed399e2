//! # Replay example
//!
//! Decodes a captured adapter stream and prints one JSON line per message,
//! followed by the worker report.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example replay -- capture.log slcan
//! cargo run --example replay -- capture.bin actisense demos/catalog.json
//! ```
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use n2k_gateway::{AdapterConfig, AdapterProtocol, AdapterSource, Catalog, Gateway, GatewayConfig};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let Some(capture) = args.get(1) else {
        eprintln!("usage: replay <capture> [slcan|actisense] [catalog.json]");
        std::process::exit(2);
    };
    let protocol = match args.get(2).map(String::as_str) {
        None | Some("slcan") => AdapterProtocol::default(),
        Some("actisense") => AdapterProtocol::Actisense,
        Some(other) => return Err(format!("unknown protocol {other}").into()),
    };
    let catalog_path = args
        .get(3)
        .map(String::as_str)
        .unwrap_or("demos/catalog.json");

    // ======================================================================
    // 1. Load the PGN catalog
    // ======================================================================
    let catalog = Catalog::from_json_reader(BufReader::new(File::open(catalog_path)?))?;
    tracing::info!(pgns = catalog.len(), path = catalog_path, "catalog loaded");

    // ======================================================================
    // 2. One replay adapter feeding the gateway
    // ======================================================================
    let config = GatewayConfig {
        adapters: vec![AdapterConfig::new(
            "replay",
            protocol,
            AdapterSource::Replay {
                path: capture.into(),
            },
        )],
        ..GatewayConfig::default()
    };
    let (gateway, mut messages) = Gateway::spawn(&config, Arc::new(catalog));

    // ======================================================================
    // 3. Print decoded messages until the capture ends
    // ======================================================================
    let printer = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(message) = messages.recv().await {
            match serde_json::to_string(&message) {
                Ok(line) => println!("{line}"),
                Err(err) => eprintln!("cannot serialize PGN {}: {err}", message.pgn),
            }
            count += 1;
        }
        count
    });

    for (name, outcome) in gateway.join().await {
        match outcome {
            Ok(report) => eprintln!("{name}: {report:?}"),
            Err(err) => eprintln!("{name}: {err}"),
        }
    }
    let count = printer.await?;
    eprintln!("{count} messages decoded");
    Ok(())
}
