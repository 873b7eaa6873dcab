//! Standalone relay server binary.
//!
//! Usage:
//!   cargo run -p relay_server -- [--config relay.json] [--addr 127.0.0.1:3000]
//!
//! `PORT` in the environment overrides the listen port.
//!
//! Console commands:
//!   status     - Show connected players
//!   kick <id>  - Disconnect a player
//!   quit       - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use relay_server::RelayServer;
use relay_shared::config::RelayConfig;
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<RelayConfig> {
    let args: Vec<String> = env::args().collect();

    let mut config_path = None;
    let mut addr = None;
    let mut spawn_extent = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--spawn-extent" if i + 1 < args.len() => {
                spawn_extent = Some(args[i + 1].parse().context("parse --spawn-extent")?);
                i += 2;
            }
            _ => i += 1,
        }
    }

    let mut cfg = match config_path {
        Some(path) => RelayConfig::from_json_file(&path)?,
        None => RelayConfig::default(),
    };
    if let Some(addr) = addr {
        cfg.server_addr = addr;
    }
    if let Some(extent) = spawn_extent {
        cfg.spawn_extent = extent;
    }
    let cfg = cfg.apply_env()?;
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, spawn_extent = cfg.spawn_extent, "Starting relay server");

    let server = RelayServer::bind(cfg).await.context("bind server")?;
    info!(local = %server.local_addr()?, "Server listening");

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'kick <id>' to drop a player, 'quit' to exit.");
    println!();

    let console = async {
        while let Some(line) = console_rx.recv().await {
            if matches!(line.as_str(), "quit" | "exit") {
                return;
            }
            match server.exec_console(&line).await {
                Ok(output) => {
                    for line in output {
                        println!("{}", line);
                    }
                }
                Err(e) => println!("Error: {}", e),
            }
        }
        // Stdin closed (detached run): keep serving.
        std::future::pending::<()>().await
    };

    tokio::select! {
        res = server.run() => res?,
        _ = console => info!("Server shutting down"),
    }
    Ok(())
}
