//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p relay_client -- [--config relay.json] [--addr 127.0.0.1:3000]
//!
//! The client joins the relay, reports its position while movement keys are
//! held, and logs what other players do.
//!
//! Console commands:
//!   move <wasd>   - Hold a set of movement keys, e.g. `move wd`
//!   stop          - Release all keys
//!   goto <x> <y>  - Report an absolute position
//!   hit <damage>  - Report combat damage
//!   status        - Show client status
//!   quit          - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use relay_client::client::{ClientState, RelayClient};
use relay_client::input::{integrate, KeyState};
use relay_shared::{config::RelayConfig, net::ServerMsg};
use tokio::sync::mpsc;
use tracing::info;

fn parse_args() -> anyhow::Result<RelayConfig> {
    let args: Vec<String> = env::args().collect();

    let mut config_path = None;
    let mut addr = None;
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
    let cfg = cfg.apply_env()?;
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
    info!(server = %addr, tick_hz = cfg.tick_hz, "Starting client");

    let mut client = RelayClient::connect(addr).await.context("connect")?;

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

    println!(
        "Connected as {}. Type 'move <wasd>' to walk, 'status' for info, 'quit' to exit.",
        client.player_id
    );
    println!();

    let tick_hz = cfg.tick_hz.max(1);
    let dt = 1.0 / tick_hz as f32;
    let tick_interval = Duration::from_secs_f32(dt);
    let mut keys = KeyState::default();

    loop {
        // Process console commands.
        while let Ok(line) = console_rx.try_recv() {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("quit" | "exit") => return Ok(()),
                Some("move") => keys = KeyState::from_wasd(tokens.next().unwrap_or("")),
                Some("stop") => keys = KeyState::default(),
                _ => match client.exec_console(&line).await {
                    Ok(output) => {
                        for line in output {
                            println!("{}", line);
                        }
                    }
                    Err(e) => println!("Error: {}", e),
                },
            }
        }

        if !keys.is_idle() {
            let next = integrate(client.position, keys, cfg.move_speed, dt);
            client.send_movement(next).await?;
        }

        // Drain notifications for the rest of the tick.
        let deadline = tokio::time::Instant::now() + tick_interval;
        while let Some(msg) = client
            .recv_timeout(deadline.saturating_duration_since(tokio::time::Instant::now()))
            .await?
        {
            match msg {
                ServerMsg::NewPlayer(p) => info!(player_id = %p.player_id, "Player joined"),
                ServerMsg::Disconnect(id) => info!(player_id = %id, "Player left"),
                _ => {}
            }
        }

        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }
    }

    Ok(())
}
