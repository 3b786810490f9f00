use std::{env, io, process};

use fare_gate::Engine;
use fare_gate::csv::{load_fares, read_commands, write_cards};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let (Some(fares_path), Some(commands_path)) = (args.next(), args.next()) else {
        eprintln!("usage: fare-gate <fares.csv> <commands.csv>");
        process::exit(2);
    };

    let fares = match load_fares(&fares_path) {
        Ok(fares) => fares,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let commands = match read_commands(commands_path) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let engine = Engine::new(fares);
    if engine.fares().is_empty() {
        warn!(path = %fares_path, "fare table is empty, every exit will be refused");
    }
    info!(
        routes = engine.fares().len(),
        stations = engine.fares().stations().len(),
        "fare table loaded"
    );

    let (command_sender, command_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(command) => {
                    if command_sender.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(command_receiver)).await;

    let mut cards = match engine.list().await {
        Ok(cards) => cards,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };
    cards.sort_by(|a, b| a.card.cmp(&b.card));

    if let Err(e) = write_cards(&cards, io::stdout().lock()) {
        error!("{e}");
        process::exit(1);
    }
}
