//! Clipcast command line client.
//!
//! Controls a running `clipcast-server` through its control API, or joins a
//! started broadcast server as a peer and prints every broadcast it receives.
//! A peer reconnects automatically on disconnection (max 5 attempts with 5
//! second interval). A denied password is not retried.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin clipcast-client -- start --password 321
//! cargo run --bin clipcast-client -- broadcast hello
//! cargo run --bin clipcast-client -- connect --password 321
//! ```

use clap::{Parser, Subcommand};
use clipcast_client::{
    ControlClient, ReconnectPolicy, control::DEFAULT_CONTROL_URL, run_peer,
};
use clipcast_shared::{
    logger::setup_logger,
    protocol::{BroadcastPayload, DEFAULT_PEER_ADDR},
};

#[derive(Parser, Debug)]
#[command(name = "clipcast-client")]
#[command(about = "Control a Clipcast broadcast server or join it as a peer", long_about = None)]
#[command(version)]
struct Args {
    /// Base URL of the control API
    #[arg(short = 'u', long, global = true, default_value = DEFAULT_CONTROL_URL, env = "CLIPCAST_CONTROL_URL")]
    control_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the broadcast server with a password
    Start {
        #[arg(short, long)]
        password: String,
    },
    /// Stop the broadcast server
    Stop,
    /// Show the broadcast server status
    Status,
    /// Send a message to every connected peer
    Broadcast { message: String },
    /// Join the broadcast server as a peer and print broadcasts
    Connect {
        /// Address of the broadcast server
        #[arg(short, long, default_value = DEFAULT_PEER_ADDR)]
        addr: String,

        #[arg(short, long)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let control = ControlClient::new(args.control_url);

    match args.command {
        Command::Start { password } => {
            control.start(&password).await?;
            println!("Server started");
        }
        Command::Stop => {
            control.stop().await?;
            println!("Server stopped");
        }
        Command::Status => {
            let status = control.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Broadcast { message } => {
            let result = control.broadcast(&message).await?;
            println!(
                "Delivered to {} peers, {} failed",
                result.succeeded.len(),
                result.failed.len()
            );
            for failure in &result.failed {
                println!("  {}: {}", failure.peer_id, failure.reason);
            }
        }
        Command::Connect { addr, password } => {
            let peer = run_peer(&addr, &password, ReconnectPolicy::default(), |payload| {
                match payload {
                    BroadcastPayload::Text(text) => println!("{}", text),
                    BroadcastPayload::Image(png) => {
                        println!("[image: {} bytes of base64 PNG]", png.len())
                    }
                }
            });
            tokio::select! {
                result = peer => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Disconnecting"),
            }
        }
    }

    Ok(())
}
