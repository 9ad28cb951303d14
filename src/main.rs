//! udpchat - Minimal datagram chat
//!
//! Runs a chat server, a client, or a self-contained demo of both.

use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use udpchat::config::{self, Config, NetworkConfig};
use udpchat::network::{self, Client, Server, SharedLog};
use udpchat::protocol::Packet;

/// udpchat - Minimal datagram chat
#[derive(Parser)]
#[command(name = "udpchat")]
#[command(author = "udpchat Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Exchange chat messages over UDP", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a chat server until Ctrl+C
    Server {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind to (overrides config)
        #[arg(short, long)]
        bind: Option<IpAddr>,
    },

    /// Send messages to a server
    Client {
        /// Server address, host or host:port
        #[arg(short, long)]
        server: String,

        /// Server port when not part of --server
        #[arg(short, long)]
        port: Option<u16>,

        /// Messages to send; reads lines from stdin when omitted
        #[arg(short, long)]
        message: Vec<String>,
    },

    /// Run a server and a client on localhost and print the transcript
    Demo {
        /// Number of messages the client sends
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose || config.general.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Server { port, bind } => {
            run_server(config, port, bind).await?;
        }
        Commands::Client {
            server,
            port,
            message,
        } => {
            run_client(config, server, port, message).await?;
        }
        Commands::Demo { count } => {
            run_demo(config, count).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Run the server until Ctrl+C
async fn run_server(config: Config, port: Option<u16>, bind: Option<IpAddr>) -> anyhow::Result<()> {
    let mut net_config = config.network.clone();
    if let Some(port) = port {
        net_config.port = port;
    }
    if let Some(bind) = bind {
        net_config.bind_address = bind;
    }

    let log = network::shared_log();
    let server = Server::bind(&net_config, config.protocol.version, log.clone()).await?;
    let received = server.received();

    println!("\n========================================");
    println!("  udpchat Server Running");
    println!("========================================");
    println!("  Host: {}", config.general.name);
    println!("  Address: {}", server.local_addr());
    println!("  Protocol version: {}", config.protocol.version);
    println!("========================================");
    println!("\nPress Ctrl+C to stop.\n");

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    let received = received
        .lock()
        .map_err(|_| anyhow::anyhow!("received set poisoned"))?;
    println!("\nReceived {} message(s):", received.len());
    for packet in received.iter() {
        print_packet(packet);
    }

    Ok(())
}

/// Send messages from the command line or stdin
async fn run_client(
    config: Config,
    server: String,
    port: Option<u16>,
    messages: Vec<String>,
) -> anyhow::Result<()> {
    let server_addr = network::resolve_host(&server, port.unwrap_or(config.network.port)).await?;
    tracing::info!("Sending to {} as '{}'", server_addr, config.general.name);

    let mut client = Client::new(
        config.network.clone(),
        config.protocol.version,
        server_addr,
        network::shared_log(),
    )
    .await?;

    if messages.is_empty() {
        println!("Connected to {}. Type a message per line, Ctrl+D to quit.", server_addr);
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            send_and_report(&mut client, &line).await?;
        }
    } else {
        for message in &messages {
            send_and_report(&mut client, message).await?;
        }
    }

    Ok(())
}

async fn send_and_report(client: &mut Client, text: &str) -> anyhow::Result<()> {
    match client.send_message(text).await? {
        Some(reply) => match reply.acked_sequence() {
            Some(seq) => println!("ACK for #{} from {}", seq, client.server_addr()),
            None => println!("Reply from {}: {}", client.server_addr(), reply),
        },
        None => println!("No reply for '{}'", text),
    }
    Ok(())
}

/// Server and client on localhost sharing one transcript
async fn run_demo(config: Config, count: usize) -> anyhow::Result<()> {
    let log: SharedLog = network::shared_log();
    let version = config.protocol.version;

    let server_config = NetworkConfig {
        port: 0,
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ..config.network.clone()
    };
    let server = Server::bind(&server_config, version, log.clone()).await?;
    let server_addr = server.local_addr();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    let mut client = Client::new(config.network.clone(), version, server_addr, log.clone()).await?;
    for i in 0..count {
        let text = format!("Hello, how are you? ({})", i);
        send_and_report(&mut client, &text).await?;
    }

    let _ = stop_tx.send(());
    server_task.await??;

    let log = log
        .lock()
        .map_err(|_| anyhow::anyhow!("transcript poisoned"))?;
    println!("\nTranscript ({} entries):", log.len());
    for packet in log.iter() {
        print_packet(packet);
    }

    Ok(())
}

fn print_packet(packet: &Packet) {
    println!(
        "  [{}] #{} v{} {:?}",
        packet.packet_type(),
        packet.sequence(),
        packet.version(),
        packet.text()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["udpchat", "demo", "-n", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Demo { count: 3 }));
    }

    #[test]
    fn test_client_messages() {
        let cli = Cli::try_parse_from([
            "udpchat", "client", "--server", "127.0.0.1:1234", "-m", "hi", "-m", "there",
        ])
        .unwrap();
        match cli.command {
            Commands::Client { server, message, .. } => {
                assert_eq!(server, "127.0.0.1:1234");
                assert_eq!(message, vec!["hi", "there"]);
            }
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_default_port_matches_protocol() {
        assert_eq!(NetworkConfig::default().port, udpchat::protocol::DEFAULT_PORT);
    }
}
