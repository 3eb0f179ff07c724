//! psklink - provision a sensor network coordinator over BLE
//!
//! Finds the coordinator by hardware address, connects, resolves its PSK
//! provisioning service, then writes credentials scanned from QR payloads:
//! the node MAC first, the pre-shared key once the MAC write is
//! acknowledged. The loop never terminates; after each round it waits for
//! the next payload, and a dropped connection restarts the scan.

mod ble;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use psklink_core::{Engine, Input, ProvisioningState, StatusSink, TargetFilter, status_text};

#[derive(Parser)]
#[command(name = "psklink")]
#[command(about = "QR-to-BLE pre-shared key provisioning for sensor network coordinators")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby devices and flag the coordinator
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Coordinator hardware address
        #[arg(short, long, default_value = psklink_proto::ble::DEFAULT_COORDINATOR_ADDR)]
        coordinator: String,
    },
    /// Run the provisioning loop, reading QR payloads line-by-line from stdin
    Run {
        /// Coordinator hardware address
        #[arg(short, long, default_value = psklink_proto::ble::DEFAULT_COORDINATOR_ADDR)]
        device: String,
    },
}

/// Status sink printing the fixed status lines to stdout. The engine never
/// waits on this.
struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn on_state_changed(&mut self, state: ProvisioningState) {
        println!("{}", status_text(state));
    }

    fn on_unrecoverable(&mut self) {
        println!("{}", psklink_core::RESTART_STATUS);
    }
}

/// The code-reader collaborator: each stdin line is one scanned payload,
/// an empty line a cancelled scan.
async fn read_payloads(tx: mpsc::UnboundedSender<Input>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        let payload = if line.is_empty() { None } else { Some(line) };
        if tx.send(Input::CodeScanned(payload)).is_err() {
            break;
        }
    }
}

async fn run(device: &str) -> Result<(), ble::BleError> {
    let adapter = ble::adapter().await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let transport = ble::BleTransport::spawn(adapter, tx.clone()).await?;
    tokio::spawn(read_payloads(tx.clone()));

    let engine = Engine::new(transport, ConsoleStatus, TargetFilter::addr(device), tx);
    engine.run(rx).await;
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            duration,
            coordinator,
        } => match ble::adapter().await {
            Ok(adapter) => ble::list_devices(&adapter, duration, &coordinator).await,
            Err(e) => Err(e),
        },
        Commands::Run { device } => run(&device).await,
    };

    if let Err(e) = result {
        eprintln!("psklink: {e}");
        std::process::exit(1);
    }
}
