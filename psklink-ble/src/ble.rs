//! btleplug transport adapter
//!
//! A driver task owns the Bluetooth adapter. The engine's fire-and-forget
//! [`Transport`] commands are forwarded to it over a channel, and every
//! radio outcome (scan hits, connect results, discovery passes, write
//! acknowledgements, disconnects) flows back through the engine's input
//! channel as a [`TransportEvent`].

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use psklink_core::{
    ConnectionId, DeviceAddr, GattService, Input, Transport, TransportEvent, WriteId,
};

#[derive(Debug, thiserror::Error)]
pub enum BleError {
    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),
    #[error("no bluetooth adapter found")]
    NoAdapter,
}

/// Get the default Bluetooth adapter.
pub async fn adapter() -> Result<Adapter, BleError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(BleError::NoAdapter)
}

/// One-shot scan listing nearby devices, flagging the coordinator.
pub async fn list_devices(
    adapter: &Adapter,
    duration: u64,
    coordinator: &str,
) -> Result<(), BleError> {
    println!("Scanning ({duration} seconds)...");

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration)).await;

    let peripherals = adapter.peripherals().await?;

    println!("\nFound {} devices:", peripherals.len());
    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let addr = peripheral.address().to_string();
            let rssi = props
                .rssi
                .map(|r| format!("{r} dBm"))
                .unwrap_or_else(|| "N/A".to_string());
            let marker = if addr.eq_ignore_ascii_case(coordinator) {
                " [COORDINATOR]"
            } else {
                ""
            };

            println!("  {name} ({addr}) RSSI: {rssi}{marker}");
        }
    }

    adapter.stop_scan().await?;
    Ok(())
}

#[derive(Debug)]
enum DriverCommand {
    StartScan,
    StopScan,
    Connect {
        addr: DeviceAddr,
        id: ConnectionId,
    },
    Discover {
        id: ConnectionId,
    },
    Write {
        id: ConnectionId,
        write: WriteId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    Close {
        id: ConnectionId,
    },
}

/// Channel-backed [`Transport`]: every command is forwarded to the driver
/// task, so nothing here can block the engine.
pub struct BleTransport {
    tx: mpsc::UnboundedSender<DriverCommand>,
}

impl BleTransport {
    /// Spawn the driver task on `adapter`. Transport events are delivered
    /// on `events`.
    pub async fn spawn(
        adapter: Adapter,
        events: mpsc::UnboundedSender<Input>,
    ) -> Result<Self, BleError> {
        let central = adapter.events().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(adapter, central, rx, events));
        Ok(Self { tx })
    }

    fn send(&self, command: DriverCommand) {
        // If the driver is gone the engine only ever learns through the
        // event channel, same as any other radio failure.
        let _ = self.tx.send(command);
    }
}

impl Transport for BleTransport {
    fn start_scan(&mut self) {
        self.send(DriverCommand::StartScan);
    }
    fn stop_scan(&mut self) {
        self.send(DriverCommand::StopScan);
    }
    fn connect(&mut self, device: &DeviceAddr, id: ConnectionId) {
        self.send(DriverCommand::Connect {
            addr: device.clone(),
            id,
        });
    }
    fn discover_services(&mut self, id: ConnectionId) {
        self.send(DriverCommand::Discover { id });
    }
    fn write(&mut self, id: ConnectionId, write: WriteId, characteristic: Uuid, value: &[u8]) {
        self.send(DriverCommand::Write {
            id,
            write,
            characteristic,
            value: value.to_vec(),
        });
    }
    fn close(&mut self, id: ConnectionId) {
        self.send(DriverCommand::Close { id });
    }
}

struct Driver {
    adapter: Adapter,
    events: mpsc::UnboundedSender<Input>,
    /// Peripherals seen while scanning, keyed by uppercased address.
    seen: HashMap<String, Peripheral>,
    /// The one live (or in-progress) connection.
    link: Option<(ConnectionId, Peripheral)>,
}

async fn drive(
    adapter: Adapter,
    mut central: Pin<Box<dyn Stream<Item = CentralEvent> + Send>>,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
    events: mpsc::UnboundedSender<Input>,
) {
    let mut driver = Driver {
        adapter,
        events,
        seen: HashMap::new(),
        link: None,
    };

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => driver.on_command(command).await,
                None => break,
            },
            event = central.next() => match event {
                Some(event) => driver.on_central_event(event).await,
                None => break,
            },
        }
    }
}

impl Driver {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(Input::Transport(event));
    }

    /// The peripheral for `id`, unless that handle has been superseded.
    fn peripheral_for(&self, id: ConnectionId) -> Option<Peripheral> {
        match &self.link {
            Some((held, peripheral)) if *held == id => Some(peripheral.clone()),
            _ => {
                debug!("command for superseded connection {id:?} dropped");
                None
            }
        }
    }

    /// Record a scan hit and hand it to the engine, which filters and
    /// latches.
    fn on_scan_hit(&mut self, peripheral: Peripheral) {
        let addr = peripheral.address().to_string();
        self.seen.insert(addr.to_ascii_uppercase(), peripheral);
        self.emit(TransportEvent::DeviceFound(DeviceAddr(addr)));
    }

    async fn on_central_event(&mut self, event: CentralEvent) {
        match event {
            // The platform raises DeviceDiscovered only the first time it
            // caches a peripheral; every later advertisement, including
            // those seen after a scan restart, arrives as DeviceUpdated.
            CentralEvent::DeviceDiscovered(pid) | CentralEvent::DeviceUpdated(pid) => {
                let Ok(peripheral) = self.adapter.peripheral(&pid).await else {
                    return;
                };
                self.on_scan_hit(peripheral);
            }
            CentralEvent::DeviceDisconnected(pid) => {
                if let Some((id, peripheral)) = &self.link {
                    if peripheral.id() == pid {
                        let id = *id;
                        self.emit(TransportEvent::LinkLost(id));
                    }
                }
            }
            _ => {}
        }
    }

    async fn on_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::StartScan => {
                // Fresh cycle: the engine re-acquires the target on every
                // scan, so nothing from the previous cycle is needed.
                self.seen.clear();
                if let Err(e) = self.adapter.start_scan(ScanFilter::default()).await {
                    warn!("start_scan failed: {e}");
                    return;
                }
                // Peripherals the platform already holds cached never yield
                // another DeviceDiscovered; replay them as hits.
                match self.adapter.peripherals().await {
                    Ok(peripherals) => {
                        for peripheral in peripherals {
                            self.on_scan_hit(peripheral);
                        }
                    }
                    Err(e) => debug!("peripherals: {e}"),
                }
            }
            DriverCommand::StopScan => {
                // Idempotent: stopping an already stopped scan is harmless.
                if let Err(e) = self.adapter.stop_scan().await {
                    debug!("stop_scan: {e}");
                }
            }
            DriverCommand::Connect { addr, id } => {
                let Some(peripheral) = self.seen.get(&addr.0.to_ascii_uppercase()).cloned()
                else {
                    warn!("connect requested for unseen device {addr}");
                    self.emit(TransportEvent::LinkLost(id));
                    return;
                };
                self.link = Some((id, peripheral.clone()));
                let events = self.events.clone();
                tokio::spawn(async move {
                    match peripheral.connect().await {
                        Ok(()) => {
                            let _ = events.send(Input::Transport(TransportEvent::Linked(id)));
                        }
                        Err(e) => {
                            warn!("connect failed: {e}");
                            let _ = events.send(Input::Transport(TransportEvent::LinkLost(id)));
                        }
                    }
                });
            }
            DriverCommand::Discover { id } => {
                let Some(peripheral) = self.peripheral_for(id) else {
                    return;
                };
                let events = self.events.clone();
                tokio::spawn(async move {
                    match peripheral.discover_services().await {
                        Ok(()) => {
                            let services = peripheral
                                .services()
                                .into_iter()
                                .map(|s| GattService {
                                    uuid: s.uuid,
                                    characteristics: s
                                        .characteristics
                                        .iter()
                                        .map(|c| c.uuid)
                                        .collect(),
                                })
                                .collect();
                            let _ = events.send(Input::Transport(
                                TransportEvent::ServicesDiscovered(id, services),
                            ));
                        }
                        Err(e) => {
                            warn!("service discovery failed: {e}");
                            let _ = events.send(Input::Transport(TransportEvent::LinkLost(id)));
                        }
                    }
                });
            }
            DriverCommand::Write {
                id,
                write,
                characteristic,
                value,
            } => {
                let Some(peripheral) = self.peripheral_for(id) else {
                    return;
                };
                let events = self.events.clone();
                tokio::spawn(async move {
                    let Some(target) = peripheral
                        .characteristics()
                        .into_iter()
                        .find(|c| c.uuid == characteristic)
                    else {
                        warn!("characteristic {characteristic} not present on device");
                        return;
                    };
                    match peripheral.write(&target, &value, WriteType::WithResponse).await {
                        Ok(()) => {
                            let _ = events
                                .send(Input::Transport(TransportEvent::WriteCompleted(write)));
                        }
                        // A wedged write ends in a link drop, never an ack.
                        Err(e) => warn!("write to {characteristic} failed: {e}"),
                    }
                });
            }
            DriverCommand::Close { id } => {
                let Some((held, peripheral)) = self.link.take() else {
                    return;
                };
                if held != id {
                    self.link = Some((held, peripheral));
                    return;
                }
                if let Err(e) = peripheral.disconnect().await {
                    debug!("disconnect: {e}");
                }
            }
        }
    }
}
