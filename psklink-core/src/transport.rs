//! Abstract transport port and outbound status port
//!
//! The engine never touches the radio directly. It issues fire-and-forget
//! commands through [`Transport`] and observes their outcomes later as
//! [`TransportEvent`]s on its input channel, correlated by the ids it
//! allocated when issuing the command.

use uuid::Uuid;

use crate::state::ProvisioningState;

/// Hardware address of a discovered device, in textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddr(pub String);

impl std::fmt::Display for DeviceAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation token for one connection attempt. A fresh id is allocated
/// per attempt so events from a superseded handle can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Correlation token for one characteristic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteId(pub u64);

/// One service from a discovery pass: its UUID and the UUIDs of its
/// characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Asynchronous callbacks from the radio, normalized by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Scan hit. Delivered for every advertisement seen; the engine filters.
    DeviceFound(DeviceAddr),
    /// The connection attempt with this id succeeded.
    Linked(ConnectionId),
    /// The connection with this id failed to establish, or dropped.
    LinkLost(ConnectionId),
    /// Service discovery on this connection completed.
    ServicesDiscovered(ConnectionId, Vec<GattService>),
    /// The write with this id was acknowledged by the device.
    WriteCompleted(WriteId),
}

/// Commands toward the radio. All fire-and-forget: failures and results
/// come back as [`TransportEvent`]s, never as return values. `stop_scan`
/// and `close` must be idempotent.
pub trait Transport {
    fn start_scan(&mut self);
    fn stop_scan(&mut self);
    fn connect(&mut self, device: &DeviceAddr, id: ConnectionId);
    fn discover_services(&mut self, id: ConnectionId);
    fn write(&mut self, id: ConnectionId, write: WriteId, characteristic: Uuid, value: &[u8]);
    fn close(&mut self, id: ConnectionId);
}

/// Predicate selecting the coordinator among scan hits.
pub struct TargetFilter(Box<dyn Fn(&DeviceAddr) -> bool + Send>);

impl TargetFilter {
    pub fn new(predicate: impl Fn(&DeviceAddr) -> bool + Send + 'static) -> Self {
        Self(Box::new(predicate))
    }

    /// Match a fixed hardware address, case-insensitively.
    pub fn addr(addr: &str) -> Self {
        let want = addr.to_string();
        Self::new(move |found| found.0.eq_ignore_ascii_case(&want))
    }

    pub fn matches(&self, addr: &DeviceAddr) -> bool {
        (self.0)(addr)
    }
}

/// Outbound status port. Implementations decide their own execution
/// context; the engine never waits on them.
pub trait StatusSink {
    /// Called once per state transition, in transition order.
    fn on_state_changed(&mut self, state: ProvisioningState);

    /// Called when the engine hits an internal inconsistency and stops.
    fn on_unrecoverable(&mut self);
}
