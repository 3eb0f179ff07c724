//! Transport event router
//!
//! One engine task owns the provisioning state. Every asynchronous input -
//! radio callbacks, code-reader payloads, revert-timer firings - arrives on
//! a single mpsc channel, so transitions can never race. The engine
//! normalizes each input into the state machine's event vocabulary, steps
//! the machine, notifies the status sink on every transition, and executes
//! the returned command against the transport.

use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::mpsc;

use psklink_proto::Credentials;
use psklink_proto::ble;

use crate::state::{Command, Event, ProvisioningState, handle_event};
use crate::transport::{
    ConnectionId, DeviceAddr, GattService, StatusSink, TargetFilter, Transport, TransportEvent,
    WriteId,
};

/// Delay between the PSK write acknowledgement and reverting to
/// `Connected` so the "Key Shared." status stays visible.
pub const REVERT_DELAY: Duration = Duration::from_millis(2500);

/// Everything the engine consumes, already serialized onto one channel.
#[derive(Debug)]
pub enum Input {
    /// Start the provisioning loop.
    Begin,
    /// A radio callback, normalized by the transport adapter.
    Transport(TransportEvent),
    /// A payload from the code reader, or `None` if the user cancelled.
    CodeScanned(Option<String>),
    /// The revert timer scheduled at `generation` fired.
    RevertElapsed { generation: u64 },
}

/// Which characteristic the last issued write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteTarget {
    Identity,
    Secret,
}

pub struct Engine<T: Transport, S: StatusSink> {
    transport: T,
    sink: S,
    target: TargetFilter,
    /// Sender into the engine's own input channel, for timer re-entry.
    tx: mpsc::UnboundedSender<Input>,

    state: ProvisioningState,
    /// Bumped on every state transition; stamps revert timers so a stale
    /// firing after a superseding transition is discarded.
    generation: u64,
    /// Scan-hit latch: set on the first matching hit, cleared only when a
    /// start-scan command runs, so duplicate hits before the stop takes
    /// effect cannot start a second connection.
    matched: bool,
    /// Address from the latest matching scan hit, re-acquired per scan.
    found: Option<DeviceAddr>,
    /// The one live (or in-progress) connection handle.
    link: Option<ConnectionId>,
    /// Last issued write, for correlating completions.
    pending_write: Option<(WriteId, WriteTarget)>,
    /// Parsed payload awaiting acceptance by the machine.
    scanned: Option<Credentials>,
    /// Accepted credentials, held until both writes complete.
    credentials: Option<Credentials>,

    next_connection: u64,
    next_write: u64,
    failed: bool,
}

impl<T: Transport, S: StatusSink> Engine<T, S> {
    pub fn new(
        transport: T,
        sink: S,
        target: TargetFilter,
        tx: mpsc::UnboundedSender<Input>,
    ) -> Self {
        Self {
            transport,
            sink,
            target,
            tx,
            state: ProvisioningState::Init,
            generation: 0,
            matched: false,
            found: None,
            link: None,
            pending_write: None,
            scanned: None,
            credentials: None,
            next_connection: 0,
            next_write: 0,
            failed: false,
        }
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    /// Consume the input channel until it closes or the engine fails.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        self.handle(Input::Begin);
        while let Some(input) = rx.recv().await {
            self.handle(input);
            if self.failed {
                break;
            }
        }
    }

    /// Process one input. The caller guarantees mutual exclusion by only
    /// ever calling this from the channel consumer.
    pub fn handle(&mut self, input: Input) {
        if self.failed {
            return;
        }
        match input {
            Input::Begin => self.step(Event::Begin),
            Input::Transport(event) => self.on_transport(event),
            Input::CodeScanned(None) => debug!("code reader cancelled"),
            Input::CodeScanned(Some(text)) => self.on_payload(&text),
            Input::RevertElapsed { generation } => {
                if generation == self.generation {
                    self.step(Event::RevertElapsed);
                } else {
                    debug!("stale revert timer (generation {generation}) ignored");
                }
            }
        }
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::DeviceFound(addr) => {
                if self.matched {
                    debug!("scan hit {addr} after match, ignored");
                    return;
                }
                if !self.target.matches(&addr) {
                    debug!("scan hit {addr} does not match target");
                    return;
                }
                self.matched = true;
                self.found = Some(addr);
                self.step(Event::TargetFound);
            }
            TransportEvent::Linked(id) => {
                if self.link != Some(id) {
                    debug!("link-up for superseded connection {id:?} ignored");
                    return;
                }
                self.step(Event::Linked);
            }
            TransportEvent::LinkLost(id) => {
                if self.link != Some(id) {
                    debug!("link-down for superseded connection {id:?} ignored");
                    return;
                }
                // Release the handle before the restart-scan command runs.
                self.transport.close(id);
                self.link = None;
                self.pending_write = None;
                self.credentials = None;
                self.step(Event::LinkLost);
            }
            TransportEvent::ServicesDiscovered(id, services) => {
                if self.link != Some(id) {
                    debug!("discovery result for superseded connection {id:?} ignored");
                    return;
                }
                if service_resolved(&services) {
                    self.step(Event::ServiceResolved);
                } else {
                    debug!("provisioning service not (fully) present, waiting for link loss");
                }
            }
            TransportEvent::WriteCompleted(write) => match self.pending_write {
                Some((pending, target)) if pending == write => {
                    self.pending_write = None;
                    self.step(match target {
                        WriteTarget::Identity => Event::IdentityAcked,
                        WriteTarget::Secret => Event::SecretAcked,
                    });
                }
                _ => debug!("completion for write {write:?} does not match last issued, ignored"),
            },
        }
    }

    fn on_payload(&mut self, text: &str) {
        match Credentials::parse(text) {
            Ok(credentials) => {
                self.scanned = Some(credentials);
                self.step(Event::CredentialsAccepted);
                // Dropped here if the machine was not ready for it.
                self.scanned = None;
            }
            Err(e) => {
                warn!("rejected credential payload: {e}");
                self.step(Event::CredentialsRejected);
            }
        }
    }

    fn step(&mut self, event: Event) {
        let (next, command) = handle_event(self.state, event);
        let changed = next != self.state;
        // Invalid credentials re-confirm Connected: the one refresh that is
        // not a state change.
        let reconfirm =
            self.state == ProvisioningState::Connected && event == Event::CredentialsRejected;

        if !changed && !reconfirm && command.is_none() {
            debug!("event {event:?} ignored in state {:?}", self.state);
            return;
        }

        debug!("{:?} --{event:?}--> {next:?}", self.state);
        self.state = next;
        if changed {
            self.generation += 1;
        }
        self.sink.on_state_changed(next);
        if let Some(command) = command {
            self.dispatch(command);
        }
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::StartScan => {
                // Entering Searching re-arms the scan-hit latch.
                self.matched = false;
                self.found = None;
                self.transport.start_scan();
            }
            Command::Connect => {
                let Some(addr) = self.found.clone() else {
                    return self.fail("connect requested with no matched device");
                };
                self.transport.stop_scan();
                // Supersede a stale handle before opening a new one.
                if let Some(old) = self.link.take() {
                    self.transport.close(old);
                }
                let id = ConnectionId(self.next_connection);
                self.next_connection += 1;
                self.link = Some(id);
                self.transport.connect(&addr, id);
            }
            Command::Discover => {
                let Some(id) = self.link else {
                    return self.fail("discovery requested with no connection");
                };
                self.transport.discover_services(id);
            }
            Command::WriteIdentity => {
                let Some(credentials) = self.scanned.take() else {
                    return self.fail("identity write requested with no credentials");
                };
                let Some(id) = self.link else {
                    return self.fail("identity write requested with no connection");
                };
                let write = self.allocate_write(WriteTarget::Identity);
                self.transport
                    .write(id, write, ble::NODE_MAC_UUID, credentials.identity.as_bytes());
                self.credentials = Some(credentials);
            }
            Command::WriteSecret => {
                let Some(credentials) = &self.credentials else {
                    return self.fail("psk write requested with no credentials");
                };
                let secret = credentials.secret.clone();
                let Some(id) = self.link else {
                    return self.fail("psk write requested with no connection");
                };
                let write = self.allocate_write(WriteTarget::Secret);
                self.transport
                    .write(id, write, ble::PSK_UUID, secret.as_bytes());
            }
            Command::ScheduleRevert => {
                // Both writes acknowledged, the payload is no longer needed.
                self.credentials = None;
                let tx = self.tx.clone();
                let generation = self.generation;
                tokio::spawn(async move {
                    tokio::time::sleep(REVERT_DELAY).await;
                    let _ = tx.send(Input::RevertElapsed { generation });
                });
            }
        }
    }

    fn allocate_write(&mut self, target: WriteTarget) -> WriteId {
        let write = WriteId(self.next_write);
        self.next_write += 1;
        self.pending_write = Some((write, target));
        write
    }

    /// Internal inconsistency: unreachable while the transition table
    /// holds. The session is over; the user has to restart.
    fn fail(&mut self, what: &str) {
        error!("unrecoverable: {what} (state {:?})", self.state);
        self.failed = true;
        self.sink.on_unrecoverable();
    }
}

/// True when one service carries the provisioning UUID and both writable
/// characteristics in the same discovery pass.
fn service_resolved(services: &[GattService]) -> bool {
    services.iter().any(|s| {
        s.uuid == ble::PSK_SERVICE_UUID
            && s.characteristics.contains(&ble::NODE_MAC_UUID)
            && s.characteristics.contains(&ble::PSK_UUID)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use uuid::Uuid;

    use crate::state::{ProvisioningState as S, RESTART_STATUS, status_text};

    use super::*;

    const COORDINATOR: &str = "00:00:11:33:DC:00";
    const PAYLOAD: &str = ">0011223344556677|s3cr3t<";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        StartScan,
        StopScan,
        Connect(String, ConnectionId),
        Discover(ConnectionId),
        Write(ConnectionId, WriteId, Uuid, Vec<u8>),
        Close(ConnectionId),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Call>>>);

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
            self.0.lock().unwrap().iter().filter(|c| f(c)).count()
        }
    }

    impl Transport for Recorder {
        fn start_scan(&mut self) {
            self.0.lock().unwrap().push(Call::StartScan);
        }
        fn stop_scan(&mut self) {
            self.0.lock().unwrap().push(Call::StopScan);
        }
        fn connect(&mut self, device: &DeviceAddr, id: ConnectionId) {
            self.0.lock().unwrap().push(Call::Connect(device.0.clone(), id));
        }
        fn discover_services(&mut self, id: ConnectionId) {
            self.0.lock().unwrap().push(Call::Discover(id));
        }
        fn write(&mut self, id: ConnectionId, write: WriteId, characteristic: Uuid, value: &[u8]) {
            self.0
                .lock()
                .unwrap()
                .push(Call::Write(id, write, characteristic, value.to_vec()));
        }
        fn close(&mut self, id: ConnectionId) {
            self.0.lock().unwrap().push(Call::Close(id));
        }
    }

    #[derive(Clone, Default)]
    struct StatusLog(Arc<Mutex<Vec<&'static str>>>);

    impl StatusLog {
        fn lines(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    impl StatusSink for StatusLog {
        fn on_state_changed(&mut self, state: S) {
            self.0.lock().unwrap().push(status_text(state));
        }
        fn on_unrecoverable(&mut self) {
            self.0.lock().unwrap().push(RESTART_STATUS);
        }
    }

    type TestEngine = Engine<Recorder, StatusLog>;

    fn engine() -> (
        TestEngine,
        Recorder,
        StatusLog,
        mpsc::UnboundedReceiver<Input>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Recorder::default();
        let sink = StatusLog::default();
        let engine = Engine::new(
            transport.clone(),
            sink.clone(),
            TargetFilter::addr(COORDINATOR),
            tx,
        );
        (engine, transport, sink, rx)
    }

    fn resolved_services() -> Vec<GattService> {
        vec![GattService {
            uuid: ble::PSK_SERVICE_UUID,
            characteristics: vec![ble::NODE_MAC_UUID, ble::PSK_UUID],
        }]
    }

    /// Drive a fresh engine to Connected. Returns the live connection id.
    fn connect(engine: &mut TestEngine) -> ConnectionId {
        engine.handle(Input::Begin);
        engine.handle(Input::Transport(TransportEvent::DeviceFound(DeviceAddr(
            COORDINATOR.to_string(),
        ))));
        let id = ConnectionId(0);
        engine.handle(Input::Transport(TransportEvent::Linked(id)));
        engine.handle(Input::Transport(TransportEvent::ServicesDiscovered(
            id,
            resolved_services(),
        )));
        assert_eq!(engine.state(), S::Connected);
        id
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_end_to_end() {
        let (mut engine, transport, sink, mut rx) = engine();
        let id = connect(&mut engine);

        engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(0))));
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(1))));
        assert_eq!(engine.state(), S::SecretSent);

        // The revert timer comes back through the input channel.
        let input = rx.recv().await.expect("revert timer fired");
        engine.handle(input);
        assert_eq!(engine.state(), S::Connected);

        assert_eq!(
            sink.lines(),
            vec![
                "Scanning...",
                "Connecting...",
                "Connecting...",
                "Touch to Scan",
                "Sharing Key...",
                "Sharing Key...",
                "Key Shared.",
                "Touch to Scan",
            ]
        );

        let calls = transport.calls();
        assert_eq!(
            calls,
            vec![
                Call::StartScan,
                Call::StopScan,
                Call::Connect(COORDINATOR.to_string(), id),
                Call::Discover(id),
                Call::Write(id, WriteId(0), ble::NODE_MAC_UUID, b"0011223344556677".to_vec()),
                Call::Write(id, WriteId(1), ble::PSK_UUID, b"s3cr3t".to_vec()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_scan_hits_connect_once() {
        let (mut engine, transport, _, _rx) = engine();
        engine.handle(Input::Begin);

        let hit = TransportEvent::DeviceFound(DeviceAddr(COORDINATOR.to_string()));
        engine.handle(Input::Transport(hit.clone()));
        engine.handle(Input::Transport(hit.clone()));
        engine.handle(Input::Transport(hit));

        assert_eq!(transport.count(|c| matches!(c, Call::Connect(..))), 1);
        assert_eq!(transport.count(|c| matches!(c, Call::StopScan)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_matching_devices_are_ignored() {
        let (mut engine, transport, _, _rx) = engine();
        engine.handle(Input::Begin);

        engine.handle(Input::Transport(TransportEvent::DeviceFound(DeviceAddr(
            "AA:BB:CC:DD:EE:FF".to_string(),
        ))));

        assert_eq!(engine.state(), S::Searching);
        assert_eq!(transport.count(|c| matches!(c, Call::Connect(..))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn target_address_match_is_case_insensitive() {
        let (mut engine, _, _, _rx) = engine();
        engine.handle(Input::Begin);

        engine.handle(Input::Transport(TransportEvent::DeviceFound(DeviceAddr(
            "00:00:11:33:dc:00".to_string(),
        ))));

        assert_eq!(engine.state(), S::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_rejected_in_place() {
        let (mut engine, transport, sink, _rx) = engine();
        connect(&mut engine);
        let before = sink.lines().len();

        engine.handle(Input::CodeScanned(Some(
            "0011223344556677|s3cr3t".to_string(),
        )));

        assert_eq!(engine.state(), S::Connected);
        assert_eq!(transport.count(|c| matches!(c, Call::Write(..))), 0);
        // The status is re-confirmed, not changed.
        assert_eq!(sink.lines()[before..], ["Touch to Scan"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_code_scan_is_a_no_op() {
        let (mut engine, transport, sink, _rx) = engine();
        connect(&mut engine);
        let before = sink.lines().len();

        engine.handle(Input::CodeScanned(None));

        assert_eq!(engine.state(), S::Connected);
        assert_eq!(sink.lines().len(), before);
        assert_eq!(transport.count(|c| matches!(c, Call::Write(..))), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_payload_before_ack_writes_once() {
        let (mut engine, transport, _, _rx) = engine();
        connect(&mut engine);

        engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));
        engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));

        assert_eq!(engine.state(), S::CredentialsReady);
        assert_eq!(transport.count(|c| matches!(c, Call::Write(..))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_restarts_scan_and_closes_once() {
        // Loss at each connected-family stage: one close, one restart-scan.
        for stage in 0..5 {
            let (mut engine, transport, _, _rx) = engine();
            engine.handle(Input::Begin);
            engine.handle(Input::Transport(TransportEvent::DeviceFound(DeviceAddr(
                COORDINATOR.to_string(),
            ))));
            let id = ConnectionId(0);
            if stage >= 1 {
                engine.handle(Input::Transport(TransportEvent::Linked(id)));
            }
            if stage >= 2 {
                engine.handle(Input::Transport(TransportEvent::ServicesDiscovered(
                    id,
                    resolved_services(),
                )));
            }
            if stage >= 3 {
                engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));
            }
            if stage >= 4 {
                engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(0))));
            }

            engine.handle(Input::Transport(TransportEvent::LinkLost(id)));
            // A duplicate loss report must not close twice.
            engine.handle(Input::Transport(TransportEvent::LinkLost(id)));

            assert_eq!(engine.state(), S::Searching, "stage {stage}");
            assert_eq!(transport.count(|c| matches!(c, Call::Close(_))), 1, "stage {stage}");
            assert_eq!(transport.count(|c| matches!(c, Call::StartScan)), 2, "stage {stage}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_supersedes_the_stale_handle() {
        let (mut engine, transport, _, _rx) = engine();
        connect(&mut engine);

        engine.handle(Input::Transport(TransportEvent::LinkLost(ConnectionId(0))));
        engine.handle(Input::Transport(TransportEvent::DeviceFound(DeviceAddr(
            COORDINATOR.to_string(),
        ))));

        let calls = transport.calls();
        assert!(calls.contains(&Call::Connect(COORDINATOR.to_string(), ConnectionId(1))));
        // Events for the old handle are dead after the close.
        engine.handle(Input::Transport(TransportEvent::Linked(ConnectionId(0))));
        assert_eq!(engine.state(), S::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn rediscovery_after_loss_runs_a_full_second_round() {
        let (mut engine, transport, _, mut rx) = engine();
        let first = connect(&mut engine);

        engine.handle(Input::Transport(TransportEvent::LinkLost(first)));
        assert_eq!(engine.state(), S::Searching);

        // The restarted scan sees the coordinator again; the transport is
        // expected to replay cached devices as hits here.
        engine.handle(Input::Transport(TransportEvent::DeviceFound(DeviceAddr(
            COORDINATOR.to_string(),
        ))));
        let second = ConnectionId(1);
        engine.handle(Input::Transport(TransportEvent::Linked(second)));
        engine.handle(Input::Transport(TransportEvent::ServicesDiscovered(
            second,
            resolved_services(),
        )));
        assert_eq!(engine.state(), S::Connected);

        engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(0))));
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(1))));
        let input = rx.recv().await.expect("revert timer fired");
        engine.handle(input);

        assert_eq!(engine.state(), S::Connected);
        assert_eq!(
            transport.count(|c| matches!(c, Call::Write(i, ..) if *i == second)),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn partial_discovery_does_not_resolve() {
        let (mut engine, _, _, _rx) = engine();
        engine.handle(Input::Begin);
        engine.handle(Input::Transport(TransportEvent::DeviceFound(DeviceAddr(
            COORDINATOR.to_string(),
        ))));
        engine.handle(Input::Transport(TransportEvent::Linked(ConnectionId(0))));

        // Service present but with only one of the two characteristics.
        engine.handle(Input::Transport(TransportEvent::ServicesDiscovered(
            ConnectionId(0),
            vec![GattService {
                uuid: ble::PSK_SERVICE_UUID,
                characteristics: vec![ble::PSK_UUID],
            }],
        )));

        assert_eq!(engine.state(), S::Discovering);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_write_completion_is_ignored() {
        let (mut engine, transport, _, _rx) = engine();
        connect(&mut engine);
        engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));

        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(7))));

        assert_eq!(engine.state(), S::CredentialsReady);
        assert_eq!(transport.count(|c| matches!(c, Call::Write(..))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_revert_timer_is_discarded() {
        let (mut engine, _, _, mut rx) = engine();
        let id = connect(&mut engine);

        engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(0))));
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(1))));
        assert_eq!(engine.state(), S::SecretSent);

        // The link drops before the timer fires; the timer's generation is
        // now stale and its firing must not move the machine.
        engine.handle(Input::Transport(TransportEvent::LinkLost(id)));
        assert_eq!(engine.state(), S::Searching);

        let input = rx.recv().await.expect("revert timer fired");
        engine.handle(input);
        assert_eq!(engine.state(), S::Searching);
    }

    #[tokio::test(start_paused = true)]
    async fn revert_timer_uses_the_fixed_delay() {
        let (mut engine, _, _, mut rx) = engine();
        connect(&mut engine);
        engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(0))));

        let before = tokio::time::Instant::now();
        engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(1))));
        let input = rx.recv().await.expect("revert timer fired");
        assert!(tokio::time::Instant::now() - before >= REVERT_DELAY);

        engine.handle(input);
        assert_eq!(engine.state(), S::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn a_second_round_can_follow_the_first() {
        let (mut engine, transport, _, mut rx) = engine();
        let id = connect(&mut engine);

        for round in 0..2u64 {
            engine.handle(Input::CodeScanned(Some(PAYLOAD.to_string())));
            engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(
                round * 2,
            ))));
            engine.handle(Input::Transport(TransportEvent::WriteCompleted(WriteId(
                round * 2 + 1,
            ))));
            let input = rx.recv().await.expect("revert timer fired");
            engine.handle(input);
            assert_eq!(engine.state(), S::Connected);
        }

        assert_eq!(transport.count(|c| matches!(c, Call::Write(..))), 4);
        assert_eq!(
            transport.count(|c| matches!(c, Call::Write(i, ..) if *i == id)),
            4
        );
    }
}
