//! psklink core - the provisioning state machine and transport event router
//!
//! Two pieces: a pure state-transition function ([`handle_event`]) over the
//! discover / connect / write-credentials loop, and an [`Engine`] that
//! serializes asynchronous transport callbacks, code-reader payloads and
//! timer firings into that function's event vocabulary and executes the
//! commands it returns against an abstract [`Transport`].

mod engine;
mod state;
mod transport;

pub use engine::{Engine, Input, REVERT_DELAY};
pub use state::{Command, Event, ProvisioningState, RESTART_STATUS, handle_event, status_text};
pub use transport::{
    ConnectionId, DeviceAddr, GattService, StatusSink, TargetFilter, Transport, TransportEvent,
    WriteId,
};
