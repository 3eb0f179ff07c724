//! Provisioning state machine
//!
//! A pure transition table over the scan / connect / discover / write loop.
//! The machine never terminates: after both credential writes are
//! acknowledged it reverts to [`ProvisioningState::Connected`] so the user
//! can scan the next code. Events not listed for the current state leave
//! the machine exactly where it is and issue no command.

/// Application state of the provisioning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningState {
    Init,
    Searching,
    Connecting,
    Discovering,
    Connected,
    CredentialsReady,
    IdentitySent,
    SecretSent,
}

/// Normalized events fed to the machine by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Provisioning loop started.
    Begin,
    /// A scan hit matched the coordinator predicate.
    TargetFound,
    /// The connection attempt completed.
    Linked,
    /// The connection failed or dropped.
    LinkLost,
    /// Discovery resolved the service and both characteristics in one pass.
    ServiceResolved,
    /// A scanned payload parsed into credentials.
    CredentialsAccepted,
    /// A scanned payload failed validation.
    CredentialsRejected,
    /// The node MAC write was acknowledged.
    IdentityAcked,
    /// The PSK write was acknowledged.
    SecretAcked,
    /// The post-provisioning revert delay elapsed.
    RevertElapsed,
}

/// Transport-facing commands the machine asks the engine to run. All are
/// fire-and-forget; completion comes back as a later [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartScan,
    /// Stop scanning, supersede any stale handle, open a connection.
    Connect,
    Discover,
    WriteIdentity,
    WriteSecret,
    ScheduleRevert,
}

/// Run one step of the transition table.
///
/// Total over every `(state, event)` pair: unlisted pairs return the state
/// unchanged with no command, so late or duplicate events can never corrupt
/// the machine.
pub fn handle_event(
    state: ProvisioningState,
    event: Event,
) -> (ProvisioningState, Option<Command>) {
    use Command as C;
    use Event as E;
    use ProvisioningState as S;

    match (state, event) {
        (S::Init, E::Begin) => (S::Searching, Some(C::StartScan)),
        (S::Searching, E::TargetFound) => (S::Connecting, Some(C::Connect)),
        (S::Connecting, E::Linked) => (S::Discovering, Some(C::Discover)),
        (S::Discovering, E::ServiceResolved) => (S::Connected, None),
        (S::Connected, E::CredentialsAccepted) => (S::CredentialsReady, Some(C::WriteIdentity)),
        // Invalid payload: remain, the engine re-confirms the status.
        (S::Connected, E::CredentialsRejected) => (S::Connected, None),
        (S::CredentialsReady, E::IdentityAcked) => (S::IdentitySent, Some(C::WriteSecret)),
        (S::IdentitySent, E::SecretAcked) => (S::SecretSent, Some(C::ScheduleRevert)),
        (S::SecretSent, E::RevertElapsed) => (S::Connected, None),
        // A lost link anywhere past the scan restarts the loop.
        (
            S::Connecting
            | S::Discovering
            | S::Connected
            | S::CredentialsReady
            | S::IdentitySent
            | S::SecretSent,
            E::LinkLost,
        ) => (S::Searching, Some(C::StartScan)),
        _ => (state, None),
    }
}

/// Status line shown when the engine hits an internal inconsistency and
/// stops. Requires external re-initialization.
pub const RESTART_STATUS: &str = "Please Restart";

/// Human-readable status line for a state.
pub fn status_text(state: ProvisioningState) -> &'static str {
    use ProvisioningState as S;

    match state {
        S::Init | S::Searching => "Scanning...",
        S::Connecting | S::Discovering => "Connecting...",
        S::Connected => "Touch to Scan",
        S::CredentialsReady | S::IdentitySent => "Sharing Key...",
        S::SecretSent => "Key Shared.",
    }
}
