//! Credential payload codec
//!
//! A QR code carries one text payload of the form `>MAC|psk<` where MAC is
//! exactly 16 hex digits (the node's EUI-64) and psk is any non-empty run
//! of characters free of line breaks. The payload is split at the FIRST
//! `|`, so the psk itself may contain further `|` or `<` characters; only
//! the trailing `<` is stripped.

/// Credentials parsed from a scanned payload: the node MAC and the network
/// pre-shared key, both written to the coordinator verbatim as ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not framed by '>' and '<'")]
    Framing,
    #[error("payload has no '|' separator")]
    MissingSeparator,
    #[error("identifier is not 16 hex digits")]
    BadIdentifier,
    #[error("secret is empty")]
    EmptySecret,
    #[error("secret contains a line break")]
    SecretLineBreak,
}

/// Line terminators are the one thing a secret may not contain.
fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{0085}' | '\u{2028}' | '\u{2029}')
}

impl Credentials {
    /// Parse a scanned payload, validating the `>` + 16 hex + `|` + secret
    /// + `<` shape.
    pub fn parse(payload: &str) -> Result<Self, PayloadError> {
        let inner = payload
            .strip_prefix('>')
            .and_then(|rest| rest.strip_suffix('<'))
            .ok_or(PayloadError::Framing)?;

        let (identity, secret) = inner.split_once('|').ok_or(PayloadError::MissingSeparator)?;

        if identity.len() != 16 || !identity.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PayloadError::BadIdentifier);
        }
        if secret.is_empty() {
            return Err(PayloadError::EmptySecret);
        }
        if secret.chars().any(is_line_break) {
            return Err(PayloadError::SecretLineBreak);
        }

        Ok(Self {
            identity: identity.to_string(),
            secret: secret.to_string(),
        })
    }
}
