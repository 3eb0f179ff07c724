//! psklink wire protocol - GATT identifiers and the credential payload codec

pub mod ble;
mod credentials;

pub use credentials::{Credentials, PayloadError};
