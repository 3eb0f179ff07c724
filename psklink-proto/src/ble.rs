//! BLE GATT identifiers for the coordinator's PSK provisioning service
//!
//! The coordinator advertises a single service with two writable
//! characteristics: one takes the MAC of the sensor node being admitted,
//! the other takes the network pre-shared key. Both must be written, MAC
//! first, for the coordinator to accept the node.

use uuid::Uuid;

/// PSK provisioning service UUID: 0000dc00-0000-1000-8000-00805f9b34fb
pub const PSK_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000dc00_0000_1000_8000_00805f9b34fb);

/// Node MAC characteristic UUID (write): 19a7caa0-3d46-11e5-dc02-0002a5d5c51b
pub const NODE_MAC_UUID: Uuid = Uuid::from_u128(0x19a7caa0_3d46_11e5_dc02_0002a5d5c51b);

/// Pre-shared key characteristic UUID (write): 19a7caa0-3d46-11e5-dc01-0002a5d5c51b
pub const PSK_UUID: Uuid = Uuid::from_u128(0x19a7caa0_3d46_11e5_dc01_0002a5d5c51b);

/// Hardware address the coordinator advertises from in this deployment
pub const DEFAULT_COORDINATOR_ADDR: &str = "00:00:11:33:DC:00";
