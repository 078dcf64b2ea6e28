//! kasa-link core library.
//!
//! Local-network discovery and control of Kasa smart plugs, switches,
//! dimmers and power strips over the vendor's datagram protocol.

pub mod config;
pub mod device;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod refresh;
pub mod registry;
pub mod storage;

pub use config::EngineConfig;
pub use device::{Device, DeviceKind, DeviceState, Liveness, Model};
pub use engine::{DropReason, Engine, EngineHandle, LivenessChange, Outcome};
pub use error::{CoreError, DeviceError, ProtocolError, StorageError};
pub use refresh::{RefreshListener, RefreshSignal};
pub use registry::Registry;
