//! Datagram discovery: the shared socket, broadcast resolution, and the
//! Listener and Poller tasks.

pub mod broadcast;
pub mod listener;
pub mod poller;
pub mod socket;

pub use broadcast::{broadcast_for, resolve as resolve_broadcast_addresses};
pub use socket::create_broadcast_socket;
