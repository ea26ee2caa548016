//! Application layer: port traits and the polling service.
//!
//! Everything the engine needs from the firmware around it is declared
//! in [`ports`]; [`service`] ties the protocol engine to a board behind
//! those ports.

pub mod ports;
pub mod service;
