//! Infrastructure layer: I/O and external collaborators.

pub mod config;
pub mod identity;
pub mod keys;
pub mod logging;
pub mod network;
pub mod notary;
pub mod storage;
pub mod transport;
