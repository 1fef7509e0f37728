//! Application Layer
//!
//! Ports describing the outside world and the services that drive the
//! pipeline through them.

pub mod ports;
pub mod services;
