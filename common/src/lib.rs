//! Shared building blocks for the Snapbooth kiosk and server:
//! configuration, the upload wire protocol, media classification,
//! and mDNS service discovery.

pub mod config;
pub mod discovery;
pub mod media;
pub mod protocol;
