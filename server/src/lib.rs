//! Booth server: themed capture pages, the multipart upload endpoint,
//! and the media-host provider client behind it.

pub mod provider;
pub mod routes;
pub mod theme;
pub mod upload;
