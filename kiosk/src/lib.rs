//! Kiosk-side booth logic: the capture session state machine, camera
//! sources, the countdown and recording timers, the upload client, and
//! the in-session gallery.

pub mod controller;
pub mod gallery;
pub mod session;
pub mod source;
pub mod uploader;
