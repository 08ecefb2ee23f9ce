//! Tauri IPC commands
//!
//! All commands exposed to the frontend via Tauri's invoke system.

pub mod uploads;
pub mod discrepancies;
pub mod products;
pub mod sync;
pub mod platform;
pub mod settings;
