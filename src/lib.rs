//! TrapWatch library: portable trap liveness protocol.
//!
//! Battery-powered trap nodes report a single "triggered" bit over a
//! connectionless radio link; a mains-powered dashboard tracks when each
//! trap was last heard from and drives per-trap indicator outputs.
//! This crate holds everything that does not touch hardware: the status
//! codec, the trap duty cycle, the dashboard liveness tracker and the NDJSON
//! report protocol. It is `no_std`, allocation-free, and testable on any host
//! with `cargo test`.
//!
//! Platform binaries are thin consumers:
//! - `src/bin/trap.rs`: embassy/esp-hal trap firmware (deep sleep duty cycle)
//! - `src/bin/dashboard.rs`: embassy/esp-hal dashboard firmware
//! - `firmware-std`: ESP-IDF std dashboard using threads

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod codec;
pub mod comm;
pub mod config;
pub mod dashboard;
pub mod defaults;
pub mod duty_cycle;
pub mod identity;
pub mod indicator;
pub mod liveness;
pub mod platform;
pub mod protocol;
