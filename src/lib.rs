#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

//! routerctl library, a client for Huawei LTE router management APIs.
//!
//! ## Architecture
//!
//! ```text
//! client.rs : RouterClient: construction, login, signal stats, reboot
//! auth.rs   : SCRAM-style login handshake, nonce and client proof
//! signal.rs : Signal snapshot and lenient field parsers
//! xml.rs    : request encoding, response decoding, <error> documents
//! error.rs  : Error enum and Result alias
//! config.rs : clap CLI definition, env-var defaults, logging setup
//! ```
//!
//! ## Example
//!
//! ```no_run
//! let mut client = routerctl::RouterClient::new("http://192.168.8.1", "admin", "secret")?;
//! client.login()?;
//! let signal = client.signal_stats()?;
//! println!("RSRP {} dBm", signal.rsrp);
//! # Ok::<(), routerctl::Error>(())
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod signal;
pub mod xml;

#[cfg(test)]
mod mock_device;

pub use auth::compute_client_proof;
pub use client::RouterClient;
pub use error::{Error, HandshakeStep, Result};
pub use signal::{Bandwidth, Earfcn, Power, Signal};
