//! # courier-server
//!
//! Federated encrypted-mail node for Courier.
//!
//! This crate implements a node that:
//! - Accepts TCP connections carrying exactly one request envelope each
//! - Keeps envelopes addressed to other identities as opaque descriptions
//! - Opens, verifies and answers envelopes addressed to itself
//! - Serves stored mail (single items with optional bulk data, or lists)
//! - Routes application message types to pluggable handlers
//!
//! ## Architecture
//!
//! ```text
//! Peer ──► listener ──► Connection ──┬──► built-in transfers ──► ServerDelegate
//!          (limits)     (one task)   │
//!                                    └──► resolver ──► Router
//!                                              │
//!                                              ▼
//!                                        HandlerRegistry
//! ```
//!
//! ## Protocol
//!
//! Each envelope is framed by a 4-byte big-endian length. Built-in types:
//! - TRA → stored envelope (+ raw data stream when requested)
//! - TRL → MLI count, then each stored envelope
//! - ERR (server → peer, signed plaintext) on any failure

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod delegate;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod keyfile;
pub mod limits;
mod listener;
pub mod resolver;
pub mod routing;
pub mod server;

pub use config::Config;
pub use delegate::{DataStream, MailData, MemoryDelegate, ServerDelegate};
pub use dispatch::{Handler, HandlerOutput, HandlerRegistry, Outgoing};
pub use error::{ConnectionError, DelegateError, HandlerError, NodeError, RoutingError, ServerError};
pub use routing::{LookupType, Router, StaticRouter};
pub use server::{MailServer, ServerMetrics};
