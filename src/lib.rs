//! Core of a resilient WebSocket client framework.
//!
//! This crate implements the connection lifecycle engine and its stateful
//! overlays — the connection state machine, reconnection and recovery
//! controller, subscription registry, authentication flow, and frame
//! codec/validator — as a library a host binary wires up with its own
//! [`transport::Transport`], [`auth::AuthHandler`],
//! [`subscription::SubscriptionHandler`], [`adapter::PlatformAdapter`], and
//! [`error_policy::ErrorPolicy`] implementations.
//!
//! Construct a connection with [`connection::handle::connect`] and drive it
//! through the returned [`connection::handle::ConnectionHandle`]; the
//! runtime itself lives on its own `tokio` task.

#![allow(clippy::module_name_repetitions)]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(not(feature = "mockable"), warn(missing_docs))]
#![cfg_attr(feature = "mockable", allow(missing_docs))]

pub mod adapter;
pub mod auth;
pub mod backoff;
pub mod callback;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod error_policy;
pub mod state;
pub mod subscription;
pub mod telemetry;
pub mod transport;
mod utils;

#[doc(inline)]
pub use crate::{
    connection::{handle::ConnectionHandle, Connection},
    error::{ConnectionError, ErrorKind},
};
