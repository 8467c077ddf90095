//! A transport-layer implementation of the engine.io protocol (revision 4):
//! session handshake, heartbeat, and the polling/websocket transports, as a
//! `tower::Service`/`Layer` any HTTP framework built on `http`/`http-body`
//! can mount.
//!
//! Application protocols (like `socketioxide`) are built on top by
//! implementing [`handler::EngineIoHandler`].

pub mod body;
pub mod config;
pub mod engine;
pub mod errors;
pub mod futures;
pub mod handler;
pub mod layer;
pub mod packet;
pub mod service;
pub mod sid;
pub mod socket;
pub mod transport;

pub use config::EngineIoConfig;
pub use errors::Error;
pub use handler::EngineIoHandler;
pub use layer::EngineIoLayer;
pub use service::EngineIoService;
pub use sid::Sid;
pub use socket::{DisconnectReason, Socket};
