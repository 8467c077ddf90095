//! Transport adapters: websocket (full duplex) and long-polling (request/response shim).

pub mod polling;
pub mod ws;

/// The concrete transport a session is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Polling,
    Websocket,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Polling => f.write_str("polling"),
            TransportType::Websocket => f.write_str("websocket"),
        }
    }
}

impl std::str::FromStr for TransportType {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(TransportType::Polling),
            "websocket" => Ok(TransportType::Websocket),
            _ => Err(crate::errors::Error::TransportMismatch),
        }
    }
}
