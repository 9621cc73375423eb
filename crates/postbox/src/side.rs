//! Logical sides for side-aware events.

use serde::{Deserialize, Serialize};

/// The side on which a side-aware event fires.
///
/// Depending on the event this may mean which end of a connection the
/// current world lives on, or whether the process is a dedicated server.
/// Handlers filter on it statically via
/// [`HandlerDecl::client_only`](crate::table::HandlerDecl::client_only) and
/// [`HandlerDecl::server_only`](crate::table::HandlerDecl::server_only), so
/// no per-dispatch branching is needed inside the handler body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Client side.
    Client,
    /// Server side.
    Server,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}
