//! Line-oriented TCP chat relay.
//!
//! Every connection picks a unique display name and then each line it sends
//! is relayed to all other connected participants.
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`registry`] tracks claimed names and live connections behind one lock.
//! - [`relay`] runs the accept loop and the per-connection session state
//!   machine (name negotiation, chat, cleanup).
//! - [`error`] is the relay's error type.
//! - [`protocol`] holds the newline framing helpers and the server's texts.
//! - [`client`] is a small terminal front-end for manual use.
//!
//! Integration tests drive the relay over real sockets through this crate.

pub mod cli;
pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
