use std::{net::SocketAddr, num::NonZeroU32};

use clap::{Args, Parser, Subcommand};

use crate::relay::RelayConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat relay, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a relay from the terminal.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the relay should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:9001")]
    pub listen: SocketAddr,

    /// Longest line accepted from a client, in bytes.
    #[arg(long, default_value_t = 4096)]
    pub max_line_bytes: usize,

    /// Lines buffered per client before broadcasts to it are dropped.
    #[arg(long, default_value_t = 128)]
    pub outbox_capacity: usize,

    /// Close a connection after this many rejected names. Unlimited if unset.
    #[arg(long)]
    pub max_name_attempts: Option<NonZeroU32>,
}

impl From<ServerArgs> for RelayConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            listen: args.listen,
            max_line_bytes: args.max_line_bytes,
            outbox_capacity: args.outbox_capacity,
            max_name_attempts: args.max_name_attempts,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the relay to connect to.
    #[arg(long, default_value = "127.0.0.1:9001")]
    pub server: SocketAddr,

    /// Name sent automatically when the relay asks for one.
    #[arg(long)]
    pub name: Option<String>,
}
