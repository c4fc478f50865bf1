use clap::{Parser, Subcommand};

/// Allowance relay: approval notifications and operator-driven transfers
#[derive(Parser)]
#[command(name = "allowance-relay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the report endpoint and the bot poller
    Serve {
        /// Port to bind (defaults to PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print live allowance and balance of an address
    Status {
        /// Holder address (base58 or hex)
        address: String,
    },
}
