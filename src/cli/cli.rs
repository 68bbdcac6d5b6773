use crate::cli::commands::{DiscoverCommand, ServeCommand};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(about = "OIC resource discovery client and responder", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, env = "OIC_DISCOVERY_VERBOSE")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Discover(DiscoverCommand),
    Serve(ServeCommand),
}
