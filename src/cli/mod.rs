pub mod cli;
pub mod commands;
pub mod ui;

pub use cli::{Cli, Commands};
pub use commands::discover::DiscoverCommand;
pub use commands::discover::execute as run_discover;
pub use commands::serve::ServeCommand;
pub use commands::serve::execute as run_serve;
