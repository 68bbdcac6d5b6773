pub mod discover;
pub mod serve;

pub use discover::DiscoverCommand;
pub use serve::ServeCommand;

pub use discover::execute as run_discover;
pub use serve::execute as run_serve;
