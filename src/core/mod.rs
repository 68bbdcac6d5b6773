pub mod registry;
pub mod session;
pub mod state;

pub use registry::SessionRegistry;
pub use session::{Delivery, DeliveryQueue, SessionEntry};
pub use state::{SessionEvent, SessionState};
