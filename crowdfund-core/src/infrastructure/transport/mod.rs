pub mod memory;
pub mod messages;
pub mod session;
pub mod traits;

pub use memory::{MemoryHub, MemoryTransport};
pub use messages::{MessageEnvelope, Protocol, SessionMessage};
pub use session::Session;
pub use traits::{IncomingSessions, SessionTransport};
