pub mod core;
pub mod http_transport;
pub mod mock;
pub mod observability;
pub mod push;

pub use http_transport::HttpTransport;
pub use mock::{MockReply, ScriptedTransport};
