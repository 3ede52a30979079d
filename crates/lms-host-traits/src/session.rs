pub mod errors;
pub mod mock;
pub mod session;

pub use errors::{Error, ErrorCode};
pub use session::{ConnectorInner, Namespace, NamespaceHandle, Session, SessionInner};
