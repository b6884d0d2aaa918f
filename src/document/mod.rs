mod autosave;
mod session;
mod types;

pub use session::DocumentSession;
pub use types::{AccessPath, DocumentRecord, Permission, TokenDocumentRow};
