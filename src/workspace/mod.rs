pub mod git;
pub mod manager;
pub mod transport;

pub use manager::WorkspaceManager;
pub use transport::{Git2Transport, GitTransport};
