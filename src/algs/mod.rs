//! Process-group plumbing and the index arithmetic of a checkpoint.

pub mod communicator;
pub mod hyperslab;
pub mod layout;

pub use hyperslab::Hyperslab;
pub use layout::LocalLayout;
