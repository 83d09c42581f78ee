//! Grid-side data: blocks, channel streamers, mesh spacing and element types.

pub mod block;
pub mod element;
pub mod grid;
pub mod mesh_map;
pub mod streamer;

pub use block::CellBlock;
pub use element::{Element, ElementKind};
pub use grid::{BlockGrid, CartesianBlockGrid, GridSpec};
pub use mesh_map::MeshMap;
pub use streamer::ChannelStreamer;
