pub mod element;
pub mod path;

pub use element::*;
pub use path::{child_path, parse_trailing_index, ContainerKind};
