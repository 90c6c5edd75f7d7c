//! Locations and history.
//!
//! # Data Flow
//! ```text
//! navigate("../7?tab=1")
//!     → path.rs (parse href, resolve against current pathname)
//!     → history.rs (new entry with a fresh key)
//!     → committed by the router: push/replace/pop on MemoryHistory
//! ```

pub mod history;
pub mod path;

pub use history::{HistoryAction, MemoryHistory};
pub use path::{
    create_path, parse_path, resolve_path, strip_basename, FormData, Location, Path,
};
