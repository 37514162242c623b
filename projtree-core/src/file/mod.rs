//! The file module holds the virtual project filesystem.
//!
//! ## Architecture
//!
//! ### tree.rs
//! `PathTree`, a path-indexed map of file contents plus a set of directories,
//! and the pure operations over it (create, delete, move, extract). Nothing
//! in this layer touches a real disk.
//!
//! ### store.rs / status.rs
//! `VirtualFilesystem` owns the live tree, the baseline taken at the last
//! sync or apply, tombstones for deleted entries and the paths excluded from
//! model context. User commands are validated here; status.rs derives the
//! created/modified/deleted classification used for display.
//!
//! ### ignore.rs / import.rs
//! Bulk import of a flat (path, content) list, honouring `.gitignore` and
//! `.aiignore` from the import root and always dropping `.git/`.
//!
//! ### disk.rs
//! Reconciles the virtual tree back to a real directory through the
//! `DirectoryHandle` trait.

pub mod disk;
pub mod ignore;
pub mod import;
pub mod status;
pub mod store;
pub mod tree;

pub use status::DiffStatus;
pub use store::{ValidationError, VirtualFilesystem};
pub use tree::PathTree;
