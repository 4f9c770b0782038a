#![forbid(unsafe_code)]
//! gorplan-io: where file signatures come from.
//!
//! The planner only ever asks three questions of storage: what is the content
//! signature of this path, what is the signature of this dictionary (possibly
//! restricted to some tags), and does this path exist. [`FileReader`] is that
//! seam.
//!
//! - [`FsFileReader`]: local filesystem, rooted at a project directory.
//! - [`MemoryFileReader`]: thread-safe in-memory map, used by tests and by
//!   callers that stage inputs without touching disk.

pub mod dictionary;
pub mod error;
pub mod fs;
pub mod memory;

pub use error::{ReadError, Result};
pub use fs::FsFileReader;
pub use memory::MemoryFileReader;

/// Signature source consulted by the planner's signature cache.
pub trait FileReader: Send + Sync {
    /// Content signature of a file or directory.
    fn file_signature(&self, path: &str) -> Result<String>;

    /// Signature of a dictionary file. With `tags`, only the dictionary lines
    /// selected by those tags contribute.
    fn dictionary_signature(&self, path: &str, tags: Option<&[String]>) -> Result<String>;

    fn exists(&self, path: &str) -> bool;
}
