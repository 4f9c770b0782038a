#![forbid(unsafe_code)]
//! gorplan-planner: turns a script's tasks into rounds of cache-addressed
//! commands.
//!
//! Pieces:
//! - `registry`: placeholder names and the files that satisfy them.
//! - `signature`: memoised file and file-set fingerprints.
//! - `macros`: verb-keyed rewrites, applied until nothing changes.
//! - `fanout`: how one ready task becomes one or more commands.
//! - `engine`: a planning round over an [`ExecutionBatch`].
//! - `script`: `create ...; query` text to tasks.
//!
//! Executing commands is the caller's job (`gorplan-exec` ships a driver);
//! the planner only reads files through a [`gorplan_io::FileReader`].

pub mod batch;
pub mod engine;
pub mod events;
pub mod fanout;
pub mod macros;
pub mod registry;
pub mod script;
pub mod session;
pub mod signature;

pub use batch::{BatchCommand, ExecutionBatch};
pub use engine::{Planner, RoundOutput};
pub use events::{CommandEvent, EventLogger, RecordingEventLogger, TracingEventLogger};
pub use fanout::{FanOutRequest, FanOutResolver, SplitResolver};
pub use macros::{Macro, MacroRegistry};
pub use registry::{PlaceholderEntry, PlaceholderRegistry};
pub use script::parse_script;
pub use session::{PlanContext, PlanningSession};
pub use signature::SignatureCache;
