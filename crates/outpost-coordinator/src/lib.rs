//! ---
//! upd_section: "06-coordinator"
//! upd_subsection: "module"
//! upd_type: "source"
//! upd_scope: "code"
//! upd_description: "Privileged execution of component scripts."
//! upd_version: "v0.1.0"
//! upd_owner: "tbd"
//! ---
//! The privileged half of the updater. The coordinator is the only process
//! that executes component scripts; it takes its instructions exclusively
//! from request files in the shared store and reports through status files.
//! It performs no version reasoning of its own: whatever version a valid
//! request names is the version it passes to the script.

pub mod coordinator;
pub mod scripts;
pub mod watcher;

pub use coordinator::{Coordinator, CoordinatorError};
pub use scripts::{ScriptError, ScriptOutcome, ScriptRegistry};
pub use watcher::{DirectoryWatcher, NotifyWatcher, PollingWatcher};
