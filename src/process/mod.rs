/*!
 * Process Module
 * Process records, lifecycle states and the process table
 */

pub mod table;
pub mod types;

// Re-export for convenience
pub use table::{Proc, ProcessTable};
pub use types::{ProcessInfo, ProcessState};
