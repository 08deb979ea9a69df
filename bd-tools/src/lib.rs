//! Agent action orchestration core.
//!
//! Every board mutation an agent performs flows through the
//! [`dispatcher::ToolDispatcher`]: permission gate, approval gate,
//! snapshot-producing execution, then a fire-and-forget ledger write.
//! The [`undo::UndoEngine`] consumes ledger records to compensate
//! mutations inside a fixed time window.

pub mod approval;
pub mod board_tools;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod gate;
pub mod ledger;
pub mod proposal;
pub mod snapshot;
pub mod traits;
pub mod undo;

pub use error::{Result, ToolError};
pub use traits::{BoardTool, ToolCategory, ToolExecution, ToolSpec, to_llm_tool_def};
