//! Tools that predicted execution steps invoke.
//!
//! Every capability (reading files, searching code, running commands) is a
//! [`Tool`] implementor. Tools are collected into a [`ToolSet`] which
//! handles dispatch, validation, timeouts, cancellation and truncation, and
//! which exposes [`ToolDescriptor`]s to the selector.
//!
//! - [`core`]: [`Tool`] trait, [`ToolSet`], [`FnTool`], [`ToolCategory`].
//! - [`common`]: built-in tools; register all at once with
//!   [`ToolSet::with_common_tools()`].
//! - [`names`]: canonical built-in tool names.

pub mod common;
pub mod core;
pub mod names;

pub use core::{
    CommonToolsConfig, FnTool, Tool, ToolCategory, ToolDef, ToolDescriptor, ToolFuture, ToolSet,
};
pub use core::{DEFAULT_MAX_RESULT_BYTES, parse_tool_args, truncate_result};
