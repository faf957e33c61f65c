//! Canonical names of the built-in tools.
//!
//! The selector's default name table and the built-in tool definitions both
//! reference these constants.

pub const READ_FILE: &str = "read_file";
pub const EDIT_FILE: &str = "edit_file";
pub const WRITE_FILE: &str = "write_file";
pub const LIST_DIR: &str = "list_dir";
pub const FIND_FILES: &str = "find_files";
pub const GREP: &str = "grep";
pub const SHELL: &str = "shell";
pub const WEB_SEARCH: &str = "web_search";
