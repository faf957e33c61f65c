//! Built-in tools for the `tether` binary.
//!
//! Each tool takes a `workdir` root and optional configuration, and can be
//! used as-is or customized via builder methods. Every tool declares its
//! [`ToolCategory`] so the selector never has to guess from the name.
//!
//! | Tool | Name | Category | Mutation |
//! |------|------|----------|----------|
//! | [`ReadFile`] | `read_file` | read | no |
//! | [`ListFiles`] | `list_dir` | read | no |
//! | [`Grep`] | `grep` | search | no |
//! | [`FindFiles`] | `find_files` | search | no |
//! | [`WriteFile`] | `write_file` | edit | yes |
//! | [`Shell`] | `shell` | shell | yes |
//! | [`WebSearch`] | `web_search` | web | no |

use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::names::{FIND_FILES, GREP, LIST_DIR, READ_FILE, SHELL, WEB_SEARCH, WRITE_FILE};
use crate::tools::core::{
    DEFAULT_MAX_RESULT_BYTES, Tool, ToolCategory, ToolDef, ToolFuture, parse_tool_args,
    truncate_result,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

// ── Defaults ────────────────────────────────────────────────────────

/// Default maximum grep matches before truncation.
pub const DEFAULT_MAX_GREP_MATCHES: u32 = 200;

/// Default maximum find results.
pub const DEFAULT_MAX_FIND_RESULTS: u32 = 100;

/// Default blocked shell command patterns (lowercased substrings).
pub const DEFAULT_BLOCKED_COMMANDS: &[&str] = &["rm -rf /", "mkfs", "> /dev/"];

// ── Typed argument structs ──────────────────────────────────────────

/// Typed arguments for `read_file`.
#[derive(Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// File path relative to the working directory (e.g. 'src/lib.rs').
    pub path: String,
}

/// Typed arguments for `list_dir`.
#[derive(Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// Directory path relative to the working directory (e.g. 'src/').
    pub path: String,
}

/// Typed arguments for `grep`.
#[derive(Deserialize, JsonSchema)]
pub struct GrepArgs {
    /// Regex pattern to search for.
    pub pattern: String,
    /// Directory or file to search in (relative, default '.').
    #[serde(default)]
    pub path: Option<String>,
    /// File glob filter (e.g. '*.rs').
    #[serde(default)]
    pub glob: Option<String>,
    /// Case-insensitive search (default false).
    #[serde(default)]
    pub case_insensitive: Option<bool>,
}

/// Typed arguments for `find_files`.
#[derive(Deserialize, JsonSchema)]
pub struct FindFilesArgs {
    /// Glob pattern (e.g. 'src/**/*.rs').
    pub pattern: String,
}

/// Typed arguments for `write_file`.
#[derive(Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// File path relative to the working directory.
    pub path: String,
    /// Full new content of the file.
    pub content: String,
}

/// Typed arguments for `shell`.
#[derive(Deserialize, JsonSchema)]
pub struct ShellArgs {
    /// Shell command to execute (e.g. 'git log --oneline -5').
    pub command: String,
}

/// Typed arguments for `web_search`.
#[derive(Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// The search query.
    pub query: String,
    /// Number of results to return (default 5, max 20).
    #[serde(default)]
    pub count: Option<u32>,
}

fn reject_traversal(path: &str) -> Result<(), String> {
    if path.contains("..") {
        Err("path traversal not allowed".to_string())
    } else {
        Ok(())
    }
}

// ── ReadFile ────────────────────────────────────────────────────────

/// Read a file from a working directory.
///
/// Path traversal (`..`) is blocked.
pub struct ReadFile {
    workdir: String,
    max_result_bytes: usize,
}

impl ReadFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for ReadFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            READ_FILE,
            "Read a single file whose path is known. Use grep to search across files.",
            crate::json_schema_for::<ReadFileArgs>(),
        )
    }

    fn category(&self) -> Option<ToolCategory> {
        Some(ToolCategory::Read)
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: ReadFileArgs = parse_tool_args(parameters)?;
            reject_traversal(&args.path)?;
            let full_path = Path::new(&self.workdir).join(&args.path);

            if let Ok(meta) = fs::metadata(&full_path).await
                && meta.is_dir()
            {
                return Err(format!(
                    "'{}' is a directory, not a file. Use {LIST_DIR} to browse directories.",
                    args.path
                ));
            }

            fs::read_to_string(&full_path)
                .await
                .map(|content| truncate_result(content, self.max_result_bytes))
                .map_err(|e| format!("reading '{}': {e}", full_path.display()))
        })
    }
}

// ── ListFiles ───────────────────────────────────────────────────────

/// List one directory under the working directory, newest first.
pub struct ListFiles {
    workdir: String,
}

impl ListFiles {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for ListFiles {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            LIST_DIR,
            "List the entries of one directory, newest first. Directories end with '/'.",
            crate::json_schema_for::<ListFilesArgs>(),
        )
    }

    fn category(&self) -> Option<ToolCategory> {
        Some(ToolCategory::Read)
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: ListFilesArgs = parse_tool_args(parameters)?;
            reject_traversal(&args.path)?;
            let full_path = Path::new(&self.workdir).join(&args.path);
            // -a: hidden files, -p: trailing '/' on dirs, -1: one per line,
            // -t: newest first so truncation keeps recent entries.
            run_command("ls", &["-ap1t", &full_path.to_string_lossy()], &[]).await
        })
    }
}

// ── Grep ────────────────────────────────────────────────────────────

/// Regex search in file contents under the working directory.
pub struct Grep {
    workdir: String,
    max_matches: u32,
    max_result_bytes: usize,
}

impl Grep {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            max_matches: DEFAULT_MAX_GREP_MATCHES,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn max_matches(mut self, max: u32) -> Self {
        self.max_matches = max;
        self
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for Grep {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            GREP,
            "Search file contents for a regex pattern. Output lines are prefixed with \
             file_path:line_number:.",
            crate::json_schema_for::<GrepArgs>(),
        )
    }

    fn category(&self) -> Option<ToolCategory> {
        Some(ToolCategory::Search)
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: GrepArgs = parse_tool_args(parameters)?;
            let search_path = args.path.as_deref().unwrap_or(".");
            reject_traversal(search_path)?;
            let full_path = Path::new(&self.workdir).join(search_path);

            let mut cmd_args = vec![
                "-rn".to_string(),
                "--color=never".to_string(),
                format!("--max-count={}", self.max_matches),
            ];
            if args.case_insensitive.unwrap_or(false) {
                cmd_args.push("-i".to_string());
            }
            if let Some(glob) = &args.glob {
                cmd_args.push(format!("--include={glob}"));
            }
            cmd_args.push("-e".to_string());
            cmd_args.push(args.pattern.clone());
            cmd_args.push(full_path.to_string_lossy().to_string());

            let arg_refs: Vec<&str> = cmd_args.iter().map(|s| s.as_str()).collect();
            // grep exits 1 for "no matches".
            let result = run_command("grep", &arg_refs, &[1]).await?;
            if result.trim().is_empty() {
                Ok(format!("No matches for '{}'", args.pattern))
            } else {
                Ok(truncate_result(result, self.max_result_bytes))
            }
        })
    }
}

// ── FindFiles ───────────────────────────────────────────────────────

/// Find files matching a glob pattern under the working directory.
pub struct FindFiles {
    workdir: String,
    max_results: u32,
    max_result_bytes: usize,
}

impl FindFiles {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            max_results: DEFAULT_MAX_FIND_RESULTS,
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn max_results(mut self, max: u32) -> Self {
        self.max_results = max;
        self
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for FindFiles {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            FIND_FILES,
            "Find files by glob pattern across nested directories.",
            crate::json_schema_for::<FindFilesArgs>(),
        )
    }

    fn category(&self) -> Option<ToolCategory> {
        Some(ToolCategory::Search)
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: FindFilesArgs = parse_tool_args(parameters)?;
            reject_traversal(&args.pattern)?;
            let pattern = args.pattern.replace('\'', "");
            let result = run_shell(
                &self.workdir,
                &format!(
                    "find . -path './{pattern}' -type f 2>/dev/null | head -{} | sort",
                    self.max_results
                ),
            )
            .await?;
            if result.trim().is_empty() {
                Ok(format!("No files found matching '{pattern}'"))
            } else {
                Ok(truncate_result(result, self.max_result_bytes))
            }
        })
    }
}

// ── WriteFile ───────────────────────────────────────────────────────

/// Create or overwrite a file under the working directory.
///
/// Parent directories are created as needed.
pub struct WriteFile {
    workdir: String,
}

impl WriteFile {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl Tool for WriteFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            WRITE_FILE,
            "Write the full content of a file, creating it if needed.",
            crate::json_schema_for::<WriteFileArgs>(),
        )
    }

    fn category(&self) -> Option<ToolCategory> {
        Some(ToolCategory::Edit)
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: WriteFileArgs = parse_tool_args(parameters)?;
            reject_traversal(&args.path)?;
            let full_path = Path::new(&self.workdir).join(&args.path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("creating '{}': {e}", parent.display()))?;
            }
            fs::write(&full_path, args.content.as_bytes())
                .await
                .map_err(|e| format!("writing '{}': {e}", full_path.display()))?;
            Ok(format!(
                "Wrote {} bytes to {}",
                args.content.len(),
                args.path
            ))
        })
    }
}

// ── Shell ───────────────────────────────────────────────────────────

/// Execute shell commands in the working directory.
///
/// Commands matching any pattern in `blocked_commands` are rejected.
pub struct Shell {
    workdir: String,
    blocked_commands: Vec<String>,
    max_result_bytes: usize,
}

impl Shell {
    pub fn new(workdir: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            blocked_commands: DEFAULT_BLOCKED_COMMANDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    /// Add a blocked command pattern (lowercased substring match).
    pub fn block_command(mut self, pattern: impl Into<String>) -> Self {
        self.blocked_commands.push(pattern.into());
        self
    }

    /// Replace the entire blocked commands list.
    pub fn blocked_commands(mut self, patterns: Vec<String>) -> Self {
        self.blocked_commands = patterns;
        self
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for Shell {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            SHELL,
            "Run a shell command in the working directory and return its output. \
             Prefer read_file, grep and find_files where they apply.",
            crate::json_schema_for::<ShellArgs>(),
        )
    }

    fn category(&self) -> Option<ToolCategory> {
        Some(ToolCategory::Shell)
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: ShellArgs = parse_tool_args(parameters)?;
            let lower = args.command.to_lowercase();
            if self.blocked_commands.iter().any(|pat| lower.contains(pat)) {
                return Err("potentially destructive command blocked".to_string());
            }
            let result = run_shell(&self.workdir, &args.command).await?;
            Ok(truncate_result(result, self.max_result_bytes))
        })
    }
}

// ── WebSearch ──────────────────────────────────────────────────────

/// Search the web via the Brave Search API.
///
/// Requires the `BRAVE_SEARCH_KEY` environment variable.
pub struct WebSearch {
    max_result_bytes: usize,
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSearch {
    pub fn new() -> Self {
        Self {
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    pub fn max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }
}

impl Tool for WebSearch {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            WEB_SEARCH,
            "Search the web and return numbered results with titles, URLs and snippets.",
            crate::json_schema_for::<WebSearchArgs>(),
        )
    }

    fn category(&self) -> Option<ToolCategory> {
        Some(ToolCategory::Web)
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin(async move {
            let args: WebSearchArgs = parse_tool_args(parameters)?;
            let count = args.count.unwrap_or(5).min(20);
            let results = brave_search(&args.query, count)
                .await
                .map_err(|e| format!("web search failed: {e}"))?;
            if results.is_empty() {
                Ok(format!("No results found for '{}'", args.query))
            } else {
                Ok(truncate_result(results, self.max_result_bytes))
            }
        })
    }
}

/// Call the Brave Search API and return formatted results.
async fn brave_search(query: &str, count: u32) -> Result<String, String> {
    let api_key = std::env::var("BRAVE_SEARCH_KEY")
        .map_err(|_| "BRAVE_SEARCH_KEY env var not set".to_string())?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| e.to_string())?;

    let url = format!(
        "https://api.search.brave.com/res/v1/web/search?q={}&count={count}",
        urlencoded(query),
    );
    let resp = client
        .get(&url)
        .header("X-Subscription-Token", &api_key)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(format!("HTTP {status}: {body}"));
    }

    let body: Value = resp
        .json()
        .await
        .map_err(|e: reqwest::Error| e.to_string())?;
    Ok(format_brave_results(&body))
}

/// Minimal percent-encoding for URL query parameters.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn format_brave_results(body: &Value) -> String {
    let Some(results) = body["web"]["results"].as_array() else {
        return String::new();
    };
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let title = r["title"].as_str().unwrap_or("");
            let url = r["url"].as_str().unwrap_or("");
            let snippet = r["description"].as_str().unwrap_or("");
            let mut entry = format!("{}. {title}\n   {url}", i + 1);
            if !snippet.is_empty() {
                entry.push_str(&format!("\n   {snippet}"));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Format command output. Exit codes in `lenient_exit_codes` count as
/// success.
fn format_output(
    output: std::process::Output,
    lenient_exit_codes: &[i32],
) -> Result<String, String> {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let ok = output.status.success()
        || output
            .status
            .code()
            .is_some_and(|c| lenient_exit_codes.contains(&c));
    if !ok {
        return Err(format!("command failed ({}):\n{stdout}\n{stderr}", output.status));
    }
    if stderr.is_empty() {
        Ok(stdout)
    } else {
        Ok(format!("{stdout}\n[stderr]\n{stderr}"))
    }
}

/// Run a command with arguments and return its output.
///
/// The child is killed if the returned future is dropped, which is how
/// cancellation and timeouts in [`ToolSet`](crate::tools::core::ToolSet)
/// reach it.
pub async fn run_command(
    cmd: &str,
    args: &[&str],
    lenient_exit_codes: &[i32],
) -> Result<String, String> {
    let output = Command::new(cmd)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("running {cmd}: {e}"))?;
    format_output(output, lenient_exit_codes)
}

/// Run a shell command (`sh -c`) in the given working directory.
pub async fn run_shell(workdir: &str, command: &str) -> Result<String, String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("running command: {e}"))?;
    format_output(output, &[])
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn definitions_use_canonical_names() {
        assert_eq!(ReadFile::new("/tmp").name(), READ_FILE);
        assert_eq!(ListFiles::new("/tmp").name(), LIST_DIR);
        assert_eq!(Grep::new("/tmp").name(), GREP);
        assert_eq!(FindFiles::new("/tmp").name(), FIND_FILES);
        assert_eq!(WriteFile::new("/tmp").name(), WRITE_FILE);
        assert_eq!(Shell::new("/tmp").name(), SHELL);
        assert_eq!(WebSearch::new().name(), WEB_SEARCH);
    }

    #[test]
    fn shell_builder_adds_blocked_command() {
        let tool = Shell::new("/tmp").block_command("dangerous_cmd");
        assert!(tool.blocked_commands.contains(&"dangerous_cmd".to_string()));
        assert!(tool.blocked_commands.iter().any(|c| c.contains("rm -rf")));
    }

    #[tokio::test]
    async fn read_file_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "hello notes").unwrap();
        let tool = ReadFile::new(dir.path().to_str().unwrap());
        let out = tool.invoke(json!({"path": "notes.md"}), cancel()).await;
        assert_eq!(out.unwrap(), "hello notes");
    }

    #[tokio::test]
    async fn read_file_returns_hint_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let tool = ReadFile::new(dir.path().to_str().unwrap());
        let err = tool
            .invoke(json!({"path": "subdir"}), cancel())
            .await
            .unwrap_err();
        assert!(err.contains("is a directory, not a file"), "{err}");
        assert!(err.contains(LIST_DIR), "{err}");
    }

    #[tokio::test]
    async fn write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFile::new(dir.path().to_str().unwrap());
        let out = tool
            .invoke(json!({"path": "a/b/c.txt", "content": "xyz"}), cancel())
            .await
            .unwrap();
        assert!(out.contains("3 bytes"));
        let written = std::fs::read_to_string(dir.path().join("a/b/c.txt")).unwrap();
        assert_eq!(written, "xyz");
    }

    #[tokio::test]
    async fn path_traversal_is_blocked() {
        let expected = "path traversal not allowed";
        let read = ReadFile::new("/tmp")
            .invoke(json!({"path": "../../../etc/passwd"}), cancel())
            .await;
        assert_eq!(read.unwrap_err(), expected);
        let list = ListFiles::new("/tmp")
            .invoke(json!({"path": "../../secret"}), cancel())
            .await;
        assert_eq!(list.unwrap_err(), expected);
        let grep = Grep::new("/tmp")
            .invoke(json!({"pattern": "password", "path": "../../../etc"}), cancel())
            .await;
        assert_eq!(grep.unwrap_err(), expected);
        let find = FindFiles::new("/tmp")
            .invoke(json!({"pattern": "../../*.txt"}), cancel())
            .await;
        assert_eq!(find.unwrap_err(), expected);
        let write = WriteFile::new("/tmp")
            .invoke(json!({"path": "../x", "content": ""}), cancel())
            .await;
        assert_eq!(write.unwrap_err(), expected);
    }

    #[tokio::test]
    async fn shell_blocks_destructive_commands() {
        let tool = Shell::new("/tmp").block_command("drop table");
        for command in ["rm -rf /", "mkfs.ext4 /dev/sda", "echo DROP TABLE users"] {
            let err = tool
                .invoke(json!({ "command": command }), cancel())
                .await
                .unwrap_err();
            assert_eq!(err, "potentially destructive command blocked");
        }
    }

    #[tokio::test]
    async fn shell_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Shell::new(dir.path().to_str().unwrap());
        let ok = tool.invoke(json!({"command": "echo hi"}), cancel()).await;
        assert_eq!(ok.unwrap().trim(), "hi");
        let err = tool.invoke(json!({"command": "exit 3"}), cancel()).await;
        assert!(err.unwrap_err().contains("command failed"));
    }

    #[tokio::test]
    async fn missing_arguments_are_errors() {
        let err = ReadFile::new("/tmp").invoke(json!({}), cancel()).await;
        assert!(err.unwrap_err().contains("invalid tool arguments"));
        let err = Shell::new("/tmp").invoke(json!({}), cancel()).await;
        assert!(err.unwrap_err().contains("invalid tool arguments"));
    }

    #[test]
    fn urlencoded_escapes_reserved_bytes() {
        assert_eq!(urlencoded("a b&c"), "a+b%26c");
    }

    #[test]
    fn brave_results_are_numbered() {
        let body = json!({"web": {"results": [
            {"title": "One", "url": "https://one", "description": "first"},
            {"title": "Two", "url": "https://two"}
        ]}});
        let out = format_brave_results(&body);
        assert!(out.starts_with("1. One\n   https://one\n   first"));
        assert!(out.contains("2. Two\n   https://two"));
        assert_eq!(format_brave_results(&json!({})), "");
    }

    #[test]
    fn write_file_args_schema_requires_content() {
        let schema = crate::json_schema_for::<WriteFileArgs>();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("path")));
        assert!(required.contains(&json!("content")));
    }
}
