//! Tool abstraction for predicted execution steps.
//!
//! The [`Tool`] trait defines the interface that every tool must implement:
//! a static definition (name, description, JSON schema), an optional
//! [`ToolCategory`] declared at registration time, and an async `invoke`
//! method taking JSON parameters and a cancellation token. Tools are collected
//! into a [`ToolSet`] which handles dispatch, validation, timeouts,
//! cancellation and result truncation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Default timeout for tool execution (60 seconds).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Boxed future returned by [`Tool::invoke`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

// ── Definitions ────────────────────────────────────────────────────

/// Name, description and JSON Schema parameters of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Coarse capability class used for ranking and planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Edit,
    Read,
    Search,
    Shell,
    Web,
    Other,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Edit => "edit",
            ToolCategory::Read => "read",
            ToolCategory::Search => "search",
            ToolCategory::Shell => "shell",
            ToolCategory::Web => "web",
            ToolCategory::Other => "other",
        }
    }

    /// Categories that operate on files named in the conversation.
    pub fn is_file_oriented(&self) -> bool {
        matches!(
            self,
            ToolCategory::Edit | ToolCategory::Read | ToolCategory::Search
        )
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the selector and planner see of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Category declared by the tool, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ToolCategory>,
    #[serde(default)]
    pub mutation: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: None,
            mutation: false,
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_mutation(mut self, mutation: bool) -> Self {
        self.mutation = mutation;
        self
    }
}

// ── CommonToolsConfig ────────────────────────────────────────────────

/// Per-tool configuration for [`ToolSet::with_common_tools_configured`].
#[derive(Debug, Clone)]
pub struct CommonToolsConfig {
    /// Maximum grep matches per file before truncation.
    pub grep_max_matches: u32,
    /// Maximum find results before truncation.
    pub find_max_results: u32,
    /// Blocked shell command patterns (lowercased substring match).
    pub shell_blocked_commands: Vec<String>,
}

impl Default for CommonToolsConfig {
    fn default() -> Self {
        use crate::tools::common::{
            DEFAULT_BLOCKED_COMMANDS, DEFAULT_MAX_FIND_RESULTS, DEFAULT_MAX_GREP_MATCHES,
        };
        Self {
            grep_max_matches: DEFAULT_MAX_GREP_MATCHES,
            find_max_results: DEFAULT_MAX_FIND_RESULTS,
            shell_blocked_commands: DEFAULT_BLOCKED_COMMANDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl CommonToolsConfig {
    pub fn grep_max_matches(mut self, max: u32) -> Self {
        self.grep_max_matches = max;
        self
    }

    pub fn find_max_results(mut self, max: u32) -> Self {
        self.find_max_results = max;
        self
    }

    /// Add a single blocked shell command pattern.
    pub fn shell_block_command(mut self, command: impl Into<String>) -> Self {
        self.shell_blocked_commands.push(command.into());
        self
    }
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A capability a predicted execution step can invoke.
///
/// `invoke` receives the step's JSON parameters and a cancellation token.
/// Failures are returned as `Err(message)`; the orchestrator records them on
/// the step and carries on with the rest of the plan.
///
/// Uses a boxed future so that the trait is dyn-compatible.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDef;

    fn invoke(&self, parameters: Value, cancel: CancellationToken) -> ToolFuture<'_>;

    /// The tool's name (delegates to definition).
    fn name(&self) -> String {
        self.definition().name
    }

    /// Category declared at registration. `None` lets the selector infer one
    /// from the name.
    fn category(&self) -> Option<ToolCategory> {
        None
    }

    /// Whether this tool changes files or other external state.
    fn is_mutation(&self) -> bool {
        false
    }

    fn descriptor(&self) -> ToolDescriptor {
        let def = self.definition();
        ToolDescriptor {
            name: def.name,
            description: def.description,
            category: self.category(),
            mutation: self.is_mutation(),
        }
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A collection of tools that can be dispatched by name.
///
/// # Example
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_max_result_bytes(15_000)
///     .with_common_tools("/path/to/workdir")
///     .with_default_timeout(Some(Duration::from_secs(30)));
///
/// let cancel = CancellationToken::new();
/// let out = tools.invoke("read_file", json!({"path": "Cargo.toml"}), &cancel).await;
/// ```
pub struct ToolSet {
    tools: HashMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
    /// Whether to validate parameters against JSON Schema before invocation.
    validate_args: bool,
    /// `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("max_result_bytes", &self.max_result_bytes)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: true,
            default_timeout: Some(DEFAULT_TOOL_TIMEOUT),
        }
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Conditionally register a tool (builder pattern).
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// Descriptors of every registered tool, sorted by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut out: Vec<ToolDescriptor> = self.tools.values().map(|t| t.descriptor()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Register the built-in filesystem, shell and web tools.
    ///
    /// `web_search` is only registered when `BRAVE_SEARCH_KEY` is set.
    pub fn with_common_tools(self, workdir: impl Into<String>) -> Self {
        self.with_common_tools_configured(workdir, CommonToolsConfig::default())
    }

    pub fn with_common_tools_configured(
        self,
        workdir: impl Into<String>,
        config: CommonToolsConfig,
    ) -> Self {
        use crate::tools::common::{
            FindFiles, Grep, ListFiles, ReadFile, Shell, WebSearch, WriteFile,
        };
        let workdir = workdir.into();
        let max = self.max_result_bytes;
        self.with(ReadFile::new(workdir.clone()).max_result_bytes(max))
            .with(ListFiles::new(workdir.clone()))
            .with(
                Grep::new(workdir.clone())
                    .max_matches(config.grep_max_matches)
                    .max_result_bytes(max),
            )
            .with(
                FindFiles::new(workdir.clone())
                    .max_results(config.find_max_results)
                    .max_result_bytes(max),
            )
            .with(WriteFile::new(workdir.clone()))
            .with(
                Shell::new(workdir)
                    .blocked_commands(config.shell_blocked_commands)
                    .max_result_bytes(max),
            )
            .with_if(
                std::env::var("BRAVE_SEARCH_KEY").is_ok(),
                WebSearch::new().max_result_bytes(max),
            )
    }

    /// Invoke a tool by name, with validation, timeout, cancellation and
    /// truncation.
    ///
    /// Unknown tools, invalid parameters, timeouts and cancellation all come
    /// back as `Err` with a message naming the tool.
    pub async fn invoke(
        &self,
        name: &str,
        parameters: Value,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| format!("unknown tool '{name}'"))?;

        if self.validate_args {
            validate_tool_parameters(tool.as_ref(), &parameters)?;
        }

        log_tool_call(name, &parameters.to_string());
        let start = Instant::now();

        let call = tool.invoke(parameters, cancel.child_token());
        let timed = async {
            match self.default_timeout {
                Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    Err(format!(
                        "tool '{name}' timed out after {:.0} seconds",
                        limit.as_secs_f64()
                    ))
                }),
                None => call.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Tool {name} cancelled after {:.0}ms", start.elapsed().as_secs_f64() * 1000.0);
                return Err(format!("tool '{name}' cancelled"));
            }
            r = timed => r,
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(out) => {
                debug!(
                    "Tool {name} completed in {:.0}ms ({} bytes)",
                    elapsed.as_secs_f64() * 1000.0,
                    out.len()
                );
                trace!(
                    "Tool {name} result preview: {}",
                    out.chars().take(300).collect::<String>()
                );
            }
            Err(e) => debug!(
                "Tool {name} failed in {:.0}ms: {e}",
                elapsed.as_secs_f64() * 1000.0
            ),
        }

        result.map(|out| truncate_result(out, self.max_result_bytes))
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> + Send + Sync,
>;

/// A closure-based tool that auto-parses parameters and delegates to a handler.
///
/// Use it for stateless tools. Tools that need shared state should implement
/// [`Tool`] directly.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct LookupArgs {
///     /// Key to look up.
///     key: String,
/// }
///
/// let tool = FnTool::new(
///     ToolDef::new("lookup", "Look up a key", json_schema_for::<LookupArgs>()),
///     |args: LookupArgs| async move { Ok(format!("value for {}", args.key)) },
/// )
/// .with_category(ToolCategory::Read);
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
    category: Option<ToolCategory>,
    mutation: bool,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let erased =
            move |raw: Value| -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> {
                match serde_json::from_value::<A>(raw) {
                    Ok(args) => Box::pin(handler(args)),
                    Err(e) => Box::pin(async move { Err(format!("invalid tool arguments: {e}")) }),
                }
            };

        Self {
            def,
            handler: Box::new(erased),
            category: None,
            mutation: false,
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Mark this tool as a mutation (builder pattern).
    pub fn mutation(mut self, is_mutation: bool) -> Self {
        self.mutation = is_mutation;
        self
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn invoke(&self, parameters: Value, _cancel: CancellationToken) -> ToolFuture<'_> {
        Box::pin((self.handler)(parameters))
    }

    fn category(&self) -> Option<ToolCategory> {
        self.category
    }

    fn is_mutation(&self) -> bool {
        self.mutation
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.name)
            .field("category", &self.category)
            .field("mutation", &self.mutation)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate parameters against the tool's declared JSON Schema.
///
/// An invalid schema skips validation.
pub fn validate_tool_parameters(tool: &dyn Tool, parameters: &Value) -> Result<(), String> {
    let schema = tool.definition().parameters;
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(parameters)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "argument validation failed for tool '{}':\n{}",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` bytes (on a char boundary), appending a
/// notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let head = s.get(..end).unwrap_or_default();
    format!("{head}...\n[truncated: {} bytes total]", s.len())
}

/// Parse JSON parameters into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(parameters: Value) -> Result<T, String> {
    serde_json::from_value(parameters).map_err(|e| format!("invalid tool arguments: {e}"))
}

// ── Tests ──────────────────────────────────────────────────────────
