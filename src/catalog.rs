//! Tool registration and the ordered tool catalog
//!
//! Each tool is a [`ToolEntry`]: metadata, a JSON schema derived from its
//! typed input, and a handler that receives the [`DispatchContext`]
//! explicitly. The catalog is built once at startup and handed wholesale to
//! the MCP server.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use reqwest::StatusCode;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::dispatch::{DispatchContext, DispatchResult};
use crate::errors::{AppError, AppResult, AuthenticationError};

type HandlerFuture = BoxFuture<'static, AppResult<ToolOutput>>;
type Handler = Arc<dyn Fn(DispatchContext, Value) -> HandlerFuture + Send + Sync>;

/// Behavioral hints surfaced to calling agents
///
/// Advisory only; dispatch treats read-only and mutating tools identically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Annotations {
    /// Tool never mutates upstream state
    pub read_only: bool,
}

/// Descriptive metadata for one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMeta {
    pub name: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub annotations: Annotations,
}

impl ToolMeta {
    /// Metadata for a mutating tool with no tags
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tags: BTreeSet::new(),
            annotations: Annotations::default(),
        }
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| (*t).to_owned()));
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.annotations.read_only = read_only;
        self
    }
}

/// What a handler produced
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Plain text, returned as-is
    Text(String),
    /// Upstream call outcome, rendered as pretty-printed JSON
    Dispatched(DispatchResult),
}

impl ToolOutput {
    /// Text payload handed back to the calling agent
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Dispatched(result) => result.to_pretty_json(),
        }
    }

    /// Lift an upstream 401 into an [`AuthenticationError`]
    ///
    /// Used by drivers that can run the re-authorization flow; the MCP
    /// server path renders 401s like any other failure.
    pub fn into_authorized(self) -> AppResult<Self> {
        match self {
            Self::Dispatched(DispatchResult::Failure(failure))
                if failure.status == Some(StatusCode::UNAUTHORIZED.as_u16()) =>
            {
                Err(AuthenticationError::new(failure.message, failure.body).into())
            }
            other => Ok(other),
        }
    }
}

/// A registered tool: metadata, input schema, and bound handler
#[derive(Clone)]
pub struct ToolEntry {
    meta: ToolMeta,
    input_schema: Arc<Map<String, Value>>,
    handler: Handler,
}

impl ToolEntry {
    pub fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    pub fn input_schema(&self) -> Arc<Map<String, Value>> {
        self.input_schema.clone()
    }
}

impl fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolEntry")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Ordered, name-unique collection of tools
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `meta` to a handler taking a typed, schema-described input
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name is malformed or already registered,
    /// and `Internal` if the input schema cannot be generated.
    pub fn register_tool<I, F, Fut>(&mut self, meta: ToolMeta, handler: F) -> AppResult<()>
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(DispatchContext, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<ToolOutput>> + Send + 'static,
    {
        validate_tool_name(&meta.name)?;
        if self.index.contains_key(&meta.name) {
            return Err(AppError::InvalidInput(format!(
                "tool '{}' is already registered",
                meta.name
            )));
        }

        let input_schema = input_schema::<I>()?;
        let bound: Handler = Arc::new(move |ctx: DispatchContext, args: Value| -> HandlerFuture {
            match serde_json::from_value::<I>(args) {
                Ok(input) => handler(ctx, input).boxed(),
                Err(e) => futures::future::ready(Err(AppError::InvalidInput(format!(
                    "invalid arguments: {e}"
                ))))
                .boxed(),
            }
        });

        self.index.insert(meta.name.clone(), self.entries.len());
        self.entries.push(ToolEntry {
            meta,
            input_schema,
            handler: bound,
        });
        Ok(())
    }

    /// Keep only the tools matching `keep`, preserving order
    pub fn retain(&mut self, mut keep: impl FnMut(&ToolMeta) -> bool) {
        self.entries.retain(|entry| keep(&entry.meta));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.meta.name.clone(), i))
            .collect();
    }

    /// Tools in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ToolEntry> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.index.get(name).and_then(|i| self.entries.get(*i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Run the named tool's handler
    ///
    /// # Errors
    ///
    /// Returns `UnknownTool` for unregistered names, `InvalidInput` when the
    /// arguments do not match the input type, and whatever the handler
    /// returns.
    pub async fn invoke(
        &self,
        ctx: &DispatchContext,
        name: &str,
        args: Value,
    ) -> AppResult<ToolOutput> {
        let entry = self
            .get(name)
            .ok_or_else(|| AppError::UnknownTool(name.to_owned()))?;
        debug!(tool = name, "invoking tool");
        (entry.handler)(ctx.clone(), args).await
    }

    /// Run the named tool and render its uniform text payload
    ///
    /// Caller mistakes (bad arguments) are rendered as `{"error": ...}` like
    /// upstream failures; unknown tools and faults stay errors.
    pub async fn call(&self, ctx: &DispatchContext, name: &str, args: Value) -> AppResult<String> {
        match self.invoke(ctx, name, args).await {
            Ok(output) => Ok(output.render()),
            Err(AppError::InvalidInput(msg)) => {
                Ok(DispatchResult::failure(format!("invalid input: {msg}")).to_pretty_json())
            }
            Err(e) => Err(e),
        }
    }

    /// Catalog as JSON, for listings
    pub fn describe(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|entry| {
                    json!({
                        "name": entry.meta.name,
                        "description": entry.meta.description,
                        "tags": entry.meta.tags,
                        "read_only": entry.meta.annotations.read_only,
                    })
                })
                .collect(),
        )
    }
}

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("tool name pattern is a valid regex")
});

/// Tool names follow MCP conventions: 1..64 of `[A-Za-z0-9_-]`
fn validate_tool_name(name: &str) -> AppResult<()> {
    if !TOOL_NAME.is_match(name) {
        return Err(AppError::InvalidInput(format!(
            "tool name '{name}' must match [A-Za-z0-9_-]{{1,64}}"
        )));
    }
    Ok(())
}

fn input_schema<I: JsonSchema>() -> AppResult<Arc<Map<String, Value>>> {
    let schema = schemars::schema_for!(I);
    match serde_json::to_value(&schema) {
        Ok(Value::Object(map)) => Ok(Arc::new(map)),
        Ok(_) => Err(AppError::Internal(
            "tool input schema is not a JSON object".to_owned(),
        )),
        Err(e) => Err(AppError::Internal(format!(
            "failed to serialize tool input schema: {e}"
        ))),
    }
}
