//! Tool contract, schemas, and the process-wide tool registry
//!
//! Tools are external collaborators consumed by tool nodes and advertised
//! to LLM backends. A [`Tool`] describes itself with a [`ToolSchema`] that
//! exports to the OpenAI function-calling JSON shape via
//! [`ToolSchema::to_tool_spec`], and executes against a [`ToolContext`]
//! carrying the ambient [`ExecutionContext`].
//!
//! The [`ToolRegistry`] is an insertion-ordered catalog keyed by
//! `(namespace, name)` with secondary indexes by tag and source. It is
//! shared across concurrent runs and therefore thread-safe; registration
//! is idempotent per key, with a configurable replacement policy.
//!
//! # Exported tool spec shape
//!
//! ```rust
//! use agentgraph_core::tool::{ParameterKind, ToolParameter, ToolSchema};
//! use serde_json::json;
//!
//! let schema = ToolSchema::new("search", "Search the knowledge base")
//!     .with_parameter(ToolParameter::required("query", ParameterKind::String, "Search terms"))
//!     .with_parameter(ToolParameter::optional("limit", ParameterKind::Integer, "Max results"));
//!
//! assert_eq!(
//!     schema.to_tool_spec(),
//!     json!({
//!         "type": "function",
//!         "function": {
//!             "name": "search",
//!             "description": "Search the knowledge base",
//!             "parameters": {
//!                 "type": "object",
//!                 "properties": {
//!                     "query": {"type": "string", "description": "Search terms"},
//!                     "limit": {"type": "integer", "description": "Max results"},
//!                 },
//!                 "required": ["query"],
//!             },
//!         },
//!     })
//! );
//! ```

use crate::context::ExecutionContext;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Default namespace for tools registered without one
pub const DEFAULT_NAMESPACE: &str = "default";

/// A structured request to invoke a named tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, matched back to the producing request
    pub id: String,

    /// Tool name to invoke
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: Value,
}

/// Outcome of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool completed successfully
    pub success: bool,

    /// Result payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error description on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Extra information the tool wants propagated (timings, sources)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    /// Successful result with a payload
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Failed result with an error description
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// JSON-Schema-lite parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParameterKind {
    fn json_type(self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Number => "number",
            ParameterKind::Integer => "integer",
            ParameterKind::Boolean => "boolean",
            ParameterKind::Object => "object",
            ParameterKind::Array => "array",
        }
    }
}

/// One named tool parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,

    /// Parameter type
    pub kind: ParameterKind,

    /// What the parameter means, surfaced to the LLM
    pub description: String,

    /// Whether callers must supply the parameter
    pub required: bool,
}

impl ToolParameter {
    /// Create a required parameter
    pub fn required(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    /// Create an optional parameter
    pub fn optional(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        }
    }
}

/// Declared shape of a tool: name, description, parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,

    /// What the tool does
    pub description: String,

    /// Named parameters in declaration order
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    /// Create a schema with no parameters
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// The JSON-Schema-lite object describing the parameters
    pub fn parameters_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                json!({"type": p.kind.json_type(), "description": p.description}),
            );
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Export the OpenAI function-calling spec shape
    pub fn to_tool_spec(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema(),
            },
        })
    }
}

/// Context injected into every tool execution
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Ambient execution context of the run invoking the tool
    pub context: ExecutionContext,

    /// Run invoking the tool, when inside a graph run
    pub run_id: Option<String>,

    /// Graph invoking the tool, when inside a graph run
    pub graph_id: Option<String>,

    /// Extra attributes (tool call id, caller hints)
    pub attributes: HashMap<String, Value>,
}

impl ToolContext {
    /// Create a context wrapping the given execution context
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            run_id: None,
            graph_id: None,
            attributes: HashMap::new(),
        }
    }

    /// Associate the tool call with a run
    pub fn with_run(mut self, run_id: impl Into<String>, graph_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self.graph_id = Some(graph_id.into());
        self
    }

    /// Attach an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Executable tool contract
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (unique within its registry namespace)
    fn name(&self) -> &str;

    /// What the tool does
    fn description(&self) -> &str;

    /// Declared parameter schema
    fn schema(&self) -> ToolSchema;

    /// Execute with the given parameters
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult>;

    /// Check parameters against the declared schema
    ///
    /// The default implementation verifies that `params` is an object and
    /// that every required parameter is present. With the
    /// `json-validation` feature, the full JSON Schema produced by
    /// [`ToolSchema::parameters_schema`] is enforced as well.
    fn validate_params(&self, params: &Value) -> Result<()> {
        let schema = self.schema();
        let Some(object) = params.as_object() else {
            return Err(crate::error::GraphError::Validation(format!(
                "tool '{}': parameters must be an object",
                self.name()
            )));
        };
        for p in schema.parameters.iter().filter(|p| p.required) {
            if !object.contains_key(&p.name) {
                return Err(crate::error::GraphError::Validation(format!(
                    "tool '{}': missing required parameter '{}'",
                    self.name(),
                    p.name
                )));
            }
        }

        #[cfg(feature = "json-validation")]
        {
            use jsonschema::JSONSchema;

            let compiled = JSONSchema::compile(&schema.parameters_schema()).map_err(|e| {
                crate::error::GraphError::Validation(format!(
                    "tool '{}': invalid parameter schema: {e}",
                    self.name()
                ))
            })?;
            let messages = match compiled.validate(params) {
                Ok(()) => None,
                Err(errors) => Some(errors.map(|e| e.to_string()).collect::<Vec<_>>()),
            };
            if let Some(messages) = messages {
                return Err(crate::error::GraphError::Validation(format!(
                    "tool '{}': {}",
                    self.name(),
                    messages.join("; ")
                )));
            }
        }

        Ok(())
    }
}

/// What to do when a tool is registered under an already-taken key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacePolicy {
    /// Replace the existing tool and log a warning (default)
    #[default]
    ReplaceWithWarning,
    /// Keep the existing tool and ignore the new registration
    Ignore,
    /// Fail the registration
    Reject,
}

/// Registry key: namespace plus tool name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolKey {
    pub namespace: String,
    pub name: String,
}

impl ToolKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ToolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Registration options: tags and source for the secondary indexes
#[derive(Debug, Clone, Default)]
pub struct ToolRegistration {
    /// Tags for discovery (e.g. `"retrieval"`, `"math"`)
    pub tags: Vec<String>,

    /// Where the tool came from (e.g. a plugin or package name)
    pub source: Option<String>,
}

impl ToolRegistration {
    /// Empty registration options
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    tags: Vec<String>,
    source: Option<String>,
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<ToolKey>,
    tools: HashMap<ToolKey, RegisteredTool>,
    by_tag: HashMap<String, Vec<ToolKey>>,
    by_source: HashMap<String, Vec<ToolKey>>,
}

impl RegistryInner {
    fn unindex(&mut self, key: &ToolKey) {
        if let Some(existing) = self.tools.get(key) {
            for tag in &existing.tags {
                if let Some(keys) = self.by_tag.get_mut(tag) {
                    keys.retain(|k| k != key);
                }
            }
            if let Some(source) = &existing.source {
                if let Some(keys) = self.by_source.get_mut(source) {
                    keys.retain(|k| k != key);
                }
            }
        }
    }
}

/// Insertion-ordered, thread-safe tool catalog
///
/// Shared across runs; all methods take `&self`.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
    policy: ReplacePolicy,
}

impl ToolRegistry {
    /// Create an empty registry with the default replacement policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with an explicit replacement policy
    pub fn with_policy(policy: ReplacePolicy) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            policy,
        }
    }

    /// Register a tool in the default namespace
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        self.register_in(DEFAULT_NAMESPACE, tool, ToolRegistration::new())
    }

    /// Register a tool under a namespace with tags and source
    pub fn register_in(
        &self,
        namespace: impl Into<String>,
        tool: Arc<dyn Tool>,
        registration: ToolRegistration,
    ) -> Result<()> {
        let key = ToolKey::new(namespace, tool.name());
        let mut inner = self.inner.write().unwrap();

        if inner.tools.contains_key(&key) {
            match self.policy {
                ReplacePolicy::ReplaceWithWarning => {
                    tracing::warn!(tool = %key, "replacing previously registered tool");
                    inner.unindex(&key);
                }
                ReplacePolicy::Ignore => return Ok(()),
                ReplacePolicy::Reject => {
                    return Err(crate::error::GraphError::Validation(format!(
                        "tool '{key}' is already registered"
                    )));
                }
            }
        } else {
            inner.order.push(key.clone());
        }

        for tag in &registration.tags {
            inner.by_tag.entry(tag.clone()).or_default().push(key.clone());
        }
        if let Some(source) = &registration.source {
            inner
                .by_source
                .entry(source.clone())
                .or_default()
                .push(key.clone());
        }
        inner.tools.insert(
            key,
            RegisteredTool {
                tool,
                tags: registration.tags,
                source: registration.source,
            },
        );
        Ok(())
    }

    /// Look up a tool by namespace and name
    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<dyn Tool>> {
        let key = ToolKey::new(namespace, name);
        let inner = self.inner.read().unwrap();
        inner.tools.get(&key).map(|r| Arc::clone(&r.tool))
    }

    /// Look up a tool in the default namespace
    pub fn get_default(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.get(DEFAULT_NAMESPACE, name)
    }

    /// Whether the key is registered
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        let key = ToolKey::new(namespace, name);
        self.inner.read().unwrap().tools.contains_key(&key)
    }

    /// All registered keys in insertion order
    pub fn keys(&self) -> Vec<ToolKey> {
        self.inner.read().unwrap().order.clone()
    }

    /// Keys registered under the given tag
    pub fn keys_by_tag(&self, tag: &str) -> Vec<ToolKey> {
        self.inner
            .read()
            .unwrap()
            .by_tag
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys registered from the given source
    pub fn keys_by_source(&self, source: &str) -> Vec<ToolKey> {
        self.inner
            .read()
            .unwrap()
            .by_source
            .get(source)
            .cloned()
            .unwrap_or_default()
    }

    /// OpenAI function specs for every tool, in insertion order
    pub fn tool_specs(&self) -> Vec<Value> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .filter_map(|key| inner.tools.get(key))
            .map(|r| r.tool.schema().to_tool_spec())
            .collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().tools.len()
    }

    /// Whether no tools are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.keys())
            .field("policy", &self.policy)
            .finish()
    }
}
