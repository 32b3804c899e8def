//! Explicit tool registry.
//!
//! Tools are registered once at startup with a descriptor (argument schema,
//! category, declared risk, handler) and the registry is then shared by
//! reference. Nothing is discovered at runtime.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ToolArgs, ToolCallRequest, ToolContext, ToolError, ToolResult};
use crate::approval::RiskLevel;
use crate::session::Session;

/// Broad kind of effect a tool has. Policies can classify by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolCategory {
    Read,
    Write,
    Delete,
    Planning,
    External,
}

impl ToolCategory {
    /// Risk used when neither the policy nor the descriptor says otherwise.
    pub fn default_risk(self) -> RiskLevel {
        match self {
            ToolCategory::Read | ToolCategory::Planning => RiskLevel::Auto,
            ToolCategory::Write | ToolCategory::Delete | ToolCategory::External => {
                RiskLevel::RequireApproval
            }
        }
    }
}

/// JSON type expected for an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl ArgKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Number => value.is_number(),
            ArgKind::Boolean => value.is_boolean(),
            ArgKind::Array => value.is_array(),
            ArgKind::Object => value.is_object(),
            ArgKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ArgSpec {
    pub fn required(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: String::new(),
        }
    }

    pub fn optional(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: String::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Business logic of one tool.
pub trait ToolHandler: Send + Sync {
    fn execute(&self, ctx: &mut ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError>;
}

/// Capability descriptor: what a tool accepts, how risky it is, and how to
/// run it.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub risk: RiskLevel,
    pub args: Vec<ArgSpec>,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("risk", &self.risk)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// New descriptor whose declared risk is the category default.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            risk: category.default_risk(),
            args: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    pub fn risk(mut self, risk: RiskLevel) -> Self {
        self.risk = risk;
        self
    }

    /// Check `args` against the schema: required arguments present, kinds
    /// matching, nothing unexpected.
    pub fn validate_args(&self, args: &ToolArgs) -> Result<(), ToolError> {
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        };

        for spec in &self.args {
            match args.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(invalid(format!("missing required argument '{}'", spec.name)));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.matches(value) => {
                    return Err(invalid(format!(
                        "argument '{}' must be of type {:?}",
                        spec.name, spec.kind
                    )));
                }
                Some(_) => {}
            }
        }

        if let Some(unexpected) = args
            .keys()
            .find(|key| !self.args.iter().any(|spec| &spec.name == *key))
        {
            return Err(invalid(format!("unexpected argument '{unexpected}'")));
        }

        Ok(())
    }
}

/// Mapping from tool name to descriptor.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in filesystem and todo tools.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        super::builtin::register_all(&mut registry);
        registry
    }

    /// Register a tool, returning the descriptor it replaced (if any).
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Option<ToolDescriptor> {
        self.tools.insert(descriptor.name.clone(), descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Run `request` against `session`.
    ///
    /// Unknown tools, schema violations and handler failures all come back
    /// as [`ToolResult::Error`]; this never fails the caller.
    pub fn execute(&self, session: &mut Session, request: &ToolCallRequest) -> ToolResult {
        match self.try_execute(session, request) {
            Ok(output) => ToolResult::success(request.id().clone(), request.tool(), output),
            Err(err) => {
                log::warn!(
                    "Tool '{}' (call {}) failed: {}",
                    request.tool(),
                    request.id(),
                    err
                );
                ToolResult::error(request.id().clone(), request.tool(), err.to_string())
            }
        }
    }

    fn try_execute(
        &self,
        session: &mut Session,
        request: &ToolCallRequest,
    ) -> Result<Value, ToolError> {
        let descriptor = self
            .get(request.tool())
            .ok_or_else(|| ToolError::UnknownTool(request.tool().to_string()))?;
        descriptor.validate_args(request.args())?;

        let mut ctx = ToolContext::new(session, request.id(), request.tool());
        descriptor.handler.execute(&mut ctx, request.args())
    }
}
