//! Risk taxonomy: which tools run automatically and which wait for a human.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RiskLevel;
use crate::tools::{ToolCategory, ToolDescriptor};

/// Which decision kinds a human may use for a given tool.
///
/// All three are allowed unless configured otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterruptOptions {
    pub allow_accept: bool,
    pub allow_edit: bool,
    pub allow_decline: bool,
}

impl Default for InterruptOptions {
    fn default() -> Self {
        Self {
            allow_accept: true,
            allow_edit: true,
            allow_decline: true,
        }
    }
}

/// Which rule produced a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    Tool,
    Prefix(String),
    Category(ToolCategory),
    Descriptor,
    /// No rule matched and the tool is not registered.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub risk: RiskLevel,
    pub source: RuleSource,
}

/// Classification policy for tool calls.
///
/// Rules are checked in order: exact tool name, longest matching prefix,
/// tool category, the descriptor's declared risk, and finally
/// `RequireApproval` for anything unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalPolicy {
    /// Per-tool rules (e.g. `"write_file": "auto"`).
    pub tools: BTreeMap<String, RiskLevel>,

    /// Tool-name prefix rules (e.g. `"mcp__search_": "auto"`).
    pub prefixes: BTreeMap<String, RiskLevel>,

    /// Category rules (e.g. `"delete": "requireApproval"`).
    pub categories: BTreeMap<ToolCategory, RiskLevel>,

    /// Per-tool restrictions on the decisions a human may make.
    pub interrupts: BTreeMap<String, InterruptOptions>,
}

impl ApprovalPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the risk for a single tool.
    pub fn set_tool(&mut self, tool: impl Into<String>, risk: RiskLevel) {
        self.tools.insert(tool.into(), risk);
    }

    pub fn remove_tool(&mut self, tool: &str) {
        self.tools.remove(tool);
    }

    /// Set the risk for every tool whose name starts with `prefix`.
    pub fn set_prefix(&mut self, prefix: impl Into<String>, risk: RiskLevel) {
        self.prefixes.insert(prefix.into(), risk);
    }

    pub fn remove_prefix(&mut self, prefix: &str) {
        self.prefixes.remove(prefix);
    }

    pub fn set_category(&mut self, category: ToolCategory, risk: RiskLevel) {
        self.categories.insert(category, risk);
    }

    pub fn set_interrupt_options(&mut self, tool: impl Into<String>, options: InterruptOptions) {
        self.interrupts.insert(tool.into(), options);
    }

    /// Decision kinds allowed for `tool`.
    pub fn interrupt_options(&self, tool: &str) -> InterruptOptions {
        self.interrupts.get(tool).copied().unwrap_or_default()
    }

    /// Builder-style variant of [`ApprovalPolicy::set_tool`].
    pub fn with_tool(mut self, tool: impl Into<String>, risk: RiskLevel) -> Self {
        self.set_tool(tool, risk);
        self
    }

    /// Drop every rule.
    pub fn clear(&mut self) {
        self.tools.clear();
        self.prefixes.clear();
        self.categories.clear();
        self.interrupts.clear();
    }

    /// Classify a call to `tool`. `descriptor` is `None` for tools the
    /// registry does not know.
    pub fn classify(&self, tool: &str, descriptor: Option<&ToolDescriptor>) -> Classification {
        if let Some(risk) = self.tools.get(tool) {
            return Classification {
                risk: *risk,
                source: RuleSource::Tool,
            };
        }

        let longest_prefix = self
            .prefixes
            .iter()
            .filter(|(prefix, _)| tool.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        if let Some((prefix, risk)) = longest_prefix {
            return Classification {
                risk: *risk,
                source: RuleSource::Prefix(prefix.clone()),
            };
        }

        match descriptor {
            Some(descriptor) => match self.categories.get(&descriptor.category) {
                Some(risk) => Classification {
                    risk: *risk,
                    source: RuleSource::Category(descriptor.category),
                },
                None => Classification {
                    risk: descriptor.risk,
                    source: RuleSource::Descriptor,
                },
            },
            None => Classification {
                risk: RiskLevel::RequireApproval,
                source: RuleSource::Default,
            },
        }
    }
}
