//! Approval policy persistence.
//!
//! Stored as `policy.json` in the data directory:
//!
//! ```json
//! {
//!   "tools": { "write_file": "auto" },
//!   "prefixes": { "mcp__search_": "auto" },
//!   "categories": { "delete": "requireApproval" },
//!   "interrupts": { "internet_search": { "allowEdit": false } }
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use super::{read_json_optional, remove_if_exists, write_json_atomic};
use crate::approval::ApprovalPolicy;

const POLICY_FILE: &str = "policy.json";

fn policy_path(dir: &Path) -> PathBuf {
    dir.join(POLICY_FILE)
}

pub fn save_policy(dir: &Path, policy: &ApprovalPolicy) -> io::Result<()> {
    write_json_atomic(&policy_path(dir), policy)
}

/// Load the policy, returning the default (no rules) if the file doesn't
/// exist.
pub fn load_policy(dir: &Path) -> io::Result<ApprovalPolicy> {
    Ok(read_json_optional(&policy_path(dir))?.unwrap_or_default())
}

pub fn delete_policy(dir: &Path) -> io::Result<()> {
    remove_if_exists(&policy_path(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{InterruptOptions, RiskLevel};
    use crate::tools::ToolCategory;
    use tempfile::TempDir;

    #[test]
    fn load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_policy(dir.path()).unwrap(), ApprovalPolicy::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut policy = ApprovalPolicy::new();
        policy.set_tool("write_file", RiskLevel::Auto);
        policy.set_prefix("mcp__search_", RiskLevel::Auto);
        policy.set_category(ToolCategory::Delete, RiskLevel::RequireApproval);
        policy.set_interrupt_options(
            "internet_search",
            InterruptOptions {
                allow_edit: false,
                ..InterruptOptions::default()
            },
        );

        save_policy(dir.path(), &policy).unwrap();
        assert_eq!(load_policy(dir.path()).unwrap(), policy);
    }

    #[test]
    fn delete_removes_file() {
        let dir = TempDir::new().unwrap();
        save_policy(dir.path(), &ApprovalPolicy::new().with_tool("ls", RiskLevel::Auto)).unwrap();
        assert!(dir.path().join("policy.json").exists());

        delete_policy(dir.path()).unwrap();
        assert!(!dir.path().join("policy.json").exists());
        // Deleting again is fine.
        delete_policy(dir.path()).unwrap();
    }
}
