//! Built-in tools over the session's virtual filesystem and todo list.

use serde_json::{json, Value};

use super::{
    ArgKind, ArgSpec, ToolArgs, ToolCategory, ToolContext, ToolDescriptor, ToolError,
    ToolHandler, ToolRegistry,
};
use crate::todos::{self, Todo};

pub const LS: &str = "ls";
pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const EDIT_FILE: &str = "edit_file";
pub const DELETE_FILE: &str = "delete_file";
pub const WRITE_TODOS: &str = "write_todos";

/// Register every built-in tool.
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(ToolDescriptor::new(
        LS,
        "List all files in the virtual filesystem.",
        ToolCategory::Read,
        ListFiles,
    ));
    registry.register(
        ToolDescriptor::new(
            READ_FILE,
            "Read a file from the virtual filesystem.",
            ToolCategory::Read,
            ReadFile,
        )
        .arg(ArgSpec::required("path", ArgKind::String)),
    );
    registry.register(
        ToolDescriptor::new(
            WRITE_FILE,
            "Create or overwrite a file in the virtual filesystem.",
            ToolCategory::Write,
            WriteFile,
        )
        .arg(ArgSpec::required("path", ArgKind::String))
        .arg(ArgSpec::required("content", ArgKind::String)),
    );
    registry.register(
        ToolDescriptor::new(
            EDIT_FILE,
            "Replace a string inside a file.",
            ToolCategory::Write,
            EditFile,
        )
        .arg(ArgSpec::required("path", ArgKind::String))
        .arg(ArgSpec::required("old_string", ArgKind::String))
        .arg(ArgSpec::required("new_string", ArgKind::String))
        .arg(
            ArgSpec::optional("replace_all", ArgKind::Boolean)
                .describe("Replace every occurrence instead of exactly one"),
        ),
    );
    registry.register(
        ToolDescriptor::new(
            DELETE_FILE,
            "Delete a file from the virtual filesystem.",
            ToolCategory::Delete,
            DeleteFile,
        )
        .arg(ArgSpec::required("path", ArgKind::String)),
    );
    registry.register(
        ToolDescriptor::new(
            WRITE_TODOS,
            "Replace the todo list used to track progress.",
            ToolCategory::Planning,
            WriteTodos,
        )
        .arg(ArgSpec::required("todos", ArgKind::Array)),
    );
}

fn str_arg<'a>(args: &'a ToolArgs, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::Failed(format!("argument '{name}' must be a string")))
}

struct ListFiles;

impl ToolHandler for ListFiles {
    fn execute(&self, ctx: &mut ToolContext<'_>, _args: &ToolArgs) -> Result<Value, ToolError> {
        let files: Vec<Value> = ctx
            .session
            .list_files()
            .map(|info| json!({"path": info.path, "size": info.size, "version": info.version}))
            .collect();
        Ok(json!({ "files": files }))
    }
}

struct ReadFile;

impl ToolHandler for ReadFile {
    fn execute(&self, ctx: &mut ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = str_arg(args, "path")?;
        let content = ctx.read_file(path)?;
        Ok(Value::String(content.to_string()))
    }
}

struct WriteFile;

impl ToolHandler for WriteFile {
    fn execute(&self, ctx: &mut ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = str_arg(args, "path")?;
        let content = str_arg(args, "content")?;
        let version = ctx.write_file(path, content);
        Ok(json!({"path": path, "version": version, "size": content.len()}))
    }
}

struct EditFile;

impl ToolHandler for EditFile {
    fn execute(&self, ctx: &mut ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = str_arg(args, "path")?;
        let old = str_arg(args, "old_string")?;
        let new = str_arg(args, "new_string")?;
        let replace_all = args
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let version = ctx.edit_file(path, old, new, replace_all)?;
        Ok(json!({"path": path, "version": version}))
    }
}

struct DeleteFile;

impl ToolHandler for DeleteFile {
    fn execute(&self, ctx: &mut ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = str_arg(args, "path")?;
        let version = ctx.delete_file(path)?;
        Ok(json!({"path": path, "deleted": true, "version": version}))
    }
}

struct WriteTodos;

impl ToolHandler for WriteTodos {
    fn execute(&self, ctx: &mut ToolContext<'_>, args: &ToolArgs) -> Result<Value, ToolError> {
        let raw = args.get("todos").cloned().unwrap_or(Value::Null);
        let todos: Vec<Todo> = serde_json::from_value(raw)
            .map_err(|e| ToolError::Failed(format!("invalid todo list: {e}")))?;
        let summary = todos::progress_summary(&todos);
        let total = todos.len();
        let completed = todos::completed_count(&todos);
        ctx.set_todos(todos);
        Ok(json!({"total": total, "completed": completed, "summary": summary}))
    }
}
