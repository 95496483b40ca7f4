//! Stack definition and loading.

use std::path::PathBuf;

use anyhow::Result;
use hcl_edit::structure::Block;
use serde::Serialize;

use crate::error::TerrastackError;
use crate::hcl::EvalContext;
use crate::project::{ProjectPath, SourceFile};

/// A directory marked as an independently-deployable Terraform unit.
#[derive(Debug, Clone, Serialize)]
pub struct Stack {
    /// Project path of the stack directory.
    pub dir: ProjectPath,
    /// Host path of the stack directory.
    #[serde(skip)]
    pub host_dir: PathBuf,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Project paths whose change marks this stack changed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub watch: Vec<ProjectPath>,
    /// Stacks that must be selected whenever this stack is selected.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub wants: Vec<ProjectPath>,
    /// Stacks whose selection pulls this stack in.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub wanted_by: Vec<ProjectPath>,
    /// Set by the change detector, never cleared.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_changed: bool,
}

impl Stack {
    /// Builds a stack from its `stack { }` block, evaluating every
    /// attribute expression against the directory's evaluation context.
    pub(crate) fn from_block(
        dir: ProjectPath,
        host_dir: PathBuf,
        block: &Block,
        src: &SourceFile,
        ctx: &EvalContext,
    ) -> Result<Stack> {
        let mut stack = Stack {
            name: default_name(&dir),
            dir,
            host_dir,
            description: String::new(),
            tags: Vec::new(),
            watch: Vec::new(),
            wants: Vec::new(),
            wanted_by: Vec::new(),
            is_changed: false,
        };

        if block.body.blocks().next().is_some() {
            return Err(TerrastackError::HclParseError {
                path: src.host_path.clone(),
                reason: "stack block must not contain sub-blocks".to_string(),
            }
            .into());
        }

        for attr in block.body.attributes() {
            let name = attr.key.value().to_string();
            let expr: hcl::Expression = attr.value.clone().into();
            let value = ctx.eval(&expr).map_err(|err| TerrastackError::InvalidStackAttribute {
                attr: name.clone(),
                reason: err.to_string(),
            })?;

            match name.as_str() {
                "name" => stack.name = string_value(&name, value)?,
                "description" => stack.description = string_value(&name, value)?,
                "tags" => stack.tags = string_list(&name, value)?,
                "watch" => {
                    stack.watch = string_list(&name, value)?
                        .into_iter()
                        .map(|raw| project_path_of(&stack.dir, &raw))
                        .collect();
                }
                "wants" => {
                    stack.wants = string_list(&name, value)?
                        .into_iter()
                        .map(|raw| project_path_of(&stack.dir, &raw))
                        .collect();
                }
                "wanted_by" => {
                    stack.wanted_by = string_list(&name, value)?
                        .into_iter()
                        .map(|raw| project_path_of(&stack.dir, &raw))
                        .collect();
                }
                _ => {
                    return Err(TerrastackError::InvalidStackAttribute {
                        attr: name,
                        reason: "unrecognized attribute".to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(stack)
    }
}

impl std::fmt::Display for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir)
    }
}

fn default_name(dir: &ProjectPath) -> String {
    if dir.is_root() {
        dir.as_str().to_string()
    } else {
        dir.basename().to_string()
    }
}

fn string_value(attr: &str, value: hcl::Value) -> Result<String> {
    match value {
        hcl::Value::String(s) => Ok(s),
        other => Err(TerrastackError::InvalidStackAttribute {
            attr: attr.to_string(),
            reason: format!("expected string, got {other:?}"),
        }
        .into()),
    }
}

fn string_list(attr: &str, value: hcl::Value) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| TerrastackError::InvalidStackAttribute {
        attr: attr.to_string(),
        reason: "expected list of strings".to_string(),
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(s) => out.push(s.to_string()),
            None => {
                return Err(TerrastackError::InvalidStackAttribute {
                    attr: attr.to_string(),
                    reason: format!("expected string element, got {item:?}"),
                }
                .into());
            }
        }
    }
    Ok(out)
}

// Relative paths in watch/wants declarations resolve below the stack dir.
fn project_path_of(dir: &ProjectPath, raw: &str) -> ProjectPath {
    if raw.starts_with('/') {
        ProjectPath::new(raw)
    } else if dir.is_root() {
        ProjectPath::new(format!("/{raw}"))
    } else {
        ProjectPath::new(format!("{dir}/{raw}"))
    }
}
