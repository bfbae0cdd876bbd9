//! Launcher argv templates.
//!
//! A launcher is the local program that reaches into the remote target,
//! e.g. `kubectl exec -i web-0 -c nginx -- <command>`. Its argv is a
//! template with these placeholders:
//!
//! - `{context}` - the target's execution context
//! - `{sub_target}` - the target's sub-target
//! - `{sub_target_args}` - a standalone argument replaced by the expanded
//!   `sub_target_args` list, or removed when no sub-target is set
//!
//! An argument that mentions `{sub_target}` is dropped when the target has
//! no sub-target.

use serde::{Deserialize, Serialize};

use crate::{ChannelError, ExecTarget};

const CONTEXT: &str = "{context}";
const SUB_TARGET: &str = "{sub_target}";
const SUB_TARGET_ARGS: &str = "{sub_target_args}";

/// Launcher program and argv templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Program spawned for every remote command.
    pub program: String,
    /// Arguments placed before the remote command.
    pub args: Vec<String>,
    /// Arguments spliced in for `{sub_target_args}` when a sub-target is set.
    pub sub_target_args: Vec<String>,
    /// Arguments that print the context's sub-targets, whitespace separated.
    pub list_sub_targets: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: "kubectl".into(),
            args: vec![
                "exec".into(),
                "-i".into(),
                CONTEXT.into(),
                SUB_TARGET_ARGS.into(),
                "--".into(),
            ],
            sub_target_args: vec!["-c".into(), SUB_TARGET.into()],
            list_sub_targets: vec![
                "get".into(),
                "pod".into(),
                CONTEXT.into(),
                "-o".into(),
                "jsonpath={.spec.containers[*].name}".into(),
            ],
        }
    }
}

impl LauncherConfig {
    /// Checks that the template can launch anything at all.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.program.trim().is_empty() {
            return Err(ChannelError::InvalidConfig("launcher program is empty".into()));
        }
        Ok(())
    }

    /// Full launcher argv (without the program) running `command` in `target`.
    pub fn exec_argv(&self, target: &ExecTarget, command: &[String]) -> Vec<String> {
        let mut argv = expand(&self.args, target, &self.sub_target_args);
        argv.extend(command.iter().cloned());
        argv
    }

    /// Launcher argv listing the sub-targets of `context`.
    pub fn list_argv(&self, context: &str) -> Vec<String> {
        expand(&self.list_sub_targets, &ExecTarget::new(context), &[])
    }
}

fn expand(template: &[String], target: &ExecTarget, sub_target_args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(template.len());
    for arg in template {
        if arg == SUB_TARGET_ARGS {
            if target.sub_target.is_some() {
                out.extend(expand(sub_target_args, target, &[]));
            }
            continue;
        }
        if let Some(arg) = substitute(arg, target) {
            out.push(arg);
        }
    }
    out
}

fn substitute(arg: &str, target: &ExecTarget) -> Option<String> {
    let arg = arg.replace(CONTEXT, &target.context);
    if !arg.contains(SUB_TARGET) {
        return Some(arg);
    }
    target
        .sub_target
        .as_deref()
        .map(|sub| arg.replace(SUB_TARGET, sub))
}
