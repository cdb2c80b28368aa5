use reconcile::{HookInterpreter, Result};
use std::path::Path;

use super::backend_error;
use crate::runner;

/// Runs hook scripts as `<interpreter> <script>`
pub struct ScriptInterpreter {
    program: String,
}

impl ScriptInterpreter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl HookInterpreter for ScriptInterpreter {
    fn run(&self, script: &Path, elevate: bool) -> Result<Option<i32>> {
        let script = script.to_string_lossy();
        let status = runner::run(&self.program, &[script.as_ref()], elevate)
            .map_err(|e| backend_error(format!("run {script}"), &e))?;
        Ok(status.code())
    }
}
