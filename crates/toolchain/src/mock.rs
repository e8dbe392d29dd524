//! Recording runner
//!
//! A [`CommandRunner`] that never starts a process. It records every
//! invocation, can return canned stdout, fail on chosen programs and run a
//! hook to simulate the side effects of a tool (e.g. writing its output).

use crate::{CommandRunner, Invocation, ToolError};
use std::cell::RefCell;
use std::collections::BTreeMap;

type Hook = Box<dyn Fn(&Invocation)>;

#[derive(Default)]
pub struct MockRunner {
    calls: RefCell<Vec<Invocation>>,
    outputs: BTreeMap<String, String>,
    failing: Vec<String>,
    hooks: Vec<Hook>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned stdout for every captured run of `program`.
    pub fn with_output<P: Into<String>, S: Into<String>>(mut self, program: P, stdout: S) -> Self {
        self.outputs.insert(program.into(), stdout.into());
        self
    }

    /// Make every run of `program` exit with status 1.
    pub fn failing<P: Into<String>>(mut self, program: P) -> Self {
        self.failing.push(program.into());
        self
    }

    /// Call `hook` for every successful run.
    pub fn on_run<F: Fn(&Invocation) + 'static>(mut self, hook: F) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Invocations seen so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    fn run(&self, invocation: &Invocation) -> Result<(), ToolError> {
        self.calls.borrow_mut().push(invocation.clone());
        if self.failing.iter().any(|p| *p == invocation.program) {
            return Err(ToolError::Failed {
                command: invocation.display(),
                status: "exit status: 1".to_string(),
            });
        }
        for hook in &self.hooks {
            hook(invocation);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner")
            .field("calls", &self.calls.borrow().len())
            .field("failing", &self.failing)
            .finish_non_exhaustive()
    }
}

impl CommandRunner for MockRunner {
    fn status(&self, invocation: &Invocation) -> Result<(), ToolError> {
        self.run(invocation)
    }

    fn output(&self, invocation: &Invocation) -> Result<String, ToolError> {
        self.run(invocation)?;
        Ok(self
            .outputs
            .get(&invocation.program)
            .cloned()
            .unwrap_or_default())
    }
}
