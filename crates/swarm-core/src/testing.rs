//! Scripted command runner for exercising cluster code without a cluster.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::command::{CommandError, CommandRunner, render_command};

/// Replays canned outputs per program and records every invocation.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<HashMap<String, VecDeque<Result<String, i32>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for the next call to `program`.
    pub fn ok(self, program: &str, stdout: &str) -> Self {
        self.push(program, Ok(stdout.to_string()));
        self
    }

    /// Queue a non-zero exit for the next call to `program`.
    pub fn fail(self, program: &str, code: i32) -> Self {
        self.push(program, Err(code));
        self
    }

    fn push(&self, program: &str, reply: Result<String, i32>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(program.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Recorded invocations of one program.
    pub fn calls_to(&self, program: &str) -> Vec<String> {
        let prefix = format!("{program} ");
        self.calls()
            .into_iter()
            .filter(|c| c == program || c.starts_with(&prefix))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let command = render_command(program, args);
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(command.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(program)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(String::new()));

        reply.map_err(|code| CommandError::Failed {
            command,
            code,
            stderr: "scripted failure".to_string(),
        })
    }
}
