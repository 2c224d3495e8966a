use std::sync::{Arc, Mutex};

use mk::exec::CommandOutput;
use mk::idempotent::Context;
use mk::remote::{ConnFuture, Connection};

/// A file written through [`FakeConnection::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub path: String,
    pub contents: Vec<u8>,
    pub mode: u32,
}

/// A connection that answers commands from a script and records everything.
///
/// Responses are matched by command prefix, first match wins. Unmatched
/// commands succeed with empty output.
#[derive(Clone, Default)]
pub struct FakeConnection {
    responses: Arc<Mutex<Vec<(String, CommandOutput)>>>,
    commands: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<Upload>>>,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
        self
    }

    pub fn respond_ok(&self, prefix: &str, stdout: &str) -> &Self {
        self.respond(
            prefix,
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                code: 0,
            },
        )
    }

    pub fn respond_err(&self, prefix: &str, code: i32, stderr: &str) -> &Self {
        self.respond(
            prefix,
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                code,
            },
        )
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Connection for FakeConnection {
    fn host(&self) -> &str {
        "fake-host"
    }

    fn run<'a>(&'a self, _ctx: &'a Context, command: &'a str) -> ConnFuture<'a, CommandOutput> {
        let output = {
            self.commands.lock().unwrap().push(command.to_string());
            self.responses
                .lock()
                .unwrap()
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_default()
        };
        Box::pin(async move { Ok(output) })
    }

    fn upload<'a>(
        &'a self,
        _ctx: &'a Context,
        contents: &'a [u8],
        remote_path: &'a str,
        mode: u32,
    ) -> ConnFuture<'a, ()> {
        self.uploads.lock().unwrap().push(Upload {
            path: remote_path.to_string(),
            contents: contents.to_vec(),
            mode,
        });
        Box::pin(async move { Ok(()) })
    }
}
