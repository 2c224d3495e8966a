use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use mk::idempotent::{Action, ActionFuture, Context};

/// Call counters shared between a [`ScriptedAction`] and the test.
#[derive(Debug, Default)]
pub struct Counters {
    pub checks: AtomicUsize,
    pub performs: AtomicUsize,
}

impl Counters {
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn performs(&self) -> usize {
        self.performs.load(Ordering::SeqCst)
    }
}

/// An action whose behaviour is configured by the test.
///
/// On a successful perform it marks itself completed and returns its name.
/// If a shared journal is attached, the name is appended to it when perform
/// starts.
pub struct ScriptedAction {
    name: String,
    completed: AtomicBool,
    check_error: Option<String>,
    perform_error: Option<String>,
    panic_on_perform: bool,
    delay: Option<Duration>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
    counters: Arc<Counters>,
}

impl ScriptedAction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            completed: AtomicBool::new(false),
            check_error: None,
            perform_error: None,
            panic_on_perform: false,
            delay: None,
            journal: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn completed(self) -> Self {
        self.completed.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_check(mut self, msg: &str) -> Self {
        self.check_error = Some(msg.to_string());
        self
    }

    pub fn failing(mut self, msg: &str) -> Self {
        self.perform_error = Some(msg.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_perform = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub fn boxed(self) -> Box<dyn Action<Output = String>> {
        Box::new(self)
    }
}

impl Action for ScriptedAction {
    type Output = String;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_completed(&self) -> ActionFuture<'_, bool> {
        Box::pin(async move {
            self.counters.checks.fetch_add(1, Ordering::SeqCst);
            if let Some(msg) = &self.check_error {
                bail!("{}", msg);
            }
            Ok(self.completed.load(Ordering::SeqCst))
        })
    }

    fn perform<'a>(&'a self, _ctx: &'a Context) -> ActionFuture<'a, String> {
        Box::pin(async move {
            self.counters.performs.fetch_add(1, Ordering::SeqCst);
            if let Some(journal) = &self.journal {
                journal.lock().unwrap().push(self.name.clone());
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.panic_on_perform {
                panic!("scripted panic in {}", self.name);
            }
            if let Some(msg) = &self.perform_error {
                bail!("{}", msg);
            }
            self.completed.store(true, Ordering::SeqCst);
            Ok(self.name.clone())
        })
    }
}
