//! Task queue and the single executor turn.
//!
//! Execution requests arrive on the network task but the script engine is
//! not shared across tasks. Commands are queued through [`TaskQueue`] and
//! drained by one [`ExecutorTurn`], so snippets run strictly in arrival
//! order against one engine and one context.

use probelink_engine::{EngineError, ExecutionContext, ScriptEngine};
use tokio::sync::mpsc;
use tracing::debug;

use crate::logcap::LogCapture;

/// Work items for the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentTask {
    /// Compile and run a code snippet.
    Execute {
        /// Snippet source text.
        code: String,
    },
    /// Refresh context bindings from the registered provider.
    Rescan,
}

/// Cheap clone-anywhere producer handle for [`AgentTask`]s.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<AgentTask>,
}

impl TaskQueue {
    /// Creates a queue handle and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a snippet for execution.
    pub fn execute(&self, code: String) {
        let _ = self.tx.send(AgentTask::Execute { code });
    }

    /// Queues a context rescan.
    pub fn rescan(&self) {
        let _ = self.tx.send(AgentTask::Rescan);
    }
}

/// Owns the script engine and drains the task queue.
///
/// Every outcome is reported through the log capture rather than returned:
/// results travel to observers the same way ordinary logs do.
pub struct ExecutorTurn {
    tasks: mpsc::UnboundedReceiver<AgentTask>,
    engine: ScriptEngine,
    context: ExecutionContext,
    logs: LogCapture,
}

impl ExecutorTurn {
    /// Creates the executor and the queue handle that feeds it.
    pub fn new(
        engine: ScriptEngine,
        context: ExecutionContext,
        logs: LogCapture,
    ) -> (TaskQueue, Self) {
        let (queue, tasks) = TaskQueue::channel();
        (
            queue,
            Self {
                tasks,
                engine,
                context,
                logs,
            },
        )
    }

    /// Drains tasks until every queue handle is dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.tasks.recv().await {
            self.handle(task);
        }
        debug!("task queue closed, executor stopping");
    }

    fn handle(&mut self, task: AgentTask) {
        match task {
            AgentTask::Execute { code } => self.execute(&code),
            AgentTask::Rescan => {
                self.context.rescan();
                debug!(bindings = self.context.len(), "context rescanned");
            }
        }
    }

    fn execute(&mut self, code: &str) {
        self.logs.log(format!("Received code execution command: {code}"));
        match self.engine.execute(code, &mut self.context) {
            Ok(result) => self.logs.log(format!("Execution result: {result}")),
            Err(EngineError::Compile(diagnostics)) => {
                let mut report = String::from("Compilation failed:");
                for diagnostic in diagnostics {
                    report.push('\n');
                    report.push_str(&diagnostic);
                }
                self.logs.error(report);
            }
            Err(EngineError::Execution(cause)) => {
                self.logs.error(format!("Error executing code: {cause}"));
            }
            Err(err) => self.logs.error(format!("Error executing code: {err}")),
        }
    }
}
