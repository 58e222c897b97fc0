// crates/waterline-dispatch/src/local.rs
// ============================================================================
// Module: Local Task Dispatcher
// Description: In-process dispatcher over an unbounded channel.
// Purpose: Drive runs without an external task runner (embedded and tests).
// Dependencies: waterline-core, tokio
// ============================================================================

//! ## Overview
//! The local dispatcher enqueues run tasks on an in-process channel. The host
//! drains the queue and calls back into the engine per task, mirroring how
//! the external runner invokes the runtime. Dispatch never blocks on task
//! execution, so a fan-out parent's terminal write is never gated on its
//! children starting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use tokio::sync::mpsc;

use waterline_core::Timestamp;
use waterline_core::interfaces::DispatchError;
use waterline_core::interfaces::RunTask;
use waterline_core::interfaces::TaskDispatcher;
use waterline_core::interfaces::TaskReceipt;

// ============================================================================
// SECTION: Queue Construction
// ============================================================================

/// Creates a connected local dispatcher and task queue pair.
#[must_use]
pub fn local_queue() -> (LocalTaskDispatcher, TaskQueue) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        LocalTaskDispatcher {
            sender,
        },
        TaskQueue {
            receiver,
        },
    )
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// In-process dispatcher enqueueing run tasks for a host-driven worker.
#[derive(Debug, Clone)]
pub struct LocalTaskDispatcher {
    /// Task channel sender.
    sender: mpsc::UnboundedSender<RunTask>,
}

#[async_trait]
impl TaskDispatcher for LocalTaskDispatcher {
    async fn dispatch(&self, task: &RunTask) -> Result<TaskReceipt, DispatchError> {
        self.sender.send(task.clone()).map_err(|_| {
            DispatchError::DispatchFailed("local task queue is closed".to_string())
        })?;
        Ok(TaskReceipt {
            task_id: task.task_id.clone(),
            runner_run_id: Some(task.task_id.clone()),
            accepted_at: Timestamp::now_utc(),
        })
    }
}

// ============================================================================
// SECTION: Task Queue
// ============================================================================

/// Receiving end of the local dispatch channel.
#[derive(Debug)]
pub struct TaskQueue {
    /// Task channel receiver.
    receiver: mpsc::UnboundedReceiver<RunTask>,
}

impl TaskQueue {
    /// Awaits the next task; `None` once every dispatcher handle is dropped.
    pub async fn next_task(&mut self) -> Option<RunTask> {
        self.receiver.recv().await
    }

    /// Returns the next task without waiting, when one is queued.
    pub fn try_next_task(&mut self) -> Option<RunTask> {
        self.receiver.try_recv().ok()
    }
}
