//! Operation queue: the per-database scheduler. Tasks enter a FIFO; a write
//! at the head runs alone, while a contiguous prefix of reads is admitted as
//! one concurrent batch. The batch is fixed when it launches, so reads may
//! finish in any order among themselves but never bypass an earlier write.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Read,
    Write,
}

struct Waiter {
    kind: TaskKind,
    grant: oneshot::Sender<QueueGuard>,
}

#[derive(Default)]
struct QueueState {
    waiting: VecDeque<Waiter>,
    active_reads: usize,
    write_active: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
}

pub(crate) struct OperationQueue {
    shared: Arc<QueueShared>,
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue").finish_non_exhaustive()
    }
}

impl OperationQueue {
    pub fn new() -> Self {
        OperationQueue {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub async fn read(&self) -> QueueGuard {
        self.acquire(TaskKind::Read).await
    }

    pub async fn write(&self) -> QueueGuard {
        self.acquire(TaskKind::Write).await
    }

    async fn acquire(&self, kind: TaskKind) -> QueueGuard {
        let (grant, granted) = oneshot::channel();
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.waiting.push_back(Waiter { kind, grant });
            dispatch(&self.shared, &mut state);
        }
        match granted.await {
            Ok(guard) => guard,
            // The queue vanished while we waited; there is nothing left to
            // serialize against.
            Err(_) => QueueGuard {
                shared: self.shared.clone(),
                kind,
                armed: false,
            },
        }
    }
}

/// Admits the head of the queue when nothing is running: one write alone, or
/// the whole contiguous read prefix at once. A granted task whose receiver
/// disappeared before the grant arrived is undone and skipped.
fn dispatch(shared: &Arc<QueueShared>, state: &mut QueueState) {
    if state.write_active || state.active_reads > 0 {
        return;
    }
    loop {
        let Some(head) = state.waiting.front().map(|waiter| waiter.kind) else {
            return;
        };
        match head {
            TaskKind::Write => {
                let Some(waiter) = state.waiting.pop_front() else {
                    return;
                };
                state.write_active = true;
                let guard = QueueGuard {
                    shared: shared.clone(),
                    kind: TaskKind::Write,
                    armed: true,
                };
                match waiter.grant.send(guard) {
                    Ok(()) => return,
                    Err(mut guard) => {
                        guard.armed = false;
                        state.write_active = false;
                    }
                }
            }
            TaskKind::Read => {
                let mut admitted = 0;
                while state
                    .waiting
                    .front()
                    .is_some_and(|waiter| waiter.kind == TaskKind::Read)
                {
                    let Some(waiter) = state.waiting.pop_front() else {
                        break;
                    };
                    state.active_reads += 1;
                    let guard = QueueGuard {
                        shared: shared.clone(),
                        kind: TaskKind::Read,
                        armed: true,
                    };
                    match waiter.grant.send(guard) {
                        Ok(()) => admitted += 1,
                        Err(mut guard) => {
                            guard.armed = false;
                            state.active_reads -= 1;
                        }
                    }
                }
                if admitted > 0 {
                    return;
                }
            }
        }
    }
}

fn release(shared: &Arc<QueueShared>, kind: TaskKind) {
    let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
    match kind {
        TaskKind::Read => state.active_reads = state.active_reads.saturating_sub(1),
        TaskKind::Write => state.write_active = false,
    }
    dispatch(shared, &mut state);
}

/// Permission to run one queued task; dropping it completes the task and
/// re-dispatches the queue. A guard delivered into a dropped receiver
/// releases itself the same way.
pub(crate) struct QueueGuard {
    shared: Arc<QueueShared>,
    kind: TaskKind,
    armed: bool,
}

impl Drop for QueueGuard {
    fn drop(&mut self) {
        if self.armed {
            release(&self.shared, self.kind);
        }
    }
}
