//! Active-operation registry for a container handle.
//!
//! The handle owns the set; every live operation holds an [`OpGuard`]
//! that deregisters it on drop. Guards hold a weak reference back, so an
//! operation can outlive its caller's scope but never keeps the handle
//! alive, and `shutdown` can atomically swap the set empty.

use crate::process::DetachedProcess;
use crate::session::Session;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct ActiveOps {
    next_id: u64,
    pub(crate) streams: HashMap<u64, CancellationToken>,
    pub(crate) processes: HashMap<u64, Arc<DetachedProcess>>,
    pub(crate) sessions: HashMap<u64, Arc<Session>>,
}

pub(crate) type SharedOps = Arc<Mutex<ActiveOps>>;

impl ActiveOps {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Copy, Debug)]
enum OpKind {
    Stream,
    Process,
    Session,
}

/// Deregisters one operation from the active set when dropped.
pub(crate) struct OpGuard {
    ops: Weak<Mutex<ActiveOps>>,
    id: u64,
    kind: OpKind,
}

impl OpGuard {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        if let Some(ops) = self.ops.upgrade() {
            let mut ops = ops.lock().unwrap();
            match self.kind {
                OpKind::Stream => {
                    ops.streams.remove(&self.id);
                }
                OpKind::Process => {
                    ops.processes.remove(&self.id);
                }
                OpKind::Session => {
                    ops.sessions.remove(&self.id);
                }
            }
        }
    }
}

pub(crate) fn register_stream(ops: &SharedOps, token: CancellationToken) -> OpGuard {
    let mut guard = ops.lock().unwrap();
    let id = guard.next_id();
    guard.streams.insert(id, token);
    OpGuard {
        ops: Arc::downgrade(ops),
        id,
        kind: OpKind::Stream,
    }
}

pub(crate) fn reserve_process(ops: &SharedOps) -> OpGuard {
    let mut guard = ops.lock().unwrap();
    let id = guard.next_id();
    OpGuard {
        ops: Arc::downgrade(ops),
        id,
        kind: OpKind::Process,
    }
}

pub(crate) fn attach_process(ops: &SharedOps, id: u64, process: Arc<DetachedProcess>) {
    ops.lock().unwrap().processes.insert(id, process);
}

pub(crate) fn reserve_session(ops: &SharedOps) -> OpGuard {
    let mut guard = ops.lock().unwrap();
    let id = guard.next_id();
    OpGuard {
        ops: Arc::downgrade(ops),
        id,
        kind: OpKind::Session,
    }
}

pub(crate) fn attach_session(ops: &SharedOps, id: u64, session: Arc<Session>) {
    ops.lock().unwrap().sessions.insert(id, session);
}

/// Swaps the active set empty and returns the drained operations.
pub(crate) fn drain(ops: &SharedOps) -> ActiveOps {
    std::mem::take(&mut *ops.lock().unwrap())
}
