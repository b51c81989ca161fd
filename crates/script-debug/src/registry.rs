use std::collections::HashMap;

use crate::event::ThreadId;
use crate::thread::DebugThread;

/// The debug threads of one target, in creation order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    threads: Vec<DebugThread>,
    index: HashMap<ThreadId, usize>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a thread, creating it on first contact. The flag is `true`
    /// when the thread was created by this call.
    pub(crate) fn get_or_create(&mut self, id: ThreadId) -> (&mut DebugThread, bool) {
        if let Some(&slot) = self.index.get(&id) {
            return (&mut self.threads[slot], false);
        }
        let slot = self.threads.len();
        self.threads.push(DebugThread::new(id));
        self.index.insert(id, slot);
        (&mut self.threads[slot], true)
    }

    pub fn get(&self, id: ThreadId) -> Option<&DebugThread> {
        self.index.get(&id).map(|&slot| &self.threads[slot])
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> Option<&mut DebugThread> {
        let slot = *self.index.get(&id)?;
        Some(&mut self.threads[slot])
    }

    pub fn threads(&self) -> impl Iterator<Item = &DebugThread> {
        self.threads.iter()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Terminates every thread; returns the ids that changed state.
    pub(crate) fn terminate_all(&mut self) -> Vec<ThreadId> {
        self.threads
            .iter_mut()
            .filter_map(|thread| thread.terminate().then(|| thread.id()))
            .collect()
    }
}
