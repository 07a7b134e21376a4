// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use log::debug;
use tokio::task::JoinHandle;

type CleanupFn = Box<dyn FnOnce() + Send>;

/// Resources acquired while connecting, released in reverse order.
///
/// Dropping the stack releases everything still on it, so an aborted
/// connect cleans up after itself.
#[derive(Default)]
pub struct CleanupStack {
    entries: Vec<(&'static str, CleanupFn)>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, label: &'static str, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.entries.push((label, Box::new(f)));
    }

    /// Abort a background task on cleanup
    pub fn track<T: Send + 'static>(&mut self, label: &'static str, task: JoinHandle<T>) {
        self.push(label, move || task.abort());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run all cleanups, last acquired first
    pub fn unwind(&mut self) {
        while let Some((label, f)) = self.entries.pop() {
            debug!("Cleanup: {}", label);
            f();
        }
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        self.unwind();
    }
}
