use crate::model::{WatchEvent, WatchItem};
use tracing::debug;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ApplyOutcome {
    Added(String),
    Modified(String),
    Deleted(String),
    Unchanged,
    Diagnostic(String),
}

/// Ordered mirror of a server-side collection, keyed by item name.
///
/// Items keep first-seen order: ADDED appends, MODIFIED replaces in place and
/// DELETED removes. Consumers read names through [`Reconciler::available_names`],
/// which is sorted.
#[derive(Debug, Clone)]
pub struct Reconciler<T> {
    pub(crate) items: Vec<T>,
}

impl<T> Default for Reconciler<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: WatchItem> Reconciler<T> {
    pub fn seed(&mut self, items: Vec<T>) {
        self.items.clear();
        for item in items {
            if item.key().is_empty() {
                debug!("skipping unnamed item in bulk snapshot");
                continue;
            }
            match self.position(item.key()) {
                Some(index) => self.items[index] = item,
                None => self.items.push(item),
            }
        }
    }

    pub fn apply(&mut self, event: WatchEvent<T>) -> ApplyOutcome {
        match event {
            WatchEvent::Added(item) => {
                let name = item.key().to_string();
                if name.is_empty() || self.position(&name).is_some() {
                    return ApplyOutcome::Unchanged;
                }
                self.items.push(item);
                ApplyOutcome::Added(name)
            }
            WatchEvent::Modified(item) => {
                let name = item.key().to_string();
                let Some(index) = self.position(&name) else {
                    debug!("dropping MODIFIED for unknown item '{name}'");
                    return ApplyOutcome::Unchanged;
                };
                self.items[index] = item;
                ApplyOutcome::Modified(name)
            }
            WatchEvent::Deleted(item) => {
                let name = item.key().to_string();
                let Some(index) = self.position(&name) else {
                    // Selection may still hold the name; let the caller drop it.
                    return ApplyOutcome::Deleted(name);
                };
                self.items.remove(index);
                ApplyOutcome::Deleted(name)
            }
            WatchEvent::Error(message) => ApplyOutcome::Diagnostic(message),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn available_names(&self) -> Vec<String> {
        let mut names = self
            .items
            .iter()
            .map(|item| item.key().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.key() == name)
    }
}
