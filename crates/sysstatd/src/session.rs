//! Per-client subscription state and delta accumulation.
//!
//! A session only ever holds paths; the property itself stays in the tree.
//! Between ticks it accumulates at most one pending value and one pending
//! metadata entry per path, the latest one winning.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use sysstat_core::{ClientId, SensorData, SensorInfo, SensorInfoMap, SensorTree, SensorValue};

/// Changes accumulated for one client since its last flush.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Frame {
    pub metadata: SensorInfoMap,
    pub values: Vec<SensorData>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.values.is_empty()
    }
}

/// Subscription state for one connected client.
#[derive(Debug)]
pub struct ClientSession {
    client_id: ClientId,
    subscribed: BTreeSet<String>,
    pending_values: BTreeMap<String, SensorValue>,
    pending_info: BTreeMap<String, SensorInfo>,
}

impl ClientSession {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            subscribed: BTreeSet::new(),
            pending_values: BTreeMap::new(),
            pending_info: BTreeMap::new(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Subscribes to every path that resolves; unknown paths are skipped.
    ///
    /// Returns the accepted paths.
    pub fn subscribe(&mut self, paths: &[String], tree: &mut SensorTree) -> Vec<String> {
        let mut accepted = Vec::new();

        for path in paths {
            if tree.subscribe(path, &self.client_id) {
                self.subscribed.insert(path.clone());
                accepted.push(path.clone());
            } else {
                debug!(client_id = %self.client_id, path = %path, "Ignoring subscribe to unknown sensor");
            }
        }

        accepted
    }

    /// Unsubscribes from the given paths. Paths not subscribed are ignored.
    ///
    /// Returns the paths that were dropped.
    pub fn unsubscribe(&mut self, paths: &[String], tree: &mut SensorTree) -> Vec<String> {
        let mut removed = Vec::new();

        for path in paths {
            if self.subscribed.remove(path) {
                tree.unsubscribe(path, &self.client_id);
                self.pending_values.remove(path);
                self.pending_info.remove(path);
                removed.push(path.clone());
            }
        }

        removed
    }

    pub fn is_subscribed(&self, path: &str) -> bool {
        self.subscribed.contains(path)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscribed.iter().map(String::as_str)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribed.len()
    }

    /// Records a changed value, overwriting any pending value for the path.
    pub fn record_value(&mut self, path: &str, value: SensorValue) {
        if self.subscribed.contains(path) {
            self.pending_values.insert(path.to_string(), value);
        }
    }

    /// Records changed metadata, overwriting any pending entry for the path.
    pub fn record_info(&mut self, path: &str, info: SensorInfo) {
        if self.subscribed.contains(path) {
            self.pending_info.insert(path.to_string(), info);
        }
    }

    /// Drops a path whose property was removed from the tree.
    pub fn forget(&mut self, path: &str) -> bool {
        self.pending_values.remove(path);
        self.pending_info.remove(path);
        self.subscribed.remove(path)
    }

    /// Unsubscribes from everything. Returns how many paths were held.
    pub fn teardown(&mut self, tree: &mut SensorTree) -> usize {
        let paths = std::mem::take(&mut self.subscribed);
        for path in &paths {
            tree.unsubscribe(path, &self.client_id);
        }

        self.pending_values.clear();
        self.pending_info.clear();
        paths.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_values.is_empty() || !self.pending_info.is_empty()
    }

    /// Takes the pending frame, leaving both buffers empty.
    pub fn take_frame(&mut self) -> Frame {
        let metadata = std::mem::take(&mut self.pending_info);
        let values = std::mem::take(&mut self.pending_values)
            .into_iter()
            .map(|(path, value)| SensorData { path, value })
            .collect();

        Frame { metadata, values }
    }
}
