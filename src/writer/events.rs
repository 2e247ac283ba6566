// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Callbacks fired on writer lifecycle events.
//!
//! Recorders register callbacks to learn when the writer rotates to a new
//! file, so they can e.g. upload or index the closed file while recording
//! continues. Callbacks run synchronously on the thread that triggered the
//! split.

/// File transition reported to split callbacks.
///
/// Both paths are full paths as handed to the storage factory. On close,
/// `opened_file` is empty since no successor file is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagSplitInfo {
    /// File that was just finalized
    pub closed_file: String,
    /// File that recording continues into, or empty on close
    pub opened_file: String,
}

/// A set of callbacks registered by one caller.
///
/// Fields are optional so callers subscribe only to the events they care
/// about.
#[derive(Default)]
pub struct WriterEventCallbacks {
    /// Invoked after a file is finalized, on split and on close
    pub split: Option<Box<dyn FnMut(&BagSplitInfo) + Send>>,
}

impl WriterEventCallbacks {
    /// Create an empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the split callback.
    pub fn with_split<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&BagSplitInfo) + Send + 'static,
    {
        self.split = Some(Box::new(callback));
        self
    }
}

/// Holds every registered callback set and dispatches events to them.
#[derive(Default)]
pub(crate) struct EventCallbackManager {
    callbacks: Vec<WriterEventCallbacks>,
}

impl EventCallbackManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, callbacks: WriterEventCallbacks) {
        self.callbacks.push(callbacks);
    }

    pub(crate) fn fire_split(&mut self, info: &BagSplitInfo) {
        for set in &mut self.callbacks {
            if let Some(split) = set.split.as_mut() {
                split(info);
            }
        }
    }
}
