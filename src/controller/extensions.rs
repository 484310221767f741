//! Process-wide extension table.
//!
//! Third parties register named helpers here at start-up. Every controller
//! takes a snapshot of the table when it is constructed and calls entries
//! through [`Controller::call_extension`](super::Controller::call_extension);
//! action scripts reach the same entries by plain name.

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde_json::Value as JsonValue;

use super::Controller;
use crate::error::ControllerError;

/// A helper callable on any controller instance.
pub type ExtensionFn = Arc<
    dyn Fn(&mut Controller<'_>, &[JsonValue]) -> Result<JsonValue, ControllerError> + Send + Sync,
>;

/// Named helpers, in registration order.
#[derive(Clone, Default)]
pub struct ExtensionTable {
    entries: IndexMap<String, ExtensionFn>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, extension: ExtensionFn) {
        self.entries.insert(name.into(), extension);
    }

    pub fn register<F>(&mut self, name: impl Into<String>, extension: F)
    where
        F: Fn(&mut Controller<'_>, &[JsonValue]) -> Result<JsonValue, ControllerError>
            + Send
            + Sync
            + 'static,
    {
        self.insert(name, Arc::new(extension));
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionFn> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ExtensionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// Written during start-up only; request handling takes cheap Arc snapshots.
lazy_static! {
    static ref EXTENSIONS: RwLock<Arc<ExtensionTable>> = RwLock::new(Arc::new(ExtensionTable::new()));
}

/// Register (or replace) a process-wide extension.
///
/// Controllers constructed before the call keep their old snapshot.
pub fn register_extension<F>(name: impl Into<String>, extension: F)
where
    F: Fn(&mut Controller<'_>, &[JsonValue]) -> Result<JsonValue, ControllerError>
        + Send
        + Sync
        + 'static,
{
    let mut table = EXTENSIONS.write().unwrap_or_else(PoisonError::into_inner);
    Arc::make_mut(&mut *table).register(name, extension);
}

/// The current table, shared with every controller built from now on.
pub fn extensions_snapshot() -> Arc<ExtensionTable> {
    EXTENSIONS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
