//! Core record types for pbrealtime.
//!
//! This module defines the records held in the local store and the page
//! shape returned by the collection list endpoint.

use serde::{Deserialize, Serialize};

/// A single record of the synchronized collection.
///
/// `id` is assigned by the server and never changes; every other field is a
/// snapshot of server state and may be replaced by a later realtime event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Server-assigned identifier, unique within the collection.
    pub id: String,

    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Completion flag. Named `status` on the wire.
    #[serde(rename = "status", default)]
    pub done: bool,
}

impl Record {
    /// Create a new record.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, done: bool) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            done,
        }
    }

    /// Return a copy of this record with `done` inverted.
    #[must_use]
    pub fn toggled(&self) -> Self {
        Self {
            done: !self.done,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.done { 'x' } else { ' ' };
        write!(f, "[{mark}] {} ({})", self.title, self.id)
    }
}

/// One page of the collection list endpoint.
///
/// Only `items` is consumed. The pagination fields are decoded so the page
/// shape is validated, but only the first page is ever requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    /// Page number (1-based).
    #[serde(default)]
    pub page: u32,

    /// Page size requested by the server.
    #[serde(default)]
    pub per_page: u32,

    /// Total number of records in the collection.
    #[serde(default)]
    pub total_items: u64,

    /// Total number of pages.
    #[serde(default)]
    pub total_pages: u32,

    /// Records on this page, in server order.
    pub items: Vec<Record>,
}

impl CollectionSnapshot {
    /// Check whether the collection has records beyond this page.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.total_pages > 1 || self.total_items > self.items.len() as u64
    }
}
