//! Change tracking: paged selection of changed rows.

use crate::error::SyncResult;
use crate::store::{ChangeQuery, Selection, SyncStore};
use rowsync_protocol::{ChangeRecord, ScopeInfo, Value, Watermark};
use rowsync_schema::Table;
use uuid::Uuid;

/// The watermark range a selection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeWindow {
    /// Exclusive lower bound.
    pub since: Watermark,
    /// Inclusive upper bound.
    pub until: Option<Watermark>,
    /// Changes last made by this scope are skipped.
    pub exclude_origin: Option<Uuid>,
}

impl ChangeWindow {
    /// Everything a scope has not seen yet.
    pub fn for_scope(scope: &ScopeInfo) -> Self {
        Self::since(scope.since())
    }

    /// Everything after `since`.
    pub fn since(since: Watermark) -> Self {
        Self {
            since,
            until: None,
            exclude_origin: None,
        }
    }

    /// Caps the window at a snapshot watermark.
    #[must_use]
    pub fn until(mut self, until: Watermark) -> Self {
        self.until = Some(until);
        self
    }

    /// Skips changes that came from `scope`.
    #[must_use]
    pub fn excluding(mut self, scope: Uuid) -> Self {
        self.exclude_origin = Some(scope);
        self
    }
}

/// Selects changes from a store one page at a time.
pub struct ChangeTracker<'a> {
    store: &'a dyn SyncStore,
    page_size: usize,
}

impl<'a> ChangeTracker<'a> {
    /// Creates a tracker reading pages of `page_size` rows.
    pub fn new(store: &'a dyn SyncStore, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Opens a cursor over one table.
    pub fn cursor(
        &self,
        table: &'a Table,
        window: ChangeWindow,
        selection: Selection,
    ) -> ChangeCursor<'a> {
        ChangeCursor {
            store: self.store,
            table,
            query: ChangeQuery {
                since: window.since,
                until: window.until,
                exclude_origin: window.exclude_origin,
                selection,
                after: None,
                limit: self.page_size,
            },
            exhausted: false,
        }
    }

    /// Every change of a table within the window.
    pub async fn select_changes(
        &self,
        table: &'a Table,
        window: ChangeWindow,
    ) -> SyncResult<Vec<ChangeRecord>> {
        self.cursor(table, window, Selection::All).collect_all().await
    }
}

/// A restartable position in one table's changes.
///
/// Pages follow primary key order; the cursor remembers the last key it
/// returned, so a selection can be resumed from [`position`](Self::position).
pub struct ChangeCursor<'a> {
    store: &'a dyn SyncStore,
    table: &'a Table,
    query: ChangeQuery,
    exhausted: bool,
}

impl<'a> ChangeCursor<'a> {
    /// Table being read.
    pub fn table(&self) -> &'a Table {
        self.table
    }

    /// Last key returned, if any.
    pub fn position(&self) -> Option<&[Value]> {
        self.query.after.as_deref()
    }

    /// Continues after `key` on the next call to [`next_page`](Self::next_page).
    pub fn resume_from(&mut self, key: Vec<Value>) {
        self.query.after = Some(key);
        self.exhausted = false;
    }

    /// Starts over from the first key.
    pub fn restart(&mut self) {
        self.query.after = None;
        self.exhausted = false;
    }

    /// Returns the next page, or `None` once the table is exhausted.
    pub async fn next_page(&mut self) -> SyncResult<Option<Vec<ChangeRecord>>> {
        if self.exhausted {
            return Ok(None);
        }
        let rows = self.store.select_changes(self.table, &self.query).await?;
        if rows.len() < self.query.limit {
            self.exhausted = true;
        }
        let Some(last) = rows.last() else {
            return Ok(None);
        };
        self.query.after = Some(last.key.clone());

        let since = self.query.since;
        Ok(Some(rows.iter().map(|row| row.to_change(since)).collect()))
    }

    /// Drains the remaining pages.
    pub async fn collect_all(mut self) -> SyncResult<Vec<ChangeRecord>> {
        let mut changes = Vec::new();
        while let Some(page) = self.next_page().await? {
            changes.extend(page);
        }
        Ok(changes)
    }
}
