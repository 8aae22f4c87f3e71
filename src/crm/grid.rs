//! Row cache and inline-edit state for one CRM sheet.
//!
//! The grid holds the rows of the selected sheet (newest first), at most one
//! cell in edit mode, and the sync status of cells whose edits were committed.
//! Commits are optimistic: the cached row changes immediately and the returned
//! [`FieldUpdate`] is what must be sent to the backend. [`CrmGrid::resolve`]
//! records the backend's answer; a failed cell keeps the unsaved value until it
//! is edited again, reverted, or replaced by a realtime update.
//!
//! Realtime changes are merged last-write-wins in arrival order.

use super::{ClientField, CrmClient, FieldKind, FieldValueError};
use serde::Serialize;
use std::collections::HashMap;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("no cell is being edited")]
    NotEditing,
    #[error("client {0} is not in this sheet")]
    UnknownClient(Uuid),
    #[error("{field} is edited as {actual:?}, not {expected:?}")]
    WrongKind {
        field: ClientField,
        expected: FieldKind,
        actual: FieldKind,
    },
    #[error("nothing to revert for {field} of client {client_id}")]
    NothingToRevert { client_id: Uuid, field: ClientField },
    #[error(transparent)]
    Value(#[from] FieldValueError),
}

/// The single cell currently in edit mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct EditingCell {
    pub client_id: Uuid,
    pub field: ClientField,
    pub buffer: String,
    #[serde(skip)]
    original: String,
}

impl EditingCell {
    pub fn is_dirty(&self) -> bool {
        self.buffer != self.original
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CellStatus {
    Pending,
    Synced,
    Failed,
}

/// Sync state of a committed cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CellState {
    pub status: CellStatus,
    /// Value shown before the first unsynced commit; what `revert` restores.
    pub previous: String,
    pub value: String,
    pub error: Option<String>,
    #[serde(skip)]
    seq: u64,
}

/// A committed edit awaiting the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct FieldUpdate {
    pub client_id: Uuid,
    pub field: ClientField,
    pub value: String,
    #[ts(type = "number")]
    pub seq: u64,
}

/// Row-level notification from the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "op", rename_all = "snake_case")]
#[ts(export)]
pub enum ChangeEvent {
    Insert { row: CrmClient },
    Update { row: CrmClient },
    Delete { id: Uuid, sheet_id: Option<Uuid> },
}

impl ChangeEvent {
    pub fn client_id(&self) -> Uuid {
        match self {
            ChangeEvent::Insert { row } | ChangeEvent::Update { row } => row.id,
            ChangeEvent::Delete { id, .. } => *id,
        }
    }
}

/// Effect of a realtime event on the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridChange {
    Upserted(Uuid),
    Removed(Uuid),
    Ignored,
}

/// How a blur/Enter ended an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Committed(FieldUpdate),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CrmGrid {
    sheet_id: Uuid,
    rows: Vec<CrmClient>,
    editing: Option<EditingCell>,
    cells: HashMap<(Uuid, ClientField), CellState>,
    next_seq: u64,
}

impl CrmGrid {
    pub fn new(sheet_id: Uuid) -> Self {
        Self {
            sheet_id,
            rows: Vec::new(),
            editing: None,
            cells: HashMap::new(),
            next_seq: 1,
        }
    }

    /// Replace the cache with a fresh fetch. Rows of other sheets are dropped.
    pub fn load(&mut self, mut rows: Vec<CrmClient>) {
        rows.retain(|r| r.sheet_id == Some(self.sheet_id));
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.rows = rows;
        self.cells.clear();
        if let Some(cell) = &self.editing
            && self.position(cell.client_id).is_none()
        {
            self.editing = None;
        }
    }

    pub fn sheet_id(&self) -> Uuid {
        self.sheet_id
    }

    pub fn rows(&self) -> &[CrmClient] {
        &self.rows
    }

    pub fn row(&self, client_id: Uuid) -> Option<&CrmClient> {
        self.rows.iter().find(|r| r.id == client_id)
    }

    pub fn editing(&self) -> Option<&EditingCell> {
        self.editing.as_ref()
    }

    pub fn cell_state(&self, client_id: Uuid, field: ClientField) -> Option<&CellState> {
        self.cells.get(&(client_id, field))
    }

    fn position(&self, client_id: Uuid) -> Option<usize> {
        self.rows.iter().position(|r| r.id == client_id)
    }

    /// Enter edit mode on a cell, leaving any other cell.
    pub fn begin_edit(
        &mut self,
        client_id: Uuid,
        field: ClientField,
    ) -> Result<&EditingCell, GridError> {
        let row = self
            .row(client_id)
            .ok_or(GridError::UnknownClient(client_id))?;
        let current = row.get_field(field);
        let cell = self.editing.insert(EditingCell {
            client_id,
            field,
            buffer: current.clone(),
            original: current,
        });
        Ok(cell)
    }

    /// Keystrokes in a text cell.
    pub fn set_buffer(&mut self, value: impl Into<String>) -> Result<(), GridError> {
        let cell = self.editing.as_mut().ok_or(GridError::NotEditing)?;
        cell.buffer = value.into();
        Ok(())
    }

    /// Pick an option in a select cell; commits immediately.
    pub fn select(&mut self, value: &str) -> Result<FieldUpdate, GridError> {
        self.commit_now(FieldKind::Select, value)
    }

    /// Change a date cell; commits immediately.
    pub fn change_date(&mut self, value: &str) -> Result<FieldUpdate, GridError> {
        self.commit_now(FieldKind::Date, value)
    }

    fn commit_now(&mut self, kind: FieldKind, value: &str) -> Result<FieldUpdate, GridError> {
        let cell = self.editing.as_ref().ok_or(GridError::NotEditing)?;
        let actual = cell.field.kind();
        if actual != kind {
            return Err(GridError::WrongKind {
                field: cell.field,
                expected: kind,
                actual,
            });
        }
        let (client_id, field) = (cell.client_id, cell.field);
        self.apply_commit(client_id, field, value)
    }

    /// Blur or Enter. Text cells save a changed buffer and cancel otherwise;
    /// select and date cells already saved on change, so this only leaves edit mode.
    pub fn commit(&mut self) -> Result<EditOutcome, GridError> {
        let cell = self.editing.as_ref().ok_or(GridError::NotEditing)?;
        if cell.field.kind() != FieldKind::Text || !cell.is_dirty() {
            self.editing = None;
            return Ok(EditOutcome::Cancelled);
        }
        let (client_id, field, buffer) = (cell.client_id, cell.field, cell.buffer.clone());
        self.apply_commit(client_id, field, &buffer)
            .map(EditOutcome::Committed)
    }

    /// Escape: leave edit mode without saving.
    pub fn cancel(&mut self) -> Option<EditingCell> {
        self.editing.take()
    }

    fn apply_commit(
        &mut self,
        client_id: Uuid,
        field: ClientField,
        value: &str,
    ) -> Result<FieldUpdate, GridError> {
        let idx = self
            .position(client_id)
            .ok_or(GridError::UnknownClient(client_id))?;
        let row = &mut self.rows[idx];
        let shown = row.get_field(field);
        row.set_field(field, value)?;
        let value = row.get_field(field);

        // Keep the last value known to be persisted across repeated unsynced commits.
        let previous = match self.cells.get(&(client_id, field)) {
            Some(state) if state.status != CellStatus::Synced => state.previous.clone(),
            _ => shown,
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.cells.insert(
            (client_id, field),
            CellState {
                status: CellStatus::Pending,
                previous,
                value: value.clone(),
                error: None,
                seq,
            },
        );
        self.editing = None;

        Ok(FieldUpdate {
            client_id,
            field,
            value,
            seq,
        })
    }

    /// Record the backend's answer to a commit.
    ///
    /// Answers for superseded commits, or for cells a realtime update already
    /// settled, are ignored and return `None`.
    pub fn resolve(
        &mut self,
        update: &FieldUpdate,
        result: Result<(), String>,
    ) -> Option<&CellState> {
        let state = self.cells.get_mut(&(update.client_id, update.field))?;
        if state.seq != update.seq {
            return None;
        }
        match result {
            Ok(()) => {
                state.status = CellStatus::Synced;
                state.error = None;
            }
            Err(message) => {
                state.status = CellStatus::Failed;
                state.error = Some(message);
            }
        }
        Some(state)
    }

    /// Put a failed cell back to its last persisted value. Local only: the
    /// backend never accepted the failed value.
    pub fn revert(&mut self, client_id: Uuid, field: ClientField) -> Result<String, GridError> {
        let nothing = GridError::NothingToRevert { client_id, field };
        let state = match self.cells.get(&(client_id, field)) {
            Some(state) if state.status == CellStatus::Failed => state,
            _ => return Err(nothing),
        };
        let previous = state.previous.clone();
        let idx = self
            .position(client_id)
            .ok_or(GridError::UnknownClient(client_id))?;
        self.rows[idx].set_field(field, &previous)?;
        self.cells.remove(&(client_id, field));
        Ok(previous)
    }

    /// Merge a realtime event into the cache.
    pub fn apply_change(&mut self, event: ChangeEvent) -> GridChange {
        match event {
            ChangeEvent::Insert { row } => {
                if row.sheet_id != Some(self.sheet_id) {
                    return self.remove(row.id);
                }
                let id = row.id;
                match self.position(id) {
                    Some(idx) => self.rows[idx] = row,
                    None => self.rows.insert(0, row),
                }
                self.settle(id);
                GridChange::Upserted(id)
            }
            ChangeEvent::Update { row } => {
                let Some(idx) = self.position(row.id) else {
                    return GridChange::Ignored;
                };
                if row.sheet_id != Some(self.sheet_id) {
                    return self.remove(row.id);
                }
                let id = row.id;
                self.rows[idx] = row;
                self.settle(id);
                GridChange::Upserted(id)
            }
            ChangeEvent::Delete { id, .. } => self.remove(id),
        }
    }

    fn remove(&mut self, client_id: Uuid) -> GridChange {
        let Some(idx) = self.position(client_id) else {
            return GridChange::Ignored;
        };
        self.rows.remove(idx);
        self.settle(client_id);
        if self
            .editing
            .as_ref()
            .is_some_and(|c| c.client_id == client_id)
        {
            self.editing = None;
        }
        GridChange::Removed(client_id)
    }

    /// The backend's row is now authoritative for every cell of this client.
    fn settle(&mut self, client_id: Uuid) {
        self.cells.retain(|(id, _), _| *id != client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::tests::client;
    use crate::crm::{DealStatus, LeadType};

    fn grid_with(names: &[&str]) -> (CrmGrid, Vec<Uuid>) {
        let sheet = Uuid::new_v4();
        let mut grid = CrmGrid::new(sheet);
        let rows: Vec<_> = names.iter().map(|n| client(n, sheet)).collect();
        let ids = rows.iter().map(|r| r.id).collect();
        grid.load(rows);
        (grid, ids)
    }

    #[test]
    fn one_editing_cell_at_a_time() {
        let (mut grid, ids) = grid_with(&["Asha", "Ravi"]);
        grid.begin_edit(ids[0], ClientField::LeadType).unwrap();
        grid.begin_edit(ids[1], ClientField::CallingComment).unwrap();
        let cell = grid.editing().unwrap();
        assert_eq!(cell.client_id, ids[1]);
        assert_eq!(cell.field, ClientField::CallingComment);
    }

    #[test]
    fn select_commits_optimistically() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::LeadType).unwrap();
        let update = grid.select("hot").unwrap();

        assert_eq!(update.value, "hot");
        assert!(grid.editing().is_none());
        assert_eq!(grid.row(ids[0]).unwrap().lead_type, LeadType::Hot);
        let state = grid.cell_state(ids[0], ClientField::LeadType).unwrap();
        assert_eq!(state.status, CellStatus::Pending);
        assert_eq!(state.previous, "warm");
    }

    #[test]
    fn select_on_text_cell_is_rejected() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::AdminNotes).unwrap();
        assert!(matches!(
            grid.select("hot"),
            Err(GridError::WrongKind { .. })
        ));
        assert!(grid.editing().is_some());
    }

    #[test]
    fn invalid_option_keeps_edit_mode_and_row() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::DealStatus).unwrap();
        assert!(matches!(grid.select("won"), Err(GridError::Value(_))));
        assert!(grid.editing().is_some());
        assert_eq!(grid.row(ids[0]).unwrap().deal_status, DealStatus::Open);
    }

    #[test]
    fn text_blur_without_change_cancels() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::LocationCategory).unwrap();
        assert_eq!(grid.commit().unwrap(), EditOutcome::Cancelled);
        assert!(grid.editing().is_none());
        assert!(grid.cell_state(ids[0], ClientField::LocationCategory).is_none());
    }

    #[test]
    fn text_blur_with_change_commits() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::LocationCategory).unwrap();
        grid.set_buffer("Whitefield").unwrap();
        let EditOutcome::Committed(update) = grid.commit().unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(update.field, ClientField::LocationCategory);
        assert_eq!(
            grid.row(ids[0]).unwrap().location_category.as_deref(),
            Some("Whitefield")
        );
    }

    #[test]
    fn failure_keeps_value_until_revert() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::LeadType).unwrap();
        let update = grid.select("cold").unwrap();

        let state = grid.resolve(&update, Err("timeout".into())).unwrap();
        assert_eq!(state.status, CellStatus::Failed);
        assert_eq!(grid.row(ids[0]).unwrap().lead_type, LeadType::Cold);

        assert_eq!(grid.revert(ids[0], ClientField::LeadType).unwrap(), "warm");
        assert_eq!(grid.row(ids[0]).unwrap().lead_type, LeadType::Warm);
        assert!(grid.cell_state(ids[0], ClientField::LeadType).is_none());
    }

    #[test]
    fn revert_requires_failed_cell() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::LeadType).unwrap();
        let update = grid.select("hot").unwrap();
        grid.resolve(&update, Ok(()));
        assert!(matches!(
            grid.revert(ids[0], ClientField::LeadType),
            Err(GridError::NothingToRevert { .. })
        ));
    }

    #[test]
    fn stale_resolution_is_ignored() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::LeadType).unwrap();
        let first = grid.select("hot").unwrap();
        grid.begin_edit(ids[0], ClientField::LeadType).unwrap();
        let second = grid.select("cold").unwrap();

        assert!(grid.resolve(&first, Ok(())).is_none());
        let state = grid.resolve(&second, Err("boom".into())).unwrap();
        assert_eq!(state.status, CellStatus::Failed);
        assert_eq!(state.previous, "warm");
    }

    #[test]
    fn insert_prepends_once() {
        let (mut grid, _) = grid_with(&["Asha"]);
        let row = client("New lead", grid.sheet_id());
        let id = row.id;
        assert_eq!(
            grid.apply_change(ChangeEvent::Insert { row: row.clone() }),
            GridChange::Upserted(id)
        );
        grid.apply_change(ChangeEvent::Insert { row });
        assert_eq!(grid.rows().len(), 2);
        assert_eq!(grid.rows()[0].id, id);
    }

    #[test]
    fn other_sheet_events_are_ignored() {
        let (mut grid, _) = grid_with(&["Asha"]);
        let row = client("Elsewhere", Uuid::new_v4());
        assert_eq!(
            grid.apply_change(ChangeEvent::Insert { row }),
            GridChange::Ignored
        );
        assert_eq!(grid.rows().len(), 1);
    }

    #[test]
    fn update_replaces_known_and_ignores_unknown() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        let mut row = grid.row(ids[0]).unwrap().clone();
        row.admin_notes = Some("called twice".into());
        grid.apply_change(ChangeEvent::Update { row });
        assert_eq!(
            grid.row(ids[0]).unwrap().admin_notes.as_deref(),
            Some("called twice")
        );

        let stranger = client("Stranger", grid.sheet_id());
        assert_eq!(
            grid.apply_change(ChangeEvent::Update { row: stranger }),
            GridChange::Ignored
        );
        assert_eq!(grid.rows().len(), 1);
    }

    #[test]
    fn update_moving_row_out_of_sheet_removes_it() {
        let (mut grid, ids) = grid_with(&["Asha", "Ravi"]);
        let mut row = grid.row(ids[1]).unwrap().clone();
        row.sheet_id = Some(Uuid::new_v4());
        assert_eq!(
            grid.apply_change(ChangeEvent::Update { row }),
            GridChange::Removed(ids[1])
        );
        assert!(grid.row(ids[1]).is_none());
    }

    #[test]
    fn realtime_update_settles_cell_state() {
        let (mut grid, ids) = grid_with(&["Asha"]);
        grid.begin_edit(ids[0], ClientField::LeadType).unwrap();
        let update = grid.select("hot").unwrap();
        let row = grid.row(ids[0]).unwrap().clone();
        grid.apply_change(ChangeEvent::Update { row });

        assert!(grid.cell_state(ids[0], ClientField::LeadType).is_none());
        assert!(grid.resolve(&update, Ok(())).is_none());
    }

    #[test]
    fn delete_removes_row_and_its_edit() {
        let (mut grid, ids) = grid_with(&["Asha", "Ravi"]);
        grid.begin_edit(ids[0], ClientField::AdminNotes).unwrap();
        let change = grid.apply_change(ChangeEvent::Delete {
            id: ids[0],
            sheet_id: Some(grid.sheet_id()),
        });
        assert_eq!(change, GridChange::Removed(ids[0]));
        assert!(grid.editing().is_none());
        assert_eq!(grid.rows().len(), 1);
    }
}
