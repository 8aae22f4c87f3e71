//! A [`CrmGrid`] bound to a backend that loads rows and persists edits.

use super::grid::{CellState, ChangeEvent, CrmGrid, EditOutcome, FieldUpdate, GridChange, GridError};
use super::{ClientField, CrmClient};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Storage the grid reads from and writes single fields to.
#[async_trait]
pub trait CrmBackend: Send + Sync {
    /// Rows of one sheet, newest first.
    async fn list_clients(&self, sheet_id: Uuid) -> Result<Vec<CrmClient>>;

    /// Persist one field. `None` clears the column.
    async fn update_field(
        &self,
        client_id: Uuid,
        field: ClientField,
        value: Option<String>,
    ) -> Result<()>;
}

#[async_trait]
impl<B: CrmBackend + ?Sized> CrmBackend for Arc<B> {
    async fn list_clients(&self, sheet_id: Uuid) -> Result<Vec<CrmClient>> {
        (**self).list_clients(sheet_id).await
    }

    async fn update_field(
        &self,
        client_id: Uuid,
        field: ClientField,
        value: Option<String>,
    ) -> Result<()> {
        (**self).update_field(client_id, field, value).await
    }
}

/// Result of an edit action that may have reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saved {
    /// The edit ended without a save.
    Cancelled,
    /// The edit was sent; the cell's sync state after the backend answered.
    Sent { update: FieldUpdate, state: Option<CellState> },
}

pub struct CrmGridSession<B> {
    backend: B,
    grid: CrmGrid,
}

impl<B: CrmBackend> CrmGridSession<B> {
    /// Load a sheet into a fresh grid.
    pub async fn open(backend: B, sheet_id: Uuid) -> Result<Self> {
        let mut session = Self {
            backend,
            grid: CrmGrid::new(sheet_id),
        };
        session.refresh().await?;
        Ok(session)
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let rows = self.backend.list_clients(self.grid.sheet_id()).await?;
        debug!(sheet_id = %self.grid.sheet_id(), rows = rows.len(), "Loaded CRM sheet");
        self.grid.load(rows);
        Ok(())
    }

    pub fn grid(&self) -> &CrmGrid {
        &self.grid
    }

    pub fn begin_edit(&mut self, client_id: Uuid, field: ClientField) -> Result<(), GridError> {
        self.grid.begin_edit(client_id, field).map(|_| ())
    }

    pub fn input(&mut self, value: impl Into<String>) -> Result<(), GridError> {
        self.grid.set_buffer(value)
    }

    pub fn cancel(&mut self) {
        self.grid.cancel();
    }

    pub fn revert(&mut self, client_id: Uuid, field: ClientField) -> Result<String, GridError> {
        self.grid.revert(client_id, field)
    }

    pub fn apply_change(&mut self, event: ChangeEvent) -> GridChange {
        self.grid.apply_change(event)
    }

    /// Pick an option in the select cell being edited and save it.
    pub async fn select(&mut self, value: &str) -> Result<Saved, GridError> {
        let update = self.stage_select(value)?;
        Ok(self.send(update).await)
    }

    /// Change the date cell being edited and save it.
    pub async fn change_date(&mut self, value: &str) -> Result<Saved, GridError> {
        let update = self.stage_change_date(value)?;
        Ok(self.send(update).await)
    }

    /// Blur/Enter on the cell being edited.
    pub async fn commit(&mut self) -> Result<Saved, GridError> {
        match self.stage_commit()? {
            Some(update) => Ok(self.send(update).await),
            None => Ok(Saved::Cancelled),
        }
    }

    /// Apply a select to the cache without writing it. The cell is left
    /// `Pending` until [`Self::resolve`] is called with the write's result.
    pub fn stage_select(&mut self, value: &str) -> Result<FieldUpdate, GridError> {
        self.grid.select(value)
    }

    pub fn stage_change_date(&mut self, value: &str) -> Result<FieldUpdate, GridError> {
        self.grid.change_date(value)
    }

    /// `None` when the blur/Enter was a cancel.
    pub fn stage_commit(&mut self) -> Result<Option<FieldUpdate>, GridError> {
        Ok(match self.grid.commit()? {
            EditOutcome::Committed(update) => Some(update),
            EditOutcome::Cancelled => None,
        })
    }

    /// Record the result of [`write_update`] for a staged edit.
    pub fn resolve(&mut self, update: &FieldUpdate, result: Result<(), String>) -> Option<CellState> {
        self.grid.resolve(update, result).cloned()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn send(&mut self, update: FieldUpdate) -> Saved {
        let result = write_update(&self.backend, &update).await;
        let state = self.resolve(&update, result);
        Saved::Sent { update, state }
    }
}

/// Persist a staged edit. Errors are logged and reduced to the message shown
/// on the failed cell.
pub async fn write_update<B: CrmBackend + ?Sized>(
    backend: &B,
    update: &FieldUpdate,
) -> Result<(), String> {
    let stored = update.field.normalize(&update.value).ok().flatten();
    backend
        .update_field(update.client_id, update.field, stored)
        .await
        .map_err(|e| {
            warn!(
                client_id = %update.client_id,
                field = %update.field,
                error = ?e,
                "CRM field update failed"
            );
            "Failed to update. Please try again.".to_owned()
        })
}
