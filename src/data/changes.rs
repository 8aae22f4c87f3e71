//! Realtime `crm_clients` change feed over Postgres `LISTEN/NOTIFY`.
//!
//! A trigger announces each row change on [`CHANNEL`] with the row's id and
//! sheet. The feed re-reads inserted and updated rows and broadcasts
//! [`ChangeEvent`]s to every subscriber; subscribers filter by sheet.

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::clients;
use crate::crm::grid::ChangeEvent;
use crate::json::parse_json;
use crate::state::{ServiceStatus, ServiceStatusRegistry};

pub const CHANNEL: &str = "crm_clients_changes";

const SERVICE_NAME: &str = "change_feed";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Op {
    Insert,
    Update,
    Delete,
}

/// Trigger payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Notice {
    op: Op,
    id: Uuid,
    sheet_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Fan an event out to current subscribers. Returns how many received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Listen until `cancel` fires, reconnecting after failures.
    pub fn spawn(
        &self,
        pool: PgPool,
        statuses: ServiceStatusRegistry,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            info!(channel = CHANNEL, "Change feed started");
            statuses.set(SERVICE_NAME, ServiceStatus::Starting);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = feed.listen(&pool, &statuses) => {
                        if let Err(e) = result {
                            statuses.set(SERVICE_NAME, ServiceStatus::Error);
                            warn!(error = ?e, "Change feed listener failed, reconnecting");
                        }
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = time::sleep(RECONNECT_DELAY) => {}
                }
            }
            statuses.set(SERVICE_NAME, ServiceStatus::Disabled);
            info!("Change feed stopped");
        })
    }

    async fn listen(&self, pool: &PgPool, statuses: &ServiceStatusRegistry) -> Result<()> {
        let mut listener = PgListener::connect_with(pool)
            .await
            .context("connecting change feed listener")?;
        listener
            .listen(CHANNEL)
            .await
            .context("subscribing to change channel")?;
        statuses.set(SERVICE_NAME, ServiceStatus::Connected);
        debug!(channel = CHANNEL, "Listening for row changes");

        loop {
            let notification = listener.recv().await?;
            let notice = match parse_json::<Notice>(notification.payload()) {
                Ok(notice) => notice,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed change notification");
                    continue;
                }
            };
            if let Some(event) = resolve(pool, notice).await? {
                let receivers = self.publish(event);
                trace!(receivers, "Broadcast row change");
            }
        }
    }
}

/// Turn a notice into an event, reading the current row for inserts and updates.
/// A row deleted before it could be read yields `None`; its delete notice follows.
async fn resolve(pool: &PgPool, notice: Notice) -> Result<Option<ChangeEvent>> {
    let event = match notice.op {
        Op::Delete => Some(ChangeEvent::Delete {
            id: notice.id,
            sheet_id: notice.sheet_id,
        }),
        Op::Insert => clients::get(pool, notice.id)
            .await?
            .map(|row| ChangeEvent::Insert { row }),
        Op::Update => clients::get(pool, notice.id)
            .await?
            .map(|row| ChangeEvent::Update { row }),
    };
    Ok(event)
}
