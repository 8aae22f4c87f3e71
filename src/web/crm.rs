//! Staff CRM endpoints: sheet listing, filtered client rows, single-field
//! edits and the live inline-edit session over WebSocket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{Json, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::crm::filter::{ClientFilter, ClientStats, distinct_locations};
use crate::crm::grid::{CellState, ChangeEvent, EditingCell, FieldUpdate, GridChange, GridError};
use crate::crm::session::{CrmBackend, CrmGridSession, write_update};
use crate::crm::{ClientField, CrmClient};
use crate::data::clients::{self, EditRejection, PgCrmBackend};
use crate::data::staff::{self, CrmSheet};
use crate::json::parse_json;
use crate::state::AppState;
use crate::web::auth::StaffUser;
use crate::web::error::{ApiError, db_error};
use crate::web::extract::JsonBody;

const NO_SHEET_ACCESS: &str = "You do not have access to this sheet";

fn require_sheet(user: &StaffUser, sheet_id: Uuid) -> Result<(), ApiError> {
    if user.can_access(sheet_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(NO_SHEET_ACCESS))
    }
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct SheetsResponse {
    pub sheets: Vec<CrmSheet>,
}

/// `GET /api/crm/sheets`
#[instrument(skip_all, fields(staff_id = %user.staff.id))]
pub async fn list_sheets(
    user: StaffUser,
    State(state): State<AppState>,
) -> Result<Json<SheetsResponse>, ApiError> {
    let sheets = staff::accessible_sheets(&state.db_pool, user.staff.id)
        .await
        .map_err(|e| db_error("Sheet listing", e))?;
    Ok(Json(SheetsResponse { sheets }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientParams {
    search: Option<String>,
    lead_stage: Option<String>,
    lead_type: Option<String>,
    deal_status: Option<String>,
    location: Option<String>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct ClientsResponse {
    pub clients: Vec<CrmClient>,
    /// Counts over the whole sheet, ignoring filters.
    pub stats: ClientStats,
    pub locations: Vec<String>,
}

/// `GET /api/crm/sheets/{sheet_id}/clients`
#[instrument(skip_all, fields(staff_id = %user.staff.id, %sheet_id))]
pub async fn list_clients(
    user: StaffUser,
    State(state): State<AppState>,
    Path(sheet_id): Path<Uuid>,
    Query(params): Query<ClientParams>,
) -> Result<Json<ClientsResponse>, ApiError> {
    require_sheet(&user, sheet_id)?;
    let filter = ClientFilter::from_params(
        params.search.as_deref(),
        params.lead_stage.as_deref(),
        params.lead_type.as_deref(),
        params.deal_status.as_deref(),
        params.location.as_deref(),
    )
    .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let rows = clients::list_by_sheet(&state.db_pool, sheet_id)
        .await
        .map_err(|e| db_error("Client listing", e))?;

    Ok(Json(ClientsResponse {
        stats: ClientStats::from_clients(&rows),
        locations: distinct_locations(&rows),
        clients: filter.apply(&rows).cloned().collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    field: String,
    value: Option<String>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct UpdateClientResponse {
    pub client: CrmClient,
}

/// `PATCH /api/crm/clients/{id}`: set one field; an empty value clears it.
#[instrument(skip_all, fields(staff_id = %user.staff.id, %client_id))]
pub async fn update_client(
    user: StaffUser,
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    JsonBody(body): JsonBody<UpdateClientRequest>,
) -> Result<Json<UpdateClientResponse>, ApiError> {
    let field: ClientField = body
        .field
        .parse()
        .map_err(|e: crate::crm::FieldValueError| ApiError::bad_request(e.to_string()))?;
    let value = field
        .normalize(body.value.as_deref().unwrap_or_default())
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let result = clients::update_field_as(
        &state.db_pool,
        &user.staff,
        &user.sheet_ids,
        client_id,
        field,
        value.as_deref(),
    )
    .await
    .map_err(|e| db_error("Client update", e))?;

    match result {
        Ok(client) => {
            info!(field = %field, "Updated client field");
            Ok(Json(UpdateClientResponse { client }))
        }
        Err(EditRejection::NotFound) => Err(ApiError::not_found(format!(
            "Client not found: {client_id}"
        ))),
        Err(EditRejection::NoAccess) => Err(ApiError::forbidden(NO_SHEET_ACCESS)),
    }
}

/// Frames sent by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ClientFrame {
    BeginEdit { client_id: Uuid, field: ClientField },
    Input { value: String },
    Select { value: String },
    ChangeDate { value: String },
    Commit,
    Cancel,
    Revert { client_id: Uuid, field: ClientField },
}

/// Frames sent to the browser.
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ServerFrame {
    Snapshot {
        sheet_id: Uuid,
        rows: Vec<CrmClient>,
    },
    RowUpserted {
        row: CrmClient,
    },
    RowRemoved {
        id: Uuid,
    },
    Editing {
        cell: Option<EditingCell>,
    },
    Cell {
        client_id: Uuid,
        field: ClientField,
        /// `None` once a reverted cell is back to its stored value.
        state: Option<CellState>,
    },
    Error {
        message: String,
    },
}

/// `GET /api/crm/sheets/{sheet_id}/live`
pub async fn live_session(
    user: StaffUser,
    State(state): State<AppState>,
    Path(sheet_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    require_sheet(&user, sheet_id)?;
    Ok(ws.on_upgrade(move |socket| run_session(socket, state, user, sheet_id)))
}

async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> bool {
    let Ok(text) = serde_json::to_string(frame) else {
        return false;
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}

#[instrument(skip_all, fields(staff_id = %user.staff.id, %sheet_id))]
async fn run_session(mut socket: WebSocket, state: AppState, user: StaffUser, sheet_id: Uuid) {
    // Subscribe before the snapshot so no change slips between the two.
    let mut changes = state.change_feed.subscribe();
    let backend = PgCrmBackend::new(state.db_pool.clone(), user.staff.clone(), user.sheet_ids);

    let mut session = match CrmGridSession::open(backend, sheet_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = ?e, "Failed to open CRM session");
            let _ = send_frame(
                &mut socket,
                &ServerFrame::Error {
                    message: "Failed to load clients".to_owned(),
                },
            )
            .await;
            return;
        }
    };
    info!("CRM live session opened");
    if !send_frame(&mut socket, &snapshot(&session)).await {
        return;
    }

    // Writes run as detached tasks: they outlive the socket and never hold up the loop.
    let (written_tx, mut written) = mpsc::unbounded_channel();

    loop {
        let frames = tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let handled = handle_client_frame(&mut session, text.as_str());
                    if let Some(update) = handled.write {
                        spawn_write(session.backend().clone(), update, written_tx.clone());
                    }
                    handled.frames
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
            },
            Some((update, result)) = written.recv() => resolved_frames(&mut session, &update, result),
            change = changes.recv() => match change {
                Ok(event) => change_frames(&mut session, event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "CRM session lagged behind change feed, resnapshotting");
                    match session.refresh().await {
                        Ok(()) => vec![snapshot(&session)],
                        Err(e) => {
                            warn!(error = ?e, "Failed to reload CRM sheet");
                            break;
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            },
        };

        for frame in &frames {
            if !send_frame(&mut socket, frame).await {
                debug!("CRM live session closed by peer");
                return;
            }
        }
    }
    debug!("CRM live session ended");
}

pub type WriteResult = (FieldUpdate, Result<(), String>);

/// Persist a staged edit in the background and report its result on `done`.
pub fn spawn_write<B>(backend: B, update: FieldUpdate, done: mpsc::UnboundedSender<WriteResult>)
where
    B: CrmBackend + 'static,
{
    tokio::spawn(async move {
        let result = write_update(&backend, &update).await;
        // The session may be gone; the write itself still happened.
        let _ = done.send((update, result));
    });
}

fn snapshot<B: CrmBackend>(session: &CrmGridSession<B>) -> ServerFrame {
    let grid = session.grid();
    ServerFrame::Snapshot {
        sheet_id: grid.sheet_id(),
        rows: grid.rows().to_vec(),
    }
}

fn editing_frame<B: CrmBackend>(session: &CrmGridSession<B>) -> ServerFrame {
    ServerFrame::Editing {
        cell: session.grid().editing().cloned(),
    }
}

fn row_frame<B: CrmBackend>(session: &CrmGridSession<B>, client_id: Uuid) -> Option<ServerFrame> {
    session
        .grid()
        .row(client_id)
        .cloned()
        .map(|row| ServerFrame::RowUpserted { row })
}

fn cell_frame<B: CrmBackend>(
    session: &CrmGridSession<B>,
    client_id: Uuid,
    field: ClientField,
) -> ServerFrame {
    ServerFrame::Cell {
        client_id,
        field,
        state: session.grid().cell_state(client_id, field).cloned(),
    }
}

/// What one browser frame produced.
#[derive(Debug, Default)]
pub struct Handled {
    /// Frames to send right away.
    pub frames: Vec<ServerFrame>,
    /// An edit applied to the cache whose backend write is still to run.
    pub write: Option<FieldUpdate>,
}

impl Handled {
    fn reply(frames: Vec<ServerFrame>) -> Self {
        Self {
            frames,
            write: None,
        }
    }
}

/// Apply one browser frame. Saves are staged optimistically: the updated row
/// and its `pending` cell are returned at once and the write is left to the
/// caller.
pub fn handle_client_frame<B: CrmBackend>(session: &mut CrmGridSession<B>, text: &str) -> Handled {
    let frame: ClientFrame = match parse_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Handled::reply(vec![ServerFrame::Error {
                message: format!("Invalid message: {}", e.summary),
            }]);
        }
    };

    let result: Result<Handled, GridError> = match frame {
        ClientFrame::BeginEdit { client_id, field } => session
            .begin_edit(client_id, field)
            .map(|()| Handled::reply(vec![editing_frame(session)])),
        ClientFrame::Input { value } => session
            .input(value)
            .map(|()| Handled::reply(vec![editing_frame(session)])),
        ClientFrame::Cancel => {
            session.cancel();
            Ok(Handled::reply(vec![editing_frame(session)]))
        }
        ClientFrame::Select { value } => session
            .stage_select(&value)
            .map(|update| staged(session, Some(update))),
        ClientFrame::ChangeDate { value } => session
            .stage_change_date(&value)
            .map(|update| staged(session, Some(update))),
        ClientFrame::Commit => session.stage_commit().map(|update| staged(session, update)),
        ClientFrame::Revert { client_id, field } => session.revert(client_id, field).map(|_| {
            let mut frames: Vec<ServerFrame> = row_frame(session, client_id).into_iter().collect();
            frames.push(cell_frame(session, client_id, field));
            Handled::reply(frames)
        }),
    };

    result.unwrap_or_else(|e| {
        Handled::reply(vec![ServerFrame::Error {
            message: e.to_string(),
        }])
    })
}

fn staged<B: CrmBackend>(session: &CrmGridSession<B>, update: Option<FieldUpdate>) -> Handled {
    let mut frames = Vec::with_capacity(3);
    if let Some(update) = &update {
        frames.extend(row_frame(session, update.client_id));
        frames.push(cell_frame(session, update.client_id, update.field));
    }
    frames.push(editing_frame(session));
    Handled {
        frames,
        write: update,
    }
}

/// Settle a cell once its write finished. Results for superseded edits are dropped.
pub fn resolved_frames<B: CrmBackend>(
    session: &mut CrmGridSession<B>,
    update: &FieldUpdate,
    result: Result<(), String>,
) -> Vec<ServerFrame> {
    session
        .resolve(update, result)
        .map(|state| ServerFrame::Cell {
            client_id: update.client_id,
            field: update.field,
            state: Some(state),
        })
        .into_iter()
        .collect()
}

/// Merge a feed event and describe its effect, if any.
pub fn change_frames<B: CrmBackend>(
    session: &mut CrmGridSession<B>,
    event: ChangeEvent,
) -> Vec<ServerFrame> {
    let was_editing = session.grid().editing().map(|c| c.client_id);
    match session.apply_change(event) {
        GridChange::Upserted(id) => row_frame(session, id).into_iter().collect(),
        GridChange::Removed(id) => {
            let mut frames = vec![ServerFrame::RowRemoved { id }];
            if was_editing == Some(id) {
                frames.push(editing_frame(session));
            }
            frames
        }
        GridChange::Ignored => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::grid::CellStatus;
    use crate::crm::tests::client;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Backend {
        rows: Vec<CrmClient>,
        fail: bool,
        /// When set, writes wait for a permit before landing.
        gate: Option<Notify>,
        writes: Mutex<Vec<(Uuid, ClientField, Option<String>)>>,
    }

    #[async_trait]
    impl CrmBackend for Backend {
        async fn list_clients(&self, _sheet_id: Uuid) -> anyhow::Result<Vec<CrmClient>> {
            Ok(self.rows.clone())
        }

        async fn update_field(
            &self,
            client_id: Uuid,
            field: ClientField,
            value: Option<String>,
        ) -> anyhow::Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                anyhow::bail!("database unavailable");
            }
            self.writes.lock().unwrap().push((client_id, field, value));
            Ok(())
        }
    }

    async fn session_with(backend: Backend) -> (CrmGridSession<Arc<Backend>>, Uuid, Uuid) {
        let sheet = Uuid::new_v4();
        let row = client("Ravi Kumar", sheet);
        let id = row.id;
        let backend = Arc::new(Backend {
            rows: vec![row],
            ..backend
        });
        (CrmGridSession::open(backend, sheet).await.unwrap(), sheet, id)
    }

    async fn session(fail: bool) -> (CrmGridSession<Arc<Backend>>, Uuid, Uuid) {
        session_with(Backend {
            fail,
            ..Default::default()
        })
        .await
    }

    fn frame(value: serde_json::Value) -> String {
        value.to_string()
    }

    fn begin<B: CrmBackend>(s: &mut CrmGridSession<B>, id: Uuid, field: &str) {
        handle_client_frame(
            s,
            &frame(json!({"type": "begin_edit", "client_id": id, "field": field})),
        );
    }

    fn cell_status(frame: &ServerFrame) -> Option<CellStatus> {
        match frame {
            ServerFrame::Cell {
                state: Some(state), ..
            } => Some(state.status),
            _ => None,
        }
    }

    #[test]
    fn client_frames_parse() {
        let id = Uuid::new_v4();
        let parsed: ClientFrame = parse_json(&frame(
            json!({"type": "begin_edit", "client_id": id, "field": "lead_type"}),
        ))
        .unwrap();
        assert_eq!(
            parsed,
            ClientFrame::BeginEdit {
                client_id: id,
                field: ClientField::LeadType
            }
        );
        let commit: ClientFrame = parse_json(r#"{"type":"commit"}"#).unwrap();
        assert_eq!(commit, ClientFrame::Commit);
    }

    #[tokio::test]
    async fn select_is_shown_pending_then_synced() {
        let (mut s, _, id) = session(false).await;
        begin(&mut s, id, "lead_type");
        let handled = handle_client_frame(&mut s, &frame(json!({"type": "select", "value": "hot"})));

        assert!(matches!(&handled.frames[0], ServerFrame::RowUpserted { row } if row.lead_type.as_str() == "hot"));
        assert_eq!(cell_status(&handled.frames[1]), Some(CellStatus::Pending));
        assert!(matches!(&handled.frames[2], ServerFrame::Editing { cell: None }));

        let update = handled.write.unwrap();
        let result = write_update(s.backend(), &update).await;
        let frames = resolved_frames(&mut s, &update, result);
        assert_eq!(frames.len(), 1);
        assert_eq!(cell_status(&frames[0]), Some(CellStatus::Synced));
        assert_eq!(s.backend().writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slow_write_does_not_hold_back_the_edit_or_the_feed() {
        let (mut s, sheet, id) = session_with(Backend {
            gate: Some(Notify::new()),
            ..Default::default()
        })
        .await;
        let (done_tx, mut done) = mpsc::unbounded_channel();

        begin(&mut s, id, "deal_status");
        let handled = handle_client_frame(&mut s, &frame(json!({"type": "select", "value": "locked"})));
        assert_eq!(cell_status(&handled.frames[1]), Some(CellStatus::Pending));
        spawn_write(Arc::clone(s.backend()), handled.write.unwrap(), done_tx);

        // The write is parked; the edit is already visible and the feed still merges.
        assert_eq!(s.grid().row(id).unwrap().deal_status.as_str(), "locked");
        let newcomer = client("Meera Iyer", sheet);
        let frames = change_frames(&mut s, ChangeEvent::Insert { row: newcomer });
        assert_eq!(frames.len(), 1);
        assert!(done.try_recv().is_err());
        assert!(s.backend().writes.lock().unwrap().is_empty());

        s.backend().gate.as_ref().unwrap().notify_one();
        let (update, result) = done.recv().await.unwrap();
        let frames = resolved_frames(&mut s, &update, result);
        assert_eq!(cell_status(&frames[0]), Some(CellStatus::Synced));
    }

    #[tokio::test]
    async fn failed_save_is_reported_and_revertible() {
        let (mut s, _, id) = session(true).await;
        begin(&mut s, id, "calling_comment");
        handle_client_frame(&mut s, &frame(json!({"type": "input", "value": "call at 5"})));
        let handled = handle_client_frame(&mut s, r#"{"type":"commit"}"#);
        assert_eq!(cell_status(&handled.frames[1]), Some(CellStatus::Pending));

        let update = handled.write.unwrap();
        let result = write_update(s.backend(), &update).await;
        let frames = resolved_frames(&mut s, &update, result);
        assert_eq!(cell_status(&frames[0]), Some(CellStatus::Failed));

        let handled = handle_client_frame(
            &mut s,
            &frame(json!({"type": "revert", "client_id": id, "field": "calling_comment"})),
        );
        assert!(handled.write.is_none());
        assert!(matches!(&handled.frames[0], ServerFrame::RowUpserted { row } if row.calling_comment.is_none()));
        assert!(matches!(&handled.frames[1], ServerFrame::Cell { state: None, .. }));
    }

    #[tokio::test]
    async fn superseded_write_results_are_dropped() {
        let (mut s, _, id) = session(false).await;
        begin(&mut s, id, "lead_type");
        let first = handle_client_frame(&mut s, &frame(json!({"type": "select", "value": "hot"})))
            .write
            .unwrap();
        begin(&mut s, id, "lead_type");
        let second = handle_client_frame(&mut s, &frame(json!({"type": "select", "value": "cold"})))
            .write
            .unwrap();

        assert!(resolved_frames(&mut s, &first, Ok(())).is_empty());
        let frames = resolved_frames(&mut s, &second, Ok(()));
        assert_eq!(cell_status(&frames[0]), Some(CellStatus::Synced));
        assert_eq!(s.grid().row(id).unwrap().lead_type.as_str(), "cold");
    }

    #[tokio::test]
    async fn unchanged_commit_stages_nothing() {
        let (mut s, _, id) = session(false).await;
        begin(&mut s, id, "admin_notes");
        let handled = handle_client_frame(&mut s, r#"{"type":"commit"}"#);
        assert!(handled.write.is_none());
        assert_eq!(handled.frames.len(), 1);
        assert!(matches!(&handled.frames[0], ServerFrame::Editing { cell: None }));
    }

    #[tokio::test]
    async fn bad_frames_become_error_frames() {
        let (mut s, _, _) = session(false).await;
        let handled = handle_client_frame(&mut s, "not json");
        assert!(matches!(&handled.frames[0], ServerFrame::Error { .. }));

        let handled = handle_client_frame(&mut s, r#"{"type":"commit"}"#);
        assert!(matches!(&handled.frames[0], ServerFrame::Error { message } if message == "no cell is being edited"));
        assert!(handled.write.is_none());
    }

    #[tokio::test]
    async fn feed_events_for_other_sheets_are_silent() {
        let (mut s, sheet, id) = session(false).await;
        let other = client("Elsewhere", Uuid::new_v4());
        assert!(change_frames(&mut s, ChangeEvent::Insert { row: other }).is_empty());

        let frames = change_frames(&mut s, ChangeEvent::Delete { id, sheet_id: Some(sheet) });
        assert!(matches!(&frames[0], ServerFrame::RowRemoved { id: removed } if *removed == id));
    }

    #[tokio::test]
    async fn removing_the_edited_row_ends_the_edit() {
        let (mut s, sheet, id) = session(false).await;
        begin(&mut s, id, "admin_notes");
        let frames = change_frames(&mut s, ChangeEvent::Delete { id, sheet_id: Some(sheet) });
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[1], ServerFrame::Editing { cell: None }));
    }
}
