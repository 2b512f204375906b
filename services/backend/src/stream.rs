//! Real-time event distribution.
//!
//! A single task owns one dedicated connection listening on the
//! `new_event` channel (published by the insert trigger) and fans each
//! notification out on a process-wide broadcast channel. Every SSE
//! connection runs its own producer task: connection marker, stored
//! backfill from `lastEventId`, then live notifications filtered by
//! table; delivery is best-effort and a closed client just drops the
//! producer.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Deserialize;
use sqlx::postgres::PgListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::events::{self, EventRow};
use crate::tables;
use crate::AppState;

/// Payload published by the events insert trigger.
#[derive(Clone, Debug, Deserialize)]
pub struct EventNotice {
    #[serde(rename = "eventId")]
    pub event_id: i64,
    #[serde(rename = "tableId")]
    pub table_id: Option<i64>,
    pub kind: String,
}

const BACKFILL_LIMIT: i64 = 100;
const HEARTBEAT: Duration = Duration::from_secs(30);

pub fn spawn_listener(state: AppState) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = listen_loop(&state).await {
                tracing::error!("event listener lost: {:#}; reconnecting", e);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });
}

async fn listen_loop(state: &AppState) -> anyhow::Result<()> {
    let mut listener = PgListener::connect_with(&state.pool).await?;
    listener.listen("new_event").await?;
    tracing::info!("event distributor listening on new_event");

    loop {
        let notification = listener.recv().await?;
        match serde_json::from_str::<EventNotice>(notification.payload()) {
            // No receivers is fine; send only fails when nobody listens
            Ok(notice) => {
                let _ = state.notices.send(notice);
            }
            Err(e) => tracing::warn!("undecodable new_event payload: {}", e),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "lastEventId")]
    pub last_event_id: Option<i64>,
}

fn sse_frame(row: &EventRow) -> Event {
    Event::default()
        .id(row.event_id.to_string())
        .data(row.payload_json.clone())
}

/// GET /api/tables/:tableId/events — resumable per-table stream.
pub async fn table_events(
    State(state): State<AppState>,
    Path(table_id): Path<i64>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    tables::get(&state.pool, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(64);
    let mut notices = state.notices.subscribe();
    let pool = state.pool.clone();
    let last_event_id = query.last_event_id.unwrap_or(0);

    tokio::spawn(async move {
        let mut last_sent = last_event_id;

        if tx
            .send(Ok(Event::default().event("connected").data("{}")))
            .await
            .is_err()
        {
            return;
        }

        if last_sent > 0 {
            match events::by_table_since(&pool, table_id, last_sent, BACKFILL_LIMIT).await {
                Ok(rows) => {
                    for row in rows {
                        last_sent = row.event_id;
                        if tx.send(Ok(sse_frame(&row))).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("sse backfill failed for table {}: {}", table_id, e);
                    return;
                }
            }
        }

        loop {
            let notice = match notices.recv().await {
                Ok(n) => n,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "sse subscriber for table {} lagged by {} notifications",
                        table_id,
                        skipped
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            };
            if notice.table_id != Some(table_id) || notice.event_id <= last_sent {
                continue;
            }
            match events::by_id(&pool, notice.event_id).await {
                Ok(Some(row)) => {
                    last_sent = row.event_id;
                    if tx.send(Ok(sse_frame(&row))).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("sse event load failed: {}", e),
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(HEARTBEAT).text("heartbeat")))
}
