//! Background tickers: action-timeout auto-fold and delayed hand
//! start. Both run every ~1.5 s and treat races as no-ops.

use std::time::Duration;

use crate::error::ApiError;
use crate::game;
use crate::AppState;

const TICK: Duration = Duration::from_millis(1500);

pub fn spawn(state: AppState) {
    let timeouts = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            if let Err(e) = tick_action_timeouts(&timeouts).await {
                tracing::error!("action-timeout tick failed: {}", e);
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        loop {
            interval.tick().await;
            if let Err(e) = tick_hand_starts(&state).await {
                tracing::error!("hand-start tick failed: {}", e);
            }
        }
    });
}

/// Fold every seat whose action window has lapsed.
async fn tick_action_timeouts(state: &AppState) -> Result<(), ApiError> {
    let hand_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM hands \
         WHERE status <> 'COMPLETED' AND current_action_seat IS NOT NULL \
           AND action_timeout_at IS NOT NULL AND action_timeout_at <= now()",
    )
    .fetch_all(&state.pool)
    .await?;

    for hand_id in hand_ids {
        match game::fold_for_timeout(state, hand_id).await {
            Ok(_) => {}
            Err(ApiError::Conflict(msg)) => {
                // The action landed first; disarm the stale timer
                tracing::warn!("timeout fold raced on hand {}: {}", hand_id, msg);
                sqlx::query("UPDATE hands SET action_timeout_at = NULL WHERE id = $1")
                    .bind(hand_id)
                    .execute(&state.pool)
                    .await?;
            }
            Err(e) => tracing::error!("timeout fold failed on hand {}: {}", hand_id, e),
        }
    }
    Ok(())
}

/// Start the next hand on tables past their inter-hand delay.
async fn tick_hand_starts(state: &AppState) -> Result<(), ApiError> {
    let table_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT t.id FROM poker_tables t \
         WHERE t.is_active \
           AND NOT EXISTS(SELECT 1 FROM hands h \
                 WHERE h.table_id = t.id AND h.status <> 'COMPLETED') \
           AND (SELECT count(*) FROM table_seat_sessions s \
                 WHERE s.table_id = t.id AND s.is_active \
                   AND s.table_balance_gwei >= t.big_blind) >= 2 \
           AND COALESCE((SELECT max(h.completed_at) FROM hands h \
                 WHERE h.table_id = t.id AND h.status = 'COMPLETED') \
               + make_interval(secs => t.hand_start_delay_seconds::double precision), now()) \
               <= now()",
    )
    .fetch_all(&state.pool)
    .await?;

    for table_id in table_ids {
        if let Err(e) = game::maybe_start_hand(state, table_id).await {
            tracing::error!("scheduled hand start failed on table {}: {}", table_id, e);
        }
    }
    Ok(())
}
