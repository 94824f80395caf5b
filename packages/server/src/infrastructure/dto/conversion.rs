//! Conversion logic between domain entities and DTOs.

use clipcast_shared::time::timestamp_to_rfc3339;

use crate::domain::{BroadcastResult, DeliveryFailure, StatusSnapshot, Timestamp};

use super::http::{BroadcastResultDto, FailedDeliveryDto, ServerStatusDto};

// ========================================
// Domain Entity → DTO
// ========================================

impl From<DeliveryFailure> for FailedDeliveryDto {
    fn from(model: DeliveryFailure) -> Self {
        Self {
            peer_id: model.peer_id.to_string(),
            reason: model.reason,
        }
    }
}

impl From<BroadcastResult> for BroadcastResultDto {
    fn from(model: BroadcastResult) -> Self {
        Self {
            succeeded: model.succeeded.iter().map(ToString::to_string).collect(),
            failed: model.failed.into_iter().map(Into::into).collect(),
        }
    }
}

impl ServerStatusDto {
    /// Build the boundary view of a snapshot; uptime is measured against `now`.
    pub fn from_snapshot(snapshot: StatusSnapshot, now: Timestamp) -> Self {
        Self {
            state: snapshot.state,
            peer_count: snapshot.peer_count,
            uptime_ms: snapshot.uptime_millis(now),
            started_at: snapshot
                .started_at
                .and_then(|started| timestamp_to_rfc3339(started.value())),
            listen_addr: snapshot.listen_addr.map(|addr| addr.to_string()),
            fault: snapshot.fault.map(|fault| fault.to_string()),
        }
    }
}
