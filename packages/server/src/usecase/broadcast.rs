//! UseCase: ブロードキャスト配送
//!
//! Delivers one payload to every peer of a registry snapshot. Peers are
//! independent: one failed write is recorded and the rest still get the
//! message ("fail-independent fan-out").

use std::time::Duration;

use clipcast_shared::protocol::BroadcastPayload;
use futures_util::future::join_all;

use crate::domain::{
    BroadcastError, BroadcastResult, DeliveryFailure, PeerConnection, TransportError,
};

/// メッセージ配送のユースケース
///
/// Fan-out of one message to a snapshot of peers.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastChannel {
    /// 1 メッセージの最大バイト数（エンコード前の data 部分）
    max_message_bytes: usize,
    /// 1 ピアあたりの配送時間の上限（トランスポートの実装によらない）
    delivery_timeout: Duration,
}

impl BroadcastChannel {
    pub fn new(max_message_bytes: usize, delivery_timeout: Duration) -> Self {
        Self {
            max_message_bytes,
            delivery_timeout,
        }
    }

    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Reject messages over the configured maximum. Empty messages are fine.
    pub fn validate(&self, message: &[u8]) -> Result<(), BroadcastError> {
        if message.len() > self.max_message_bytes {
            return Err(BroadcastError::MessageTooLarge {
                size: message.len(),
                max: self.max_message_bytes,
            });
        }
        Ok(())
    }

    /// Deliver `payload` to every peer in `peers`.
    ///
    /// The size limit applies to the payload data; every peer receives the
    /// same encoded line. Deliveries start in snapshot order and run
    /// concurrently; the result lists successes and failures in snapshot
    /// order. Peers whose delivery failed are marked dead.
    ///
    /// # Errors
    ///
    /// `BroadcastError::MessageTooLarge` or `BroadcastError::Encoding` before
    /// any delivery is attempted.
    pub async fn deliver(
        &self,
        peers: &[PeerConnection],
        payload: &BroadcastPayload,
    ) -> Result<BroadcastResult, BroadcastError> {
        self.validate(payload.data().as_bytes())?;
        let encoded = payload
            .encode()
            .map_err(|e| BroadcastError::Encoding(e.to_string()))?;
        let message = encoded.as_slice();

        let outcomes = join_all(peers.iter().map(|peer| async move {
            let outcome =
                tokio::time::timeout(self.delivery_timeout, peer.transport().send(message))
                    .await
                    .unwrap_or(Err(TransportError::Timeout));
            (peer, outcome)
        }))
        .await;

        let mut result = BroadcastResult::default();
        for (peer, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    tracing::debug!("Broadcasted message to peer '{}'", peer.id);
                    result.succeeded.push(peer.id);
                }
                Err(e) => {
                    tracing::warn!("Failed to deliver message to peer '{}': {}", peer.id, e);
                    peer.mark_dead();
                    result.failed.push(DeliveryFailure {
                        peer_id: peer.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }
}
