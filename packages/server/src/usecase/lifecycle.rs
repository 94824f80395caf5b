//! UseCase: サーバーのライフサイクル管理
//!
//! `ServerLifecycle` owns the server state, the credential of the current run
//! and the registry of admitted peers, and is the only place that changes
//! them. With a clipboard attached, every run also gets a clipboard monitor
//! that broadcasts through the same fan-out as `broadcast`.
//!
//! ## Locking
//!
//! - `transitions` serializes `start` and `stop` end to end, including the
//!   bind and the bounded drain.
//! - `core` guards state, credential and registry together. It is never held
//!   across network I/O, so `status` never waits on a bind or a slow peer.
//!
//! ## Cancellation
//!
//! `start` and `stop` must run to completion to leave the state consistent.
//! Callers that may drop the future run them on their own task, as
//! `ControlFacade` does.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use clipcast_shared::{
    protocol::BroadcastPayload,
    time::{Clock, SystemClock},
};
use futures_util::future::join_all;
use tokio::{
    net::TcpListener,
    sync::{Mutex, watch},
    task::JoinHandle,
};

use crate::{
    config::LifecycleConfig,
    domain::{
        BroadcastError, BroadcastResult, ClipboardSource, Credential, Fault, PeerConnection,
        PeerId, PeerTransport, RegistryError, ServerState, StartError, StatusSnapshot, StopError,
        Timestamp,
    },
    infrastructure::{
        ConnectionRegistry,
        listener::{PeerGate, PeerSettings, run_listener},
    },
};

use super::{broadcast::BroadcastChannel, clipboard::ClipboardMonitor};

/// サーバーのライフサイクル管理のユースケース
///
/// State machine of the local broadcast server.
pub struct ServerLifecycle {
    /// 設定
    config: LifecycleConfig,
    /// 配送（broadcast とクリップボード監視で共有）
    publisher: Publisher,
    /// 時刻の取得元
    clock: Arc<dyn Clock>,
    /// start / stop の直列化
    transitions: Mutex<()>,
    /// 状態・パスワード・レジストリ
    core: Arc<Mutex<Core>>,
    /// クリップボード（任意）
    clipboard: Option<Arc<dyn ClipboardSource>>,
}

/// Everything guarded by the core lock.
struct Core {
    state: ServerState,
    fault: Option<Fault>,
    /// Set while `Starting` or `Running`.
    credential: Option<Arc<Credential>>,
    /// Non-empty only while `Running`.
    registry: ConnectionRegistry,
    started_at: Option<Timestamp>,
    listen_addr: Option<SocketAddr>,
    /// Incremented on every start, so tasks of an old run cannot touch a new one.
    generation: u64,
    run: Option<RunHandle>,
}

/// Tasks of one run.
struct RunHandle {
    shutdown: watch::Sender<bool>,
    /// Peer listener.
    task: JoinHandle<()>,
    /// Clipboard monitor, when a clipboard is attached.
    monitor: Option<JoinHandle<()>>,
}

/// Fan-out to the peers of a run.
#[derive(Clone)]
struct Publisher {
    core: Arc<Mutex<Core>>,
    channel: BroadcastChannel,
    /// Bound for closing peers evicted after a failed delivery.
    close_timeout: Duration,
}

impl ServerLifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: LifecycleConfig, clock: Arc<dyn Clock>) -> Self {
        let core = Arc::new(Mutex::new(Core::new()));
        let publisher = Publisher {
            core: Arc::clone(&core),
            channel: BroadcastChannel::new(config.max_message_bytes, config.write_timeout),
            close_timeout: config.write_timeout,
        };
        Self {
            config,
            publisher,
            clock,
            transitions: Mutex::new(()),
            core,
            clipboard: None,
        }
    }

    /// Broadcast `source` whenever it changes while the server runs.
    pub fn with_clipboard(mut self, source: Arc<dyn ClipboardSource>) -> Self {
        self.clipboard = Some(source);
        self
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start the server: bind the peer listener and begin admitting peers.
    ///
    /// # Errors
    ///
    /// - `StartError::AlreadyActive` if the server is starting or running, or
    ///   faulted at runtime and not stopped since. Nothing changes.
    /// - `StartError::BindFailed` if the peer address cannot be bound. The
    ///   server is then `Faulted` and `start` may be called again.
    pub async fn start(&self, password: impl Into<String>) -> Result<(), StartError> {
        let _transition = self.transitions.lock().await;

        let credential = Arc::new(Credential::new(password));
        let generation = {
            let mut core = self.core.lock().await;
            let restartable = match core.state {
                ServerState::Idle => true,
                ServerState::Faulted => core.fault.as_ref().is_some_and(Fault::allows_restart),
                _ => false,
            };
            if !restartable {
                tracing::warn!("Start rejected: server is {}", core.state);
                return Err(StartError::AlreadyActive);
            }
            core.generation += 1;
            core.state = ServerState::Starting;
            core.fault = None;
            core.credential = Some(Arc::clone(&credential));
            core.generation
        };
        tracing::info!("Starting server on {}", self.config.peer_addr);

        let bound = TcpListener::bind(self.config.peer_addr)
            .await
            .and_then(|listener| listener.local_addr().map(|addr| (listener, addr)));
        let (listener, listen_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                let reason = format!("{}: {}", self.config.peer_addr, e);
                tracing::error!("Failed to bind peer listener on {}", reason);
                let mut core = self.core.lock().await;
                core.state = ServerState::Faulted;
                core.fault = Some(Fault::Bind(reason.clone()));
                core.credential = None;
                return Err(StartError::BindFailed(reason));
            }
        };

        let gate = Arc::new(RunGate {
            core: Arc::clone(&self.core),
            generation,
            credential,
            clock: Arc::clone(&self.clock),
        });
        let settings = PeerSettings {
            admit_timeout: self.config.admit_timeout,
            write_timeout: self.config.write_timeout,
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor_shutdown = shutdown_rx.clone();

        // The listener is spawned under the core lock, so no peer can be
        // admitted before the state says Running.
        let mut core = self.core.lock().await;
        let supervised_core = Arc::clone(&self.core);
        let close_timeout = self.config.shutdown_timeout;
        let task = tokio::spawn(async move {
            if let Err(e) = run_listener(listener, gate, settings, shutdown_rx).await {
                tracing::error!("Peer listener failed: {}", e);
                let peers = supervised_core
                    .lock()
                    .await
                    .fault_transport(generation, e.to_string());
                close_peers(peers, close_timeout).await;
            }
        });
        let monitor = self.clipboard.as_ref().map(|source| {
            let interval = self.config.clipboard_interval;
            let monitor = ClipboardMonitor::new(Arc::clone(source), interval);
            let publisher = self.publisher.clone();
            tokio::spawn(monitor.run(monitor_shutdown, move |payload| {
                let publisher = publisher.clone();
                async move { publisher.publish(Some(generation), &payload).await }
            }))
        });
        core.state = ServerState::Running;
        core.started_at = Some(Timestamp::new(self.clock.now_millis()));
        core.listen_addr = Some(listen_addr);
        core.run = Some(RunHandle {
            shutdown: shutdown_tx,
            task,
            monitor,
        });
        tracing::info!("Server running, peers connect to {}", listen_addr);

        Ok(())
    }

    /// Stop the server: close every peer, release the listener, forget the
    /// credential and return to `Idle`.
    ///
    /// Peers that do not close within the shutdown timeout are dropped, so
    /// this finishes in bounded time.
    ///
    /// # Errors
    ///
    /// `StopError::NotActive` if the server is already idle. Nothing changes.
    pub async fn stop(&self) -> Result<(), StopError> {
        let _transition = self.transitions.lock().await;

        let (run, peers) = {
            let mut core = self.core.lock().await;
            match core.state {
                ServerState::Starting | ServerState::Running | ServerState::Faulted => {}
                ServerState::Idle | ServerState::Stopping => {
                    tracing::debug!("Stop rejected: server is {}", core.state);
                    return Err(StopError::NotActive);
                }
            }
            core.state = ServerState::Stopping;
            core.credential = None;
            (core.run.take(), core.registry.drain())
        };
        tracing::info!("Stopping server, closing {} peers", peers.len());

        let timeout = self.config.shutdown_timeout;
        close_peers(peers, timeout).await;
        if let Some(run) = run {
            run.shutdown(timeout).await;
        }

        let mut core = self.core.lock().await;
        core.state = ServerState::Idle;
        core.fault = None;
        core.started_at = None;
        core.listen_addr = None;
        tracing::info!("Server stopped");

        Ok(())
    }

    /// Consistent point-in-time view of the server.
    pub async fn status(&self) -> StatusSnapshot {
        self.core.lock().await.snapshot()
    }

    /// Deliver `message` to every admitted peer as a text payload.
    ///
    /// The registry is copied under the core lock and written to outside of
    /// it. Peers whose delivery failed are removed and closed afterwards.
    ///
    /// # Errors
    ///
    /// - `BroadcastError::NotRunning` unless the server is running; no peer
    ///   receives anything.
    /// - `BroadcastError::MessageTooLarge` if the message exceeds the limit.
    pub async fn broadcast(&self, message: &[u8]) -> Result<BroadcastResult, BroadcastError> {
        self.publisher
            .publish(None, &BroadcastPayload::text(message))
            .await
    }

    /// Register a peer that is already connected by other means.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotAccepting` unless the server is running.
    pub async fn attach_peer(
        &self,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<PeerId, RegistryError> {
        let now = Timestamp::new(self.clock.now_millis());
        let mut core = self.core.lock().await;
        let generation = core.generation;
        core.admit(generation, transport, now)
    }

    /// Deregister a peer. Returns whether it was registered.
    pub async fn detach_peer(&self, peer_id: &PeerId) -> bool {
        self.core.lock().await.registry.deregister(peer_id).is_some()
    }
}

impl Drop for ServerLifecycle {
    fn drop(&mut self) {
        // Without an explicit stop, at least make sure the listener and its
        // peer tasks do not outlive the lifecycle.
        if let Ok(mut core) = self.core.try_lock()
            && let Some(run) = core.run.take()
        {
            run.abort();
        }
    }
}

impl Core {
    fn new() -> Self {
        Self {
            state: ServerState::Idle,
            fault: None,
            credential: None,
            registry: ConnectionRegistry::new(),
            started_at: None,
            listen_addr: None,
            generation: 0,
            run: None,
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            peer_count: self.registry.len(),
            started_at: self.started_at,
            listen_addr: self.listen_addr,
            fault: self.fault.clone(),
        }
    }

    fn accepting(&self, generation: u64) -> bool {
        self.generation == generation && self.state == ServerState::Running
    }

    fn admit(
        &mut self,
        generation: u64,
        transport: Arc<dyn PeerTransport>,
        now: Timestamp,
    ) -> Result<PeerId, RegistryError> {
        if !self.accepting(generation) {
            return Err(RegistryError::NotAccepting);
        }
        let peer = PeerConnection::new(PeerId::generate(), transport, now);
        let peer_id = peer.id;
        self.registry.register(peer)?;
        Ok(peer_id)
    }

    fn release(&mut self, generation: u64, peer_id: &PeerId) {
        if self.generation == generation {
            self.registry.deregister(peer_id);
        }
    }

    /// Remove failed peers, unless the run they belonged to is over.
    fn evict(&mut self, generation: u64, peer_ids: &[PeerId]) -> Vec<PeerConnection> {
        if !self.accepting(generation) {
            return Vec::new();
        }
        peer_ids
            .iter()
            .filter_map(|id| self.registry.deregister(id))
            .collect()
    }

    /// Running -> Faulted after the listener gave up. Returns the peers to close.
    fn fault_transport(&mut self, generation: u64, reason: String) -> Vec<PeerConnection> {
        if !self.accepting(generation) {
            return Vec::new();
        }
        self.state = ServerState::Faulted;
        self.fault = Some(Fault::Transport(reason));
        self.credential = None;
        self.started_at = None;
        self.listen_addr = None;
        // Runs on the listener task itself, so only the monitor is aborted.
        if let Some(monitor) = self.run.take().and_then(|run| run.monitor) {
            monitor.abort();
        }
        self.registry.drain()
    }
}

impl Publisher {
    /// Deliver `payload` to the peers of run `run`, or of the current run
    /// when `None`.
    async fn publish(
        &self,
        run: Option<u64>,
        payload: &BroadcastPayload,
    ) -> Result<BroadcastResult, BroadcastError> {
        let (generation, peers) = {
            let core = self.core.lock().await;
            let generation = run.unwrap_or(core.generation);
            if !core.accepting(generation) {
                return Err(BroadcastError::NotRunning);
            }
            (generation, core.registry.snapshot())
        };

        let result = self.channel.deliver(&peers, payload).await?;
        tracing::info!(
            "Broadcasted {} bytes of {}: {} delivered, {} failed",
            payload.data().len(),
            payload.kind(),
            result.succeeded.len(),
            result.failed.len()
        );

        if !result.failed.is_empty() {
            let evicted = self
                .core
                .lock()
                .await
                .evict(generation, &result.failed_ids());
            close_peers(evicted, self.close_timeout).await;
        }

        Ok(result)
    }
}

impl RunHandle {
    /// Signal the listener, wait up to `timeout`, then abort it. The
    /// clipboard monitor is aborted right away.
    async fn shutdown(self, timeout: Duration) {
        let _ = self.shutdown.send(true);
        if let Some(monitor) = self.monitor {
            monitor.abort();
        }
        let mut task = self.task;
        if tokio::time::timeout(timeout, &mut task).await.is_err() {
            tracing::warn!("Listener did not stop within {:?}, aborting it", timeout);
            task.abort();
            let _ = task.await;
        }
    }

    fn abort(&self) {
        self.task.abort();
        if let Some(monitor) = &self.monitor {
            monitor.abort();
        }
    }
}

/// Close peers concurrently, giving up after `timeout`.
async fn close_peers(peers: Vec<PeerConnection>, timeout: Duration) {
    if peers.is_empty() {
        return;
    }
    let closing = join_all(peers.iter().map(|peer| async move {
        peer.mark_dead();
        peer.transport().close().await;
    }));
    if tokio::time::timeout(timeout, closing).await.is_err() {
        tracing::warn!(
            "Closing {} peers took longer than {:?}, dropping them",
            peers.len(),
            timeout
        );
    }
}

/// `PeerGate` of one run, handed to the listener.
struct RunGate {
    core: Arc<Mutex<Core>>,
    /// この実行の世代番号
    generation: u64,
    /// この実行のパスワード
    credential: Arc<Credential>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl PeerGate for RunGate {
    fn verify(&self, password: &str) -> bool {
        self.credential.verify(password)
    }

    async fn admit(&self, transport: Arc<dyn PeerTransport>) -> Result<PeerId, RegistryError> {
        let now = Timestamp::new(self.clock.now_millis());
        self.core
            .lock()
            .await
            .admit(self.generation, transport, now)
    }

    async fn release(&self, peer_id: PeerId) {
        self.core.lock().await.release(self.generation, &peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MockPeerTransport, TransportError},
        usecase::clipboard::testing::FakeClipboard,
    };
    use clipcast_shared::time::FixedClock;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - start / stop / status / broadcast の状態遷移と事前条件
    // - 状態とレジストリの不変条件（Running のときのみピアが存在する）
    // - 部分失敗時のブロードキャスト結果と失敗ピアの除外
    // - bind 失敗からの再試行、応答しないピアがいても停止が有限時間で終わること
    // - クリップボード監視が Running の間だけ動くこと
    //
    // ピアは attach_peer でモックを直接登録する（TCP 経由のテストは tests/ 配下）
    // ========================================

    const STARTED_AT: i64 = 1_700_000_000_000;

    fn test_config() -> LifecycleConfig {
        LifecycleConfig {
            peer_addr: "127.0.0.1:0".parse().unwrap(),
            max_message_bytes: 64,
            admit_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_millis(200),
            shutdown_timeout: Duration::from_millis(200),
            clipboard_interval: Duration::from_millis(10),
        }
    }

    fn create_test_lifecycle() -> ServerLifecycle {
        ServerLifecycle::with_clock(test_config(), Arc::new(FixedClock::new(STARTED_AT)))
    }

    fn quiet_transport() -> MockPeerTransport {
        let mut transport = MockPeerTransport::new();
        transport.expect_send().returning(|_| Ok(()));
        transport.expect_close().returning(|| ());
        transport
    }

    fn failing_transport() -> MockPeerTransport {
        let mut transport = MockPeerTransport::new();
        transport
            .expect_send()
            .returning(|_| Err(TransportError::Io("connection reset".to_string())));
        transport.expect_close().times(1).returning(|| ());
        transport
    }

    /// Transport that keeps every message it was sent.
    #[derive(Default)]
    struct RecordingTransport {
        sent: std::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingTransport {
        fn received(&self) -> Vec<BroadcastPayload> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|message| {
                    BroadcastPayload::decode(std::str::from_utf8(message).unwrap()).unwrap()
                })
                .collect()
        }
    }

    #[async_trait]
    impl PeerTransport for RecordingTransport {
        async fn send(&self, message: &[u8]) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(message.to_vec());
            Ok(())
        }

        async fn close(&self) {}
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    /// Transport that never finishes closing.
    struct UnresponsiveTransport;

    #[async_trait]
    impl PeerTransport for UnresponsiveTransport {
        async fn send(&self, _message: &[u8]) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn close(&self) {
            std::future::pending::<()>().await
        }
    }

    #[tokio::test]
    async fn test_start_transitions_to_running() {
        // テスト項目: start で Running になり、起動時刻とアドレスが記録される
        // given (前提条件):
        let lifecycle = create_test_lifecycle();

        // when (操作):
        let result = lifecycle.start("321").await;

        // then (期待する結果):
        assert_eq!(result, Ok(()));
        let status = lifecycle.status().await;
        assert_eq!(status.state, ServerState::Running);
        assert_eq!(status.peer_count, 0);
        assert_eq!(status.started_at, Some(Timestamp::new(STARTED_AT)));
        assert!(status.listen_addr.is_some_and(|addr| addr.port() != 0));
        assert!(status.fault.is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected_and_keeps_peers() {
        // テスト項目: 2 回目の start は AlreadyActive となり、既存のピアに影響しない
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        let peer_id = lifecycle
            .attach_peer(Arc::new(quiet_transport()))
            .await
            .unwrap();
        let before = lifecycle.status().await;

        // when (操作):
        let result = lifecycle.start("other").await;

        // then (期待する結果):
        assert_eq!(result, Err(StartError::AlreadyActive));
        let after = lifecycle.status().await;
        assert_eq!(after, before);
        assert!(lifecycle.detach_peer(&peer_id).await);
    }

    #[tokio::test]
    async fn test_stop_on_idle_is_rejected_every_time() {
        // テスト項目: Idle での stop は何度呼んでも NotActive で、状態は変わらない
        // given (前提条件):
        let lifecycle = create_test_lifecycle();

        // when (操作) / then (期待する結果):
        for _ in 0..3 {
            assert_eq!(lifecycle.stop().await, Err(StopError::NotActive));
            assert_eq!(lifecycle.status().await, StatusSnapshot::idle());
        }
    }

    #[tokio::test]
    async fn test_stop_closes_peers_and_returns_to_idle() {
        // テスト項目: stop で全ピアが close され、Idle に戻り、レジストリが空になる
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        for _ in 0..2 {
            let mut transport = MockPeerTransport::new();
            transport.expect_send().never();
            transport.expect_close().times(1).returning(|| ());
            lifecycle.attach_peer(Arc::new(transport)).await.unwrap();
        }
        assert_eq!(lifecycle.status().await.peer_count, 2);

        // when (操作):
        let result = lifecycle.stop().await;

        // then (期待する結果):
        assert_eq!(result, Ok(()));
        assert_eq!(lifecycle.status().await, StatusSnapshot::idle());
    }

    #[tokio::test]
    async fn test_broadcast_when_idle_is_rejected_without_delivery() {
        // テスト項目: 停止後の broadcast は NotRunning となり、どのピアにも配送されない
        // given (前提条件): send が呼ばれるとモックの期待値違反になる
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        let mut transport = MockPeerTransport::new();
        transport.expect_send().never();
        transport.expect_close().returning(|| ());
        lifecycle.attach_peer(Arc::new(transport)).await.unwrap();
        lifecycle.stop().await.unwrap();

        // when (操作):
        let result = lifecycle.broadcast(b"hello").await;

        // then (期待する結果):
        assert_eq!(result, Err(BroadcastError::NotRunning));
        assert_eq!(lifecycle.status().await.peer_count, 0);
    }

    #[tokio::test]
    async fn test_broadcast_partial_failure_evicts_failed_peer() {
        // テスト項目: 3 ピア中 2 番目の送信が失敗しても 1, 3 番目には配送され、2 番目は除外される
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        let first = lifecycle
            .attach_peer(Arc::new(quiet_transport()))
            .await
            .unwrap();
        let second = lifecycle
            .attach_peer(Arc::new(failing_transport()))
            .await
            .unwrap();
        let third = lifecycle
            .attach_peer(Arc::new(quiet_transport()))
            .await
            .unwrap();

        // when (操作):
        let result = lifecycle.broadcast(b"hello").await.unwrap();

        // then (期待する結果):
        assert_eq!(result.succeeded, vec![first, third]);
        assert_eq!(result.failed_ids(), vec![second]);
        assert_eq!(result.failed[0].reason, "io error: connection reset");
        assert_eq!(lifecycle.status().await.peer_count, 2);
        assert!(!lifecycle.detach_peer(&second).await);
    }

    #[tokio::test]
    async fn test_broadcast_rejects_oversized_message() {
        // テスト項目: 上限を超えるメッセージは MessageTooLarge になる
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();

        // when (操作):
        let result = lifecycle.broadcast(&[b'x'; 65]).await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(BroadcastError::MessageTooLarge { size: 65, max: 64 })
        );
    }

    #[tokio::test]
    async fn test_example_scenario_with_no_peers() {
        // テスト項目: start → 空の broadcast → stop → status の一連の流れ
        // given (前提条件):
        let lifecycle = create_test_lifecycle();

        // when (操作):
        lifecycle.start("321").await.unwrap();
        assert_eq!(lifecycle.status().await.state, ServerState::Running);
        let result = lifecycle.broadcast(b"hello").await.unwrap();
        lifecycle.stop().await.unwrap();

        // then (期待する結果):
        assert!(result.succeeded.is_empty());
        assert!(result.failed.is_empty());
        let status = lifecycle.status().await;
        assert_eq!(status.state, ServerState::Idle);
        assert_eq!(status.peer_count, 0);
    }

    #[tokio::test]
    async fn test_bind_failure_faults_and_retry_succeeds() {
        // テスト項目: bind 失敗で Faulted になり、ポート解放後の再試行で Running になる
        // given (前提条件): 別のリスナーがポートを占有している
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();
        let config = LifecycleConfig {
            peer_addr: addr,
            ..test_config()
        };
        let lifecycle = ServerLifecycle::new(config);

        // when (操作):
        let first = lifecycle.start("321").await;

        // then (期待する結果):
        assert!(matches!(first, Err(StartError::BindFailed(_))));
        let status = lifecycle.status().await;
        assert_eq!(status.state, ServerState::Faulted);
        assert!(matches!(status.fault, Some(Fault::Bind(_))));
        assert_eq!(
            lifecycle.attach_peer(Arc::new(quiet_transport())).await,
            Err(RegistryError::NotAccepting)
        );

        // when (操作): ポートを解放して再試行
        drop(occupied);
        let retry = lifecycle.start("321").await;

        // then (期待する結果):
        assert_eq!(retry, Ok(()));
        let status = lifecycle.status().await;
        assert_eq!(status.state, ServerState::Running);
        assert_eq!(status.listen_addr, Some(addr));
        assert!(status.fault.is_none());
    }

    #[tokio::test]
    async fn test_attach_peer_when_idle_is_rejected() {
        // テスト項目: Idle のときはピアを登録できない
        // given (前提条件):
        let lifecycle = create_test_lifecycle();

        // when (操作):
        let result = lifecycle.attach_peer(Arc::new(quiet_transport())).await;

        // then (期待する結果):
        assert_eq!(result, Err(RegistryError::NotAccepting));
        assert_eq!(lifecycle.status().await.peer_count, 0);
    }

    #[tokio::test]
    async fn test_stop_is_bounded_with_unresponsive_peer() {
        // テスト項目: close に応答しないピアがいても stop は有限時間で Idle に戻る
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        lifecycle
            .attach_peer(Arc::new(UnresponsiveTransport))
            .await
            .unwrap();

        // when (操作):
        let result = tokio::time::timeout(Duration::from_secs(2), lifecycle.stop()).await;

        // then (期待する結果):
        assert_eq!(result.expect("stop should finish in bounded time"), Ok(()));
        assert_eq!(lifecycle.status().await.state, ServerState::Idle);
    }

    #[tokio::test]
    async fn test_broadcast_is_bounded_with_unresponsive_peer() {
        // テスト項目: 送信に応答しないピアはタイムアウトで失敗扱いになる
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        let stuck = lifecycle
            .attach_peer(Arc::new(UnresponsiveTransport))
            .await
            .unwrap();

        // when (操作):
        let result = tokio::time::timeout(Duration::from_secs(2), lifecycle.broadcast(b"hi"))
            .await
            .expect("broadcast should finish in bounded time")
            .unwrap();

        // then (期待する結果):
        assert_eq!(result.failed_ids(), vec![stuck]);
        assert_eq!(lifecycle.status().await.peer_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_status_during_stop_never_reports_peers_when_not_running() {
        // テスト項目: stop と並行した status が「Running 以外でピア数 > 0」を観測しない
        // given (前提条件):
        let lifecycle = Arc::new(create_test_lifecycle());
        lifecycle.start("321").await.unwrap();
        for _ in 0..5 {
            lifecycle
                .attach_peer(Arc::new(quiet_transport()))
                .await
                .unwrap();
        }

        // when (操作):
        let observer = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move {
                let mut observed = Vec::new();
                loop {
                    let status = lifecycle.status().await;
                    observed.push((status.state, status.peer_count));
                    if status.state == ServerState::Idle {
                        return observed;
                    }
                    tokio::task::yield_now().await;
                }
            })
        };
        lifecycle.stop().await.unwrap();
        let observed = observer.await.unwrap();

        // then (期待する結果):
        for (state, peer_count) in observed {
            assert!(
                state == ServerState::Running || peer_count == 0,
                "observed {} with {} peers",
                state,
                peer_count
            );
        }
    }

    #[tokio::test]
    async fn test_transport_fault_requires_stop_before_start() {
        // テスト項目: 実行中の障害で Faulted になった場合、stop するまで start できない
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        lifecycle
            .attach_peer(Arc::new(quiet_transport()))
            .await
            .unwrap();

        // when (操作): リスナー障害を発生させる
        let peers = {
            let mut core = lifecycle.core.lock().await;
            let generation = core.generation;
            core.fault_transport(generation, "accept failed".to_string())
        };
        close_peers(peers, Duration::from_millis(100)).await;

        // then (期待する結果):
        let status = lifecycle.status().await;
        assert_eq!(status.state, ServerState::Faulted);
        assert_eq!(status.peer_count, 0);
        assert_eq!(
            status.fault,
            Some(Fault::Transport("accept failed".to_string()))
        );
        assert_eq!(lifecycle.start("321").await, Err(StartError::AlreadyActive));
        assert_eq!(lifecycle.stop().await, Ok(()));
        assert_eq!(lifecycle.start("321").await, Ok(()));
    }

    #[tokio::test]
    async fn test_stale_run_cannot_register_or_fault() {
        // テスト項目: 古い実行世代のタスクは新しい実行に影響を与えない
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        let stale = lifecycle.core.lock().await.generation;
        lifecycle.stop().await.unwrap();
        lifecycle.start("321").await.unwrap();

        // when (操作):
        let mut core = lifecycle.core.lock().await;
        let admitted = core.admit(stale, Arc::new(quiet_transport()), Timestamp::new(0));
        let faulted = core.fault_transport(stale, "late failure".to_string());

        // then (期待する結果):
        assert_eq!(admitted, Err(RegistryError::NotAccepting));
        assert!(faulted.is_empty());
        assert_eq!(core.state, ServerState::Running);
    }

    #[tokio::test]
    async fn test_credential_lives_only_while_active() {
        // テスト項目: パスワードは Running の間だけ保持される
        // given (前提条件):
        let lifecycle = create_test_lifecycle();

        // when (操作) / then (期待する結果):
        assert!(lifecycle.core.lock().await.credential.is_none());
        lifecycle.start("321").await.unwrap();
        let credential = lifecycle.core.lock().await.credential.clone().unwrap();
        assert!(credential.verify("321"));
        lifecycle.stop().await.unwrap();
        assert!(lifecycle.core.lock().await.credential.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_sends_text_payload() {
        // テスト項目: broadcast のメッセージは text ペイロードとしてピアに渡される
        // given (前提条件):
        let lifecycle = create_test_lifecycle();
        lifecycle.start("321").await.unwrap();
        let transport = Arc::new(RecordingTransport::default());
        lifecycle.attach_peer(transport.clone()).await.unwrap();

        // when (操作):
        lifecycle.broadcast(b"line one\nline two").await.unwrap();

        // then (期待する結果):
        assert_eq!(
            transport.received(),
            vec![BroadcastPayload::Text("line one\nline two".to_string())]
        );
    }

    #[tokio::test]
    async fn test_clipboard_monitor_follows_run() {
        // テスト項目: クリップボード監視は Running の間だけ動き、変化した内容をピアへ配送する
        // given (前提条件):
        let clipboard = Arc::new(FakeClipboard::default());
        let lifecycle = create_test_lifecycle().with_clipboard(clipboard.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(clipboard.reads(), 0);

        // when (操作): 起動してピアを登録し、クリップボードを変化させる
        lifecycle.start("321").await.unwrap();
        let transport = Arc::new(RecordingTransport::default());
        lifecycle.attach_peer(transport.clone()).await.unwrap();
        clipboard.set_text("a");
        wait_until(|| transport.received().len() == 1).await;
        let reads = clipboard.reads();
        wait_until(|| clipboard.reads() >= reads + 3).await;
        clipboard.set_text("b");
        wait_until(|| transport.received().len() == 2).await;

        // then (期待する結果):
        assert_eq!(
            transport.received(),
            vec![
                BroadcastPayload::Text("a".to_string()),
                BroadcastPayload::Text("b".to_string()),
            ]
        );

        // when (操作): 停止する
        lifecycle.stop().await.unwrap();
        let reads = clipboard.reads();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // then (期待する結果): 停止後は読み取りも配送も行われない
        assert_eq!(clipboard.reads(), reads);
        assert_eq!(transport.received().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_fault_ends_clipboard_monitor() {
        // テスト項目: 実行中の障害で Faulted になるとクリップボード監視も終了する
        // given (前提条件):
        let clipboard = Arc::new(FakeClipboard::default());
        let lifecycle = create_test_lifecycle().with_clipboard(clipboard.clone());
        lifecycle.start("321").await.unwrap();
        wait_until(|| clipboard.reads() >= 2).await;

        // when (操作):
        let peers = {
            let mut core = lifecycle.core.lock().await;
            let generation = core.generation;
            core.fault_transport(generation, "accept failed".to_string())
        };
        close_peers(peers, Duration::from_millis(100)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let reads = clipboard.reads();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // then (期待する結果):
        assert_eq!(clipboard.reads(), reads);
        lifecycle.stop().await.unwrap();
    }
}
