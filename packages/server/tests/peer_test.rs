//! Integration tests: real TCP peers against a running broadcast server.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clipcast_server::{
    config::LifecycleConfig,
    domain::{ServerState, StatusSnapshot},
    usecase::ServerLifecycle,
};
use clipcast_shared::protocol::BroadcastPayload;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};

// ========================================
// テスト作業記録
// ========================================
// 【何をテストするか】
// - パスワードハンドシェイク（ok / denied）と登録数の反映
// - ブロードキャストが 1 行の JSON として全ピアに届くこと（改行を含む場合も）
// - 切断したピアが登録解除されること
// - 未認証のピアや停止したピアがいても stop が有限時間で終わること
//
// 【前提】
// - ピア用ポートは 127.0.0.1:0（エフェメラル）
// ========================================

fn test_config() -> LifecycleConfig {
    LifecycleConfig {
        admit_timeout: Duration::from_secs(2),
        write_timeout: Duration::from_millis(500),
        shutdown_timeout: Duration::from_millis(500),
        ..LifecycleConfig::with_peer_addr("127.0.0.1:0".parse().unwrap())
    }
}

async fn start_lifecycle(password: &str) -> (Arc<ServerLifecycle>, SocketAddr) {
    let lifecycle = Arc::new(ServerLifecycle::new(test_config()));
    lifecycle.start(password).await.unwrap();
    let addr = lifecycle.status().await.listen_addr.unwrap();
    (lifecycle, addr)
}

/// Connect and send the password; returns the reply line and the open stream.
async fn handshake(addr: SocketAddr, password: &str) -> (String, BufReader<TcpStream>) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("{}\n", password).as_bytes())
        .await
        .unwrap();
    let mut reader = BufReader::new(stream);
    let mut reply = String::new();
    reader.read_line(&mut reply).await.unwrap();
    (reply, reader)
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("no line received in time")
        .unwrap();
    line
}

async fn read_payload(reader: &mut BufReader<TcpStream>) -> BroadcastPayload {
    let line = read_line(reader).await;
    BroadcastPayload::decode(&line).expect("line should hold one payload")
}

async fn wait_for_peer_count(lifecycle: &ServerLifecycle, expected: usize) {
    for _ in 0..200 {
        if lifecycle.status().await.peer_count == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "peer count did not reach {} (now {})",
        expected,
        lifecycle.status().await.peer_count
    );
}

#[tokio::test]
async fn test_peers_receive_broadcast_lines() {
    // テスト項目: 認証済みの 2 ピアにブロードキャストが 1 行ずつ届く
    // given (前提条件):
    let (lifecycle, addr) = start_lifecycle("321").await;
    let (reply_a, mut peer_a) = handshake(addr, "321").await;
    let (reply_b, mut peer_b) = handshake(addr, "321").await;
    assert_eq!(reply_a, "ok\n");
    assert_eq!(reply_b, "ok\n");
    wait_for_peer_count(&lifecycle, 2).await;

    // when (操作):
    let result = lifecycle.broadcast(b"hello").await.unwrap();

    // then (期待する結果):
    assert_eq!(result.succeeded.len(), 2);
    assert!(result.failed.is_empty());
    assert_eq!(
        read_line(&mut peer_a).await,
        "{\"type\":\"text\",\"data\":\"hello\"}\n"
    );
    assert_eq!(
        read_line(&mut peer_b).await,
        "{\"type\":\"text\",\"data\":\"hello\"}\n"
    );

    lifecycle.stop().await.unwrap();
}

#[tokio::test]
async fn test_multi_line_message_arrives_as_one_broadcast() {
    // テスト項目: 改行を含むメッセージが分割されずに 1 件として届き、次の配送と混ざらない
    // given (前提条件):
    let (lifecycle, addr) = start_lifecycle("321").await;
    let (_, mut peer) = handshake(addr, "321").await;
    wait_for_peer_count(&lifecycle, 1).await;

    // when (操作):
    lifecycle.broadcast(b"first\nsecond\r\n").await.unwrap();
    lifecycle.broadcast(b"next").await.unwrap();

    // then (期待する結果):
    assert_eq!(
        read_payload(&mut peer).await,
        BroadcastPayload::Text("first\nsecond\r\n".to_string())
    );
    assert_eq!(
        read_payload(&mut peer).await,
        BroadcastPayload::Text("next".to_string())
    );

    lifecycle.stop().await.unwrap();
}

#[tokio::test]
async fn test_non_utf8_password_is_denied() {
    // テスト項目: UTF-8 として不正なパスワード行にも denied が返り、登録されない
    // given (前提条件):
    let (lifecycle, addr) = start_lifecycle("321").await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // when (操作):
    stream.write_all(&[0xff, 0xfe, b'3', b'\n']).await.unwrap();
    let mut reader = BufReader::new(stream);

    // then (期待する結果):
    assert_eq!(read_line(&mut reader).await, "denied\n");
    assert_eq!(lifecycle.status().await.peer_count, 0);

    lifecycle.stop().await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_is_denied_and_not_registered() {
    // テスト項目: 誤ったパスワードのピアは denied を受け取り、登録されない
    // given (前提条件):
    let (lifecycle, addr) = start_lifecycle("321").await;

    // when (操作):
    let (reply, mut reader) = handshake(addr, "123").await;

    // then (期待する結果):
    assert_eq!(reply, "denied\n");
    let mut rest = String::new();
    let read = reader.read_line(&mut rest).await.unwrap_or(0);
    assert_eq!(read, 0, "connection should be closed after denial");
    assert_eq!(lifecycle.status().await.peer_count, 0);

    lifecycle.stop().await.unwrap();
}

#[tokio::test]
async fn test_disconnected_peer_is_deregistered() {
    // テスト項目: ピアが切断すると登録が解除される
    // given (前提条件):
    let (lifecycle, addr) = start_lifecycle("321").await;
    let (_, peer) = handshake(addr, "321").await;
    wait_for_peer_count(&lifecycle, 1).await;

    // when (操作):
    drop(peer);

    // then (期待する結果):
    wait_for_peer_count(&lifecycle, 0).await;
    assert_eq!(lifecycle.status().await.state, ServerState::Running);

    lifecycle.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_connected_peers() {
    // テスト項目: stop で接続中のピアの接続が閉じられ、ポートが解放される
    // given (前提条件):
    let (lifecycle, addr) = start_lifecycle("321").await;
    let (_, mut peer) = handshake(addr, "321").await;
    wait_for_peer_count(&lifecycle, 1).await;

    // when (操作):
    lifecycle.stop().await.unwrap();

    // then (期待する結果):
    let mut line = String::new();
    let read = tokio::time::timeout(Duration::from_secs(2), peer.read_line(&mut line))
        .await
        .expect("peer should see the connection close")
        .unwrap_or(0);
    assert_eq!(read, 0);
    assert_eq!(lifecycle.status().await, StatusSnapshot::idle());
    assert!(tokio::net::TcpListener::bind(addr).await.is_ok());
}

#[tokio::test]
async fn test_stop_is_bounded_with_silent_peer() {
    // テスト項目: パスワードを送らないピアがいても stop は有限時間で終わる
    // given (前提条件):
    let (lifecycle, addr) = start_lifecycle("321").await;
    let _silent = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // when (操作):
    let result = tokio::time::timeout(Duration::from_secs(3), lifecycle.stop()).await;

    // then (期待する結果):
    assert_eq!(result.expect("stop should finish in bounded time"), Ok(()));
    assert_eq!(lifecycle.status().await.state, ServerState::Idle);
}

#[tokio::test]
async fn test_restart_uses_new_password() {
    // テスト項目: 再起動後は新しいパスワードのみ受け入れられる
    // given (前提条件):
    let (lifecycle, _) = start_lifecycle("321").await;
    lifecycle.stop().await.unwrap();
    lifecycle.start("456").await.unwrap();
    let addr = lifecycle.status().await.listen_addr.unwrap();

    // when (操作):
    let (old_reply, _) = handshake(addr, "321").await;
    let (new_reply, _peer) = handshake(addr, "456").await;

    // then (期待する結果):
    assert_eq!(old_reply, "denied\n");
    assert_eq!(new_reply, "ok\n");
    wait_for_peer_count(&lifecycle, 1).await;

    lifecycle.stop().await.unwrap();
}
