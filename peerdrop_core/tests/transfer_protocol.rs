//! End-to-end protocol runs over the in-memory channel pair.

use bytes::Bytes;
use peerdrop_core::channel::memory::{MemoryChannel, pair};
use peerdrop_core::transfer::{ACK_SENTINEL, Frame, RetryPolicy};
use peerdrop_core::{ChannelSession, FrameChannel, Identity, Role, TransferError};
use std::time::Duration;
use tokio::time::Instant;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn connected() -> (MemoryChannel, MemoryChannel) {
    pair(Identity::generate().node_id(), Identity::generate().node_id())
}

fn policy() -> RetryPolicy {
    RetryPolicy::unbounded(Duration::from_millis(300)).with_max_attempts(20)
}

#[tokio::test(start_paused = true)]
async fn test_report_txt_scenario() {
    init_tracing();
    let (a, b) = connected();
    let payload = Bytes::from((0u8..37).collect::<Vec<_>>());

    let receiver = tokio::spawn(
        ChannelSession::new(b, Role::Receiver).receive(Duration::from_secs(5)),
    );
    let receipt = ChannelSession::new(a, Role::Sender)
        .send("report.txt".to_string(), payload.clone(), &policy())
        .await
        .unwrap();

    let file = receiver.await.unwrap().unwrap();
    assert_eq!(file.file_name, "report.txt");
    assert_eq!(file.payload, payload);
    assert_eq!(receipt.size, 37);
    assert_eq!(receipt.attempts, 1);
    assert_eq!(receipt.digest, file.digest());
}

#[tokio::test(start_paused = true)]
async fn test_empty_payload_arrives_intact() {
    let (a, b) = connected();

    let receiver = tokio::spawn(
        ChannelSession::new(b, Role::Receiver).receive(Duration::from_secs(5)),
    );
    ChannelSession::new(a, Role::Sender)
        .send("empty.bin".to_string(), Bytes::new(), &policy())
        .await
        .unwrap();

    let file = receiver.await.unwrap().unwrap();
    assert_eq!(file.file_name, "empty.bin");
    assert!(file.payload.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_large_payload_is_byte_exact() {
    let (a, b) = connected();
    let payload: Bytes = (0..1_000_003u32).map(|i| (i % 251) as u8).collect();

    let receiver = tokio::spawn(
        ChannelSession::new(b, Role::Receiver).receive(Duration::from_secs(5)),
    );
    ChannelSession::new(a, Role::Sender)
        .send("blob.bin".to_string(), payload.clone(), &policy())
        .await
        .unwrap();

    assert_eq!(receiver.await.unwrap().unwrap().payload, payload);
}

#[tokio::test(start_paused = true)]
async fn test_slow_receiver_gets_retransmissions_then_one_payload() {
    init_tracing();
    let (a, mut peer) = connected();

    let sender = tokio::spawn(async move {
        ChannelSession::new(a, Role::Sender)
            .send("slow.txt".to_string(), Bytes::from_static(b"hello"), &policy())
            .await
    });

    // Ignore the first three names, acknowledge the fourth.
    let start = Instant::now();
    for _ in 0..4 {
        assert_eq!(peer.recv().await.unwrap(), Some(Frame::text("slow.txt")));
    }
    assert_eq!(start.elapsed(), Duration::from_millis(900));
    peer.send(Frame::text(ACK_SENTINEL)).await.unwrap();

    let receipt = sender.await.unwrap().unwrap();
    assert_eq!(receipt.attempts, 4);

    let mut binaries = 0;
    while let Some(frame) = peer.recv().await.unwrap() {
        match frame {
            Frame::Binary(b) => {
                binaries += 1;
                assert_eq!(b.as_ref(), b"hello");
            }
            Frame::Text(t) => panic!("unexpected text after ack: {}", t),
        }
    }
    assert_eq!(binaries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_gives_up_after_max_attempts() {
    let (a, mut peer) = connected();
    let policy = RetryPolicy::unbounded(Duration::from_millis(300)).with_max_attempts(5);

    let start = Instant::now();
    let err = ChannelSession::new(a, Role::Sender)
        .send("lost.txt".to_string(), Bytes::from_static(b"x"), &policy)
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::HandshakeTimeout { attempts: 5 }), "{:?}", err);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));

    let mut names = 0;
    while let Some(frame) = peer.recv().await.unwrap() {
        assert_eq!(frame, Frame::text("lost.txt"));
        names += 1;
    }
    assert_eq!(names, 5);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_deadline() {
    let (a, _peer) = connected();
    let policy =
        RetryPolicy::unbounded(Duration::from_millis(300)).with_deadline(Duration::from_secs(2));

    let err = ChannelSession::new(a, Role::Sender)
        .send("lost.txt".to_string(), Bytes::new(), &policy)
        .await
        .unwrap_err();

    // t = 0, 300, ..., 1800
    assert!(matches!(err, TransferError::HandshakeTimeout { attempts: 7 }), "{:?}", err);
}

#[tokio::test(start_paused = true)]
async fn test_sender_ignores_noise_before_ack() {
    let (a, mut peer) = connected();

    let sender = tokio::spawn(async move {
        ChannelSession::new(a, Role::Sender)
            .send("n.txt".to_string(), Bytes::from_static(b"ok"), &policy())
            .await
    });

    assert_eq!(peer.recv().await.unwrap(), Some(Frame::text("n.txt")));
    peer.send(Frame::text("hello?")).await.unwrap();
    peer.send(Frame::Binary(Bytes::from_static(b"junk"))).await.unwrap();
    peer.send(Frame::text(ACK_SENTINEL)).await.unwrap();

    assert!(sender.await.unwrap().is_ok());
    // Possibly another name went out before the ack was read; the payload is last.
    let mut last = None;
    while let Some(frame) = peer.recv().await.unwrap() {
        last = Some(frame);
    }
    assert_eq!(last, Some(Frame::Binary(Bytes::from_static(b"ok"))));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_names_yield_one_result() {
    init_tracing();
    let (mut peer, b) = connected();

    let receiver = tokio::spawn(
        ChannelSession::new(b, Role::Receiver).receive(Duration::from_secs(5)),
    );

    peer.send(Frame::Binary(Bytes::from_static(b"too early"))).await.unwrap();
    for name in ["first.txt", "first.txt", "second.txt"] {
        peer.send(Frame::text(name)).await.unwrap();
    }
    peer.send(Frame::Binary(Bytes::from_static(b"payload"))).await.unwrap();
    peer.send(Frame::text("after.txt")).await.unwrap();
    peer.send(Frame::Binary(Bytes::from_static(b"second payload"))).await.unwrap();

    let file = receiver.await.unwrap().unwrap();
    assert_eq!(file.file_name, "first.txt");
    assert_eq!(file.payload.as_ref(), b"payload");

    // Exactly one acknowledgment, then the receiver closed its side.
    assert_eq!(peer.recv().await.unwrap(), Some(Frame::text(ACK_SENTINEL)));
    assert_eq!(peer.recv().await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_sender_reports_channel_closed() {
    let (a, peer) = connected();
    drop(peer);

    let err = ChannelSession::new(a, Role::Sender)
        .send("gone.txt".to_string(), Bytes::new(), &policy())
        .await
        .unwrap_err();
    assert!(
        matches!(err, TransferError::ChannelClosed(_) | TransferError::Channel(_)),
        "{:?}",
        err
    );
}

#[tokio::test(start_paused = true)]
async fn test_receiver_reports_close_mid_handshake() {
    let (mut peer, b) = connected();

    let receiver = tokio::spawn(
        ChannelSession::new(b, Role::Receiver).receive(Duration::from_secs(5)),
    );
    peer.send(Frame::text("half.txt")).await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), Some(Frame::text(ACK_SENTINEL)));
    peer.close().await;

    let err = receiver.await.unwrap().unwrap_err();
    assert!(
        matches!(err, TransferError::ChannelClosed("awaiting payload")),
        "{:?}",
        err
    );
}

#[tokio::test(start_paused = true)]
async fn test_receiver_idle_timeout() {
    let (_peer, b) = connected();

    let start = Instant::now();
    let err = ChannelSession::new(b, Role::Receiver)
        .receive(Duration::from_secs(3))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::ReceiveTimeout(_)), "{:?}", err);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_the_handshake() {
    let (a, mut peer) = connected();
    let session = ChannelSession::new(a, Role::Sender);
    let token = session.cancel_token().clone();

    let sender = tokio::spawn(async move {
        session
            .send("c.txt".to_string(), Bytes::new(), &RetryPolicy::unbounded(Duration::from_millis(300)))
            .await
    });

    assert_eq!(peer.recv().await.unwrap(), Some(Frame::text("c.txt")));
    assert_eq!(peer.recv().await.unwrap(), Some(Frame::text("c.txt")));
    token.cancel();

    let err = sender.await.unwrap().unwrap_err();
    assert!(matches!(err, TransferError::Cancelled), "{:?}", err);

    // No more names after cancellation; the channel is closed.
    assert_eq!(peer.recv().await.unwrap(), None);
}

#[tokio::test]
async fn test_role_is_enforced() {
    let (a, b) = connected();

    let err = ChannelSession::new(a, Role::Receiver)
        .send("x".to_string(), Bytes::new(), &policy())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::RoleMismatch {
            expected: Role::Sender,
            actual: Role::Receiver
        }
    ));

    let err = ChannelSession::new(b, Role::Sender)
        .receive(Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::RoleMismatch { .. }));
}
