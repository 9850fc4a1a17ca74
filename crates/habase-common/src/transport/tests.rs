//! Loopback tests for the transport layer
//!
//! These tests run a real TCP listener and verify that both framing modes
//! and both protocols carry requests and responses end to end.

#[cfg(test)]
mod tests {
    use crate::protocol::{HabaseError, RemoteError, Request, Response, Value};
    use crate::transport::{Codec, MessageStream, ProtocolKind, RpcServer, TransportMode};
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    async fn echo_server(mode: TransportMode, protocol: ProtocolKind) -> (String, CancellationToken) {
        let server = RpcServer::bind("127.0.0.1:0", mode, protocol).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();

        tokio::spawn(server.run_with_handler(
            |req: Request| async move {
                match req.method.as_str() {
                    "echo" => Ok(Value::Array(req.args)),
                    "nothing" => Ok(Value::Null),
                    other => Err(RemoteError::new("IOError", format!("unknown method {}", other))),
                }
            },
            shutdown.clone(),
        ));

        (addr, shutdown)
    }

    async fn roundtrip(mode: TransportMode, protocol: ProtocolKind) {
        let (addr, shutdown) = echo_server(mode, protocol).await;
        let mut stream = MessageStream::connect(&addr, mode, Codec::new(protocol), Some(Duration::from_secs(2)))
            .await
            .unwrap();

        // Several calls on one connection exercise buffer carry-over.
        for seq_id in 1..=5u64 {
            let request = Request::new(seq_id, "echo", vec![json!("users"), json!(seq_id)]);
            let response = stream.call(&request).await.unwrap();
            assert_eq!(response.seq_id, seq_id);
            assert_eq!(response.into_result().unwrap(), json!(["users", seq_id]));
        }

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_buffered_binary_roundtrip() {
        roundtrip(TransportMode::Buffered, ProtocolKind::Binary).await;
    }

    #[tokio::test]
    async fn test_buffered_compact_roundtrip() {
        roundtrip(TransportMode::Buffered, ProtocolKind::Compact).await;
    }

    #[tokio::test]
    async fn test_framed_binary_roundtrip() {
        roundtrip(TransportMode::Framed, ProtocolKind::Binary).await;
    }

    #[tokio::test]
    async fn test_framed_compact_roundtrip() {
        roundtrip(TransportMode::Framed, ProtocolKind::Compact).await;
    }

    #[tokio::test]
    async fn test_remote_error_travels_as_application_error() {
        let (addr, shutdown) = echo_server(TransportMode::Framed, ProtocolKind::Binary).await;
        let mut stream = MessageStream::connect(&addr, TransportMode::Framed, Codec::default(), None)
            .await
            .unwrap();

        let response = stream.call(&Request::new(1, "dropEverything", vec![])).await.unwrap();
        match response.into_result() {
            Err(HabaseError::Application { kind, .. }) => assert_eq!(kind, "IOError"),
            other => panic!("Expected application error, got {:?}", other),
        }

        // The connection is still usable afterwards.
        let response = stream.call(&Request::new(2, "nothing", vec![])).await.unwrap();
        assert_eq!(response.into_result().unwrap(), Value::Null);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_buffered_message_split_across_writes() {
        use tokio::io::AsyncWriteExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let codec = Codec::new(ProtocolKind::Binary);
        let payload = codec
            .encode_response(&Response::success(7, json!({"name": "cf:", "maxVersions": 3})))
            .unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (head, tail) = payload.split_at(payload.len() / 2);
            socket.write_all(head).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            socket.write_all(tail).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let mut stream = MessageStream::connect(&addr, TransportMode::Buffered, codec, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        let response: Response = stream.receive().await.unwrap();
        assert_eq!(response.seq_id, 7);
    }

    #[tokio::test]
    async fn test_buffered_rejects_oversized_message_header() {
        use tokio::io::AsyncWriteExt;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // str32 header announcing ~4 GB, then a trickle of payload
            socket.write_all(&[0xdb, 0xff, 0xff, 0xff, 0xf0]).await.unwrap();
            socket.write_all(&[b'x'; 64]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut stream = MessageStream::connect(
            &addr,
            TransportMode::Buffered,
            Codec::default(),
            Some(Duration::from_secs(2)),
        )
        .await
        .unwrap();

        let err = stream.receive::<Response>().await.unwrap_err();
        assert!(matches!(err, HabaseError::Transport(_)), "got {:?}", err);
        assert!(err.to_string().contains("Message too large"));
    }

    #[tokio::test]
    async fn test_buffered_large_message_roundtrip() {
        let (addr, shutdown) = echo_server(TransportMode::Buffered, ProtocolKind::Binary).await;
        let mut stream = MessageStream::connect(
            &addr,
            TransportMode::Buffered,
            Codec::new(ProtocolKind::Binary),
            Some(Duration::from_secs(10)),
        )
        .await
        .unwrap();

        let blob = "r".repeat(4 * 1024 * 1024);
        let rows: Vec<Value> = (0..2000).map(|i| json!({"row": i, "cf:a": "v"})).collect();
        let request = Request::new(1, "echo", vec![json!(blob), json!(rows)]);

        let response = tokio::time::timeout(Duration::from_secs(10), stream.call(&request))
            .await
            .expect("large buffered message should not stall")
            .unwrap();

        let result = response.into_result().unwrap();
        assert_eq!(result[0].as_str().map(str::len), Some(blob.len()));
        assert_eq!(result[1].as_array().map(Vec::len), Some(2000));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_read_timeout_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            // Accept and never answer.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut stream = MessageStream::connect(
            &addr,
            TransportMode::Framed,
            Codec::default(),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        let err = stream.call(&Request::new(1, "getTableNames", vec![])).await.unwrap_err();
        assert!(matches!(err, HabaseError::Timeout(100)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_server_shutdown_drops_connections() {
        let (addr, shutdown) = echo_server(TransportMode::Framed, ProtocolKind::Compact).await;
        let mut stream = MessageStream::connect(
            &addr,
            TransportMode::Framed,
            Codec::new(ProtocolKind::Compact),
            Some(Duration::from_secs(1)),
        )
        .await
        .unwrap();

        stream.call(&Request::new(1, "nothing", vec![])).await.unwrap();

        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = stream.call(&Request::new(2, "nothing", vec![])).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {:?}", err);
    }
}
