use mcp_stdio::mcp::protocol::McpProtocol;
use mcp_stdio::mcp::types::{JsonRpcRequest, JsonRpcResponse, RequestId};
use mcp_stdio::McpError;
use serde_json::json;
use std::io::Cursor;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};

#[tokio::test]
async fn test_request_is_written_as_one_compact_line() {
    let protocol = McpProtocol::new();
    let request = JsonRpcRequest::new("ping", None, RequestId::Number(1));

    let mut mock = tokio_test::io::Builder::new()
        .write(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n")
        .build();
    protocol.write_message_async(&mut mock, &request).await.unwrap();
}

#[tokio::test]
async fn test_line_split_across_reads() {
    let protocol = McpProtocol::new();
    let mock = tokio_test::io::Builder::new()
        .read(b"{\"jsonrpc\":\"2.0\",")
        .read(b"\"result\":42,")
        .read(b"\"id\":7}\n")
        .build();
    let mut reader = BufReader::new(mock);
    let mut pending = Vec::new();

    let line = protocol
        .read_line_async(&mut reader, &mut pending)
        .await
        .unwrap()
        .unwrap();
    let response = JsonRpcResponse::from_bytes(line.as_bytes()).unwrap();
    assert_eq!(response.result, Some(json!(42)));
    assert_eq!(response.id, Some(RequestId::Number(7)));
}

#[tokio::test]
async fn test_multiple_messages_round_trip() {
    let protocol = McpProtocol::new();
    let requests = vec![
        JsonRpcRequest::new("initialize", Some(json!({"protocolVersion": "2024-11-05"})), 1.into()),
        JsonRpcRequest::new("tools/list", Some(json!({})), 2.into()),
        JsonRpcRequest::new("tools/call", Some(json!({"name": "greet", "arguments": {"name": "a\nb"}})), "abc".into()),
    ];

    let mut buffer = Vec::new();
    for request in &requests {
        protocol.write_message_async(&mut buffer, request).await.unwrap();
    }
    assert_eq!(buffer.iter().filter(|b| **b == b'\n').count(), requests.len());

    let mut reader = BufReader::new(Cursor::new(buffer));
    let mut pending = Vec::new();
    for expected in &requests {
        let line = protocol
            .read_line_async(&mut reader, &mut pending)
            .await
            .unwrap()
            .unwrap();
        let decoded = JsonRpcRequest::from_bytes(line.as_bytes()).unwrap();
        assert_eq!(decoded.method, expected.method);
        assert_eq!(decoded.id, expected.id);
        assert_eq!(decoded.params, expected.params);
    }
    assert!(protocol
        .read_line_async(&mut reader, &mut pending)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cancelled_read_keeps_partial_line() {
    let protocol = McpProtocol::new();
    let (mut writer, reader) = tokio::io::duplex(1024);
    let mut reader = BufReader::new(reader);
    let mut pending = Vec::new();

    writer.write_all(b"{\"jsonrpc\":\"2.0\",").await.unwrap();
    let first = tokio::time::timeout(
        Duration::from_millis(50),
        protocol.read_line_async(&mut reader, &mut pending),
    )
    .await;
    assert!(first.is_err(), "read should still be waiting for the newline");

    writer.write_all(b"\"result\":null,\"id\":3}\n").await.unwrap();
    let line = protocol
        .read_line_async(&mut reader, &mut pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line, "{\"jsonrpc\":\"2.0\",\"result\":null,\"id\":3}");

    let response = JsonRpcResponse::from_bytes(line.as_bytes()).unwrap();
    assert!(response.validate().is_ok());
}

#[tokio::test]
async fn test_large_line_within_limit() {
    let protocol = McpProtocol::new();
    let text = "x".repeat(1024 * 1024);
    let mut buffer = Vec::new();
    protocol
        .write_message_async(&mut buffer, &json!({"text": text}))
        .await
        .unwrap();

    let mut reader = BufReader::new(Cursor::new(buffer));
    let mut pending = Vec::new();
    let line = protocol
        .read_line_async(&mut reader, &mut pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.len(), text.len() + "{\"text\":\"\"}".len());
}

#[tokio::test]
async fn test_line_over_limit_is_rejected() {
    let protocol = McpProtocol::with_max_line_bytes(16);
    let mut reader = BufReader::new(Cursor::new(
        b"{\"text\":\"far too long for the limit\"}\n{}\n".to_vec(),
    ));
    let mut pending = Vec::new();

    let err = protocol
        .read_line_async(&mut reader, &mut pending)
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::InvalidMessage(_)));

    let next = protocol
        .read_line_async(&mut reader, &mut pending)
        .await
        .unwrap();
    assert_eq!(next.as_deref(), Some("{}"));
}
