use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;

async fn write_raw_frame<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) {
    let json_bytes = serde_json::to_vec(message).unwrap();
    let length = json_bytes.len() as u32;
    writer.write_all(&length.to_le_bytes()).await.unwrap();
    writer.write_all(&json_bytes).await.unwrap();
    writer.flush().await.unwrap();
}

#[tokio::test]
async fn test_send_message() {
    // Two pipes: the transport writes into the first and reads from the second.
    let (mut engine_read, shell_write) = tokio::io::duplex(1024);
    let (shell_read, _engine_write) = tokio::io::duplex(1024);

    let (transport, _rx) = PipeTransport::new(shell_write, shell_read);
    let (mut sender, _receiver) = transport.into_parts();

    let message = serde_json::json!({"type": "Tab:Load", "url": "about:home"});
    sender.send(message.clone()).await.unwrap();

    let mut len_buf = [0u8; 4];
    engine_read.read_exact(&mut len_buf).await.unwrap();
    let length = u32::from_le_bytes(len_buf) as usize;

    let mut msg_buf = vec![0u8; length];
    engine_read.read_exact(&mut msg_buf).await.unwrap();

    let received: Value = serde_json::from_slice(&msg_buf).unwrap();
    assert_eq!(received, message);
}

#[tokio::test]
async fn test_multiple_messages_in_sequence() {
    let (_engine_read, shell_write) = tokio::io::duplex(4096);
    let (shell_read, mut engine_write) = tokio::io::duplex(4096);

    let (mut transport, mut rx) = PipeTransport::new(shell_write, shell_read);
    let read_task = tokio::spawn(async move { transport.run().await });

    let messages = vec![
        serde_json::json!({"type": "Gecko:Ready"}),
        serde_json::json!({"type": "Tab:Added", "tabID": 1}),
        serde_json::json!({"type": "Tab:Added", "tabID": 2}),
    ];
    for msg in &messages {
        write_raw_frame(&mut engine_write, msg).await;
    }

    for expected in &messages {
        let received = rx.recv().await.unwrap();
        assert_eq!(&received, expected);
    }

    drop(engine_write);
    drop(rx);
    let _ = read_task.await;
}

#[tokio::test]
async fn test_large_message() {
    let (_engine_read, shell_write) = tokio::io::duplex(1024 * 1024);
    let (shell_read, mut engine_write) = tokio::io::duplex(1024 * 1024);

    let (mut transport, mut rx) = PipeTransport::new(shell_write, shell_read);
    let read_task = tokio::spawn(async move { transport.run().await });

    let large_message = serde_json::json!({
        "type": "Session:Data",
        "data": "x".repeat(100_000),
    });
    write_raw_frame(&mut engine_write, &large_message).await;

    let received = rx.recv().await.unwrap();
    assert_eq!(received, large_message);

    drop(engine_write);
    drop(rx);
    let _ = read_task.await;
}

#[tokio::test]
async fn test_unparseable_frame_is_skipped() {
    let (_engine_read, shell_write) = tokio::io::duplex(1024);
    let (shell_read, mut engine_write) = tokio::io::duplex(1024);

    let (mut transport, mut rx) = PipeTransport::new(shell_write, shell_read);
    let read_task = tokio::spawn(async move { transport.run().await });

    let garbage = b"{not json";
    engine_write
        .write_all(&(garbage.len() as u32).to_le_bytes())
        .await
        .unwrap();
    engine_write.write_all(garbage).await.unwrap();
    let good = serde_json::json!({"type": "After"});
    write_raw_frame(&mut engine_write, &good).await;

    assert_eq!(rx.recv().await.unwrap(), good);

    drop(engine_write);
    drop(rx);
    let _ = read_task.await;
}

#[tokio::test]
async fn test_oversized_length_prefix() {
    let (_engine_read, shell_write) = tokio::io::duplex(1024);
    let (shell_read, mut engine_write) = tokio::io::duplex(1024);

    let (mut transport, _rx) = PipeTransport::new(shell_write, shell_read);

    engine_write
        .write_all(&u32::MAX.to_le_bytes())
        .await
        .unwrap();
    engine_write.flush().await.unwrap();

    let err = transport.run().await.unwrap_err();
    assert!(matches!(err, Error::ProtocolError(_)), "got {err:?}");
}

#[tokio::test]
async fn test_malformed_length_prefix() {
    let (_engine_read, shell_write) = tokio::io::duplex(1024);
    let (shell_read, mut engine_write) = tokio::io::duplex(1024);

    let (mut transport, _rx) = PipeTransport::new(shell_write, shell_read);

    // Only two of the four prefix bytes before EOF.
    engine_write.write_all(&[0x01, 0x02]).await.unwrap();
    engine_write.flush().await.unwrap();
    drop(engine_write);

    let result = transport.run().await;
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Failed to read length prefix")
    );
}

#[tokio::test]
async fn test_broken_pipe() {
    let (_engine_read, shell_write) = tokio::io::duplex(1024);
    let (shell_read, engine_write) = tokio::io::duplex(1024);

    let (mut transport, _rx) = PipeTransport::new(shell_write, shell_read);
    drop(engine_write);

    let read_task = tokio::spawn(async move { transport.run().await });
    let result = read_task.await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_boxed_halves_round_trip() {
    let (engine_read, shell_write) = tokio::io::duplex(1024);
    let (shell_read, engine_write) = tokio::io::duplex(1024);

    // Loop the engine side back onto itself: whatever the shell writes comes
    // back as inbound frames.
    let echo = tokio::spawn(async move {
        let (mut r, mut w) = (engine_read, engine_write);
        tokio::io::copy(&mut r, &mut w).await
    });

    let (transport, message_rx) = PipeTransport::new(shell_write, shell_read);
    let TransportParts {
        mut sender,
        receiver,
        mut message_rx,
    } = transport.into_transport_parts(message_rx);
    let reader = tokio::spawn(receiver.run());

    let message = serde_json::json!({"type": "Echo", "n": 1});
    sender.send(message.clone()).await.unwrap();
    assert_eq!(message_rx.recv().await.unwrap(), message);

    drop(sender);
    drop(message_rx);
    let _ = reader.await;
    echo.abort();
}
