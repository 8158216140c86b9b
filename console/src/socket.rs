use crate::bridge::{SharedBridge, lock};
use crate::error::SessionError;
use crate::events::{AUTH_SUCCESS, JWT_ERROR, Outbound, SocketFrame, TOKEN_EXPIRED, TOKEN_EXPIRING};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Runs one websocket session until the daemon closes it or it fails.
///
/// The bridge is marked connected once the daemon accepts the token and
/// disconnected when the session ends, whatever the reason.
pub async fn run_session(
    url: &str,
    token: &str,
    bridge: SharedBridge,
) -> Result<(), SessionError> {
    let (stream, _) = connect_async(url)
        .await
        .map_err(|source| SessionError::Connect {
            url: url.to_string(),
            source,
        })?;
    let (mut write, mut read) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    info!(url, "websocket connected, authenticating");
    write
        .send(Message::Text(Outbound::Auth(token.to_string()).encode().into()))
        .await?;

    let result = loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let frame = match SocketFrame::parse(text.as_str()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!(error = %e, "ignoring malformed frame");
                            continue;
                        }
                    };

                    match frame.event.as_str() {
                        AUTH_SUCCESS => {
                            info!("console authenticated");
                            if let Err(e) = lock(&bridge).connected(tx.clone()) {
                                break Err(e.into());
                            }
                        }
                        TOKEN_EXPIRING => warn!("console token is about to expire"),
                        TOKEN_EXPIRED => break Err(SessionError::TokenExpired),
                        JWT_ERROR => break Err(SessionError::AuthRejected(frame.first_arg().to_string())),
                        _ => {
                            lock(&bridge).dispatch(&frame);
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
            Some(message) = rx.recv() => {
                if let Err(e) = write.send(Message::Text(message.encode().into())).await {
                    break Err(e.into());
                }
            }
        }
    };

    lock(&bridge).disconnected();
    info!(url, "websocket session ended");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ConsoleBridge;
    use crate::events::EventKind;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn text(event: &str, args: &[&str]) -> Message {
        let frame = SocketFrame::new(event, args.iter().map(|a| a.to_string()).collect());
        Message::Text(serde_json::to_string(&frame).unwrap().into())
    }

    async fn next_frame<S>(socket: &mut S) -> SocketFrame
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            if let Message::Text(text) = socket.next().await.unwrap().unwrap() {
                return SocketFrame::parse(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn authenticates_requests_logs_and_dispatches() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let daemon = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();

            let auth = next_frame(&mut socket).await;
            socket.send(text(AUTH_SUCCESS, &[])).await.unwrap();
            let logs = next_frame(&mut socket).await;
            let stats = next_frame(&mut socket).await;

            socket.send(text("console output", &["[Server] ready\n"])).await.unwrap();
            socket.send(text("mystery", &[])).await.unwrap();
            let command = next_frame(&mut socket).await;
            socket.close(None).await.unwrap();

            vec![auth, logs, stats, command]
        });

        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut bridge = ConsoleBridge::new();
        let seen = lines.clone();
        bridge.on(EventKind::ConsoleOutput, move |line| {
            seen.lock().unwrap().push(line.to_string());
        });
        let bridge = bridge.shared();

        let session = {
            let bridge = bridge.clone();
            let url = url.clone();
            tokio::spawn(async move { run_session(&url, "jwt-token", bridge).await })
        };

        while lines.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        lock(&bridge).send_command("list").unwrap();

        let frames = daemon.await.unwrap();
        session.await.unwrap().unwrap();

        assert_eq!(frames[0], SocketFrame::new("auth", vec!["jwt-token".to_string()]));
        assert_eq!(frames[1].event, "send logs");
        assert_eq!(frames[2].event, "send stats");
        assert_eq!(frames[3], SocketFrame::new("send command", vec!["list".to_string()]));
        assert_eq!(*lines.lock().unwrap(), vec!["[Server] ready\n".to_string()]);
        assert!(!lock(&bridge).is_connected());
    }

    #[tokio::test]
    async fn rejected_tokens_end_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = accept_async(stream).await.unwrap();
            next_frame(&mut socket).await;
            socket.send(text(JWT_ERROR, &["signature invalid"])).await.unwrap();
            let _ = socket.next().await;
        });

        let err = run_session(&url, "bad", ConsoleBridge::new().shared())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(err.to_string().contains("signature invalid"));
    }

    #[tokio::test]
    async fn refused_connections_are_reported() {
        let err = run_session("ws://127.0.0.1:1", "token", ConsoleBridge::new().shared())
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Connect { .. }));
        assert!(!err.is_fatal());
    }
}
