// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Line-oriented TCP control listener for trx-server.
//!
//! Each request line (`freq=14074000`, `r2:mode=CW`, `status?`, ...) is
//! handed to the radio control and answered with exactly one line.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

use trx_dsp::RadioControl;

/// Longest request line accepted before the client is dropped.
const MAX_LINE_LEN: usize = 4096;

/// Run the TCP listener until shutdown is signalled.
pub async fn run_listener(
    addr: SocketAddr,
    control: RadioControl,
    shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    serve(listener, control, shutdown_rx).await
}

async fn serve(
    listener: TcpListener,
    control: RadioControl,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!("Client connected: {}", peer);
                let control = control.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, peer, control).await {
                        error!("Client {} error: {:?}", peer, e);
                    }
                });
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Listener shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    control: RadioControl,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("Client {} disconnected", addr);
            break;
        }
        if line.len() > MAX_LINE_LEN {
            writer.write_all(b"error request too long\n").await?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!("{} -> {}", addr, trimmed);
        let resp_line = control.sdr_request(trimmed) + "\n";
        writer.write_all(resp_line.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trx_dsp::modem::{NullKeyer, NullModem, NullOscillator};
    use trx_dsp::{DspContext, Radio, RadioConfig};

    #[tokio::test]
    async fn test_request_reply_over_tcp() {
        let (_radio, control) = Radio::new(
            DspContext::new(),
            RadioConfig::default(),
            Box::new(NullModem),
            Box::new(NullKeyer),
            Box::new(NullOscillator::default()),
        )
        .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, control, shutdown_rx));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"volume=40\nvolume?\n\nbogus=1\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ok"));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("volume=40")
        );
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(reply.starts_with("error "), "{}", reply);

        writer.write_all(b"status?\n").await.unwrap();
        let status = lines.next_line().await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(json["volume"], 40);

        shutdown_tx.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
