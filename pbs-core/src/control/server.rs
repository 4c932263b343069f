/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! TCP front end for the control line protocol.
//!
//! Each connection is served by its own task; requests on one connection are
//! answered in order.  A `true` on the shutdown channel stops the accept loop
//! and every open connection.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::ControlInterface;

pub struct ControlServer {
    listener: TcpListener,
    control: Arc<ControlInterface>,
}

impl ControlServer {
    pub async fn bind(addr: &str, control: Arc<ControlInterface>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Cannot bind control listener on {addr}"))?;
        Ok(Self { listener, control })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Control listener has no local address")
    }

    /// Accept connections until `shutdown` turns `true` (or its sender is
    /// dropped).
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(addr = %self.local_addr()?, "control server listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "control connection accepted");
                        tokio::spawn(serve_connection(
                            stream,
                            peer,
                            Arc::clone(&self.control),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("control server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    control: Arc<ControlInterface>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(%peer, error = %e, "control read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let mut reply = control.handle_line(&line).to_string();
        reply.push('\n');
        if let Err(e) = writer.write_all(reply.as_bytes()).await {
            warn!(%peer, error = %e, "control write failed");
            break;
        }
    }

    debug!(%peer, "control connection closed");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use crate::clock::ManualClock;
    use crate::config::SchedulerSettings;
    use crate::control::Response;
    use crate::runtime::SchedulerRuntime;

    async fn start() -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<Result<()>>) {
        let rt = Arc::new(SchedulerRuntime::new(
            SchedulerSettings::default(),
            Arc::new(ManualClock::new(77)),
        ));
        rt.attach_run_queue(0);
        let control = Arc::new(ControlInterface::new(rt));
        let server = ControlServer::bind("127.0.0.1:0", control).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.serve(rx));
        (addr, tx, handle)
    }

    #[tokio::test]
    async fn answers_requests_in_order() {
        let (addr, shutdown, handle) = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(b"NOW\nPLAN 1 0 100 10\n\nPLAN 1 9 3 1\nLATENESS 1\nSTATUS\n")
            .await
            .unwrap();

        let mut replies = Vec::new();
        for _ in 0..6 {
            replies.push(lines.next_line().await.unwrap().unwrap());
        }
        assert_eq!(replies[0].parse::<Response>().unwrap(), Response::Now(77));
        assert_eq!(replies[1], "OK");
        assert!(replies[2].starts_with("ERR "));
        assert_eq!(replies[3], "NONE");
        assert_eq!(replies[4], "CPU 0 edf idle running=- ready=-");
        assert_eq!(replies[5], "END");

        shutdown.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropping_shutdown_sender_stops_server() {
        let (_addr, shutdown, handle) = start().await;
        drop(shutdown);
        handle.await.unwrap().unwrap();
    }
}
