/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Minimal client for the pbsd control protocol.

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

use pbs_core::control::codec::STATUS_END;
use pbs_core::control::{CpuLine, Request, Response};

pub struct ControlClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Cannot connect to pbsd at {addr}"))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    async fn send(&mut self, req: &Request) -> Result<()> {
        trace!(request = %req, "→");
        let line = format!("{req}\n");
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("Control connection write failed")
    }

    async fn read_line(&mut self) -> Result<String> {
        let line = self
            .lines
            .next_line()
            .await
            .context("Control connection read failed")?
            .ok_or_else(|| anyhow!("pbsd closed the control connection"))?;
        trace!(response = %line, "←");
        Ok(line)
    }

    /// Send a single-line request and parse its reply.
    pub async fn request(&mut self, req: &Request) -> Result<Response> {
        if matches!(req, Request::Status) {
            bail!("use ControlClient::status for STATUS");
        }
        self.send(req).await?;
        let line = self.read_line().await?;
        line.parse::<Response>()
            .with_context(|| format!("Unexpected reply '{line}' to '{req}'"))
    }

    /// Like [`request`](Self::request) but turns `ERR` into an error.
    pub async fn expect_ok(&mut self, req: &Request) -> Result<()> {
        match self.request(req).await? {
            Response::Ok => Ok(()),
            Response::Err(reason) => bail!("'{req}' rejected: {reason}"),
            other => bail!("unexpected reply {other:?} to '{req}'"),
        }
    }

    pub async fn now_us(&mut self) -> Result<u64> {
        match self.request(&Request::Now).await? {
            Response::Now(us) => Ok(us),
            other => bail!("unexpected reply {other:?} to NOW"),
        }
    }

    pub async fn status(&mut self) -> Result<Vec<CpuLine>> {
        self.send(&Request::Status).await?;
        let mut cpus = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.trim() == STATUS_END {
                return Ok(cpus);
            }
            cpus.push(
                line.parse()
                    .with_context(|| format!("Unexpected status line '{line}'"))?,
            );
        }
    }
}
