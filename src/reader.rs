// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP reader: sole owner of the ingress socket, pushes datagrams into
//! the bounded queue shared with the worker pool.

use crate::metrics::SharedStats;
use async_channel::Sender;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// A received datagram: source address plus an owned copy of the
/// payload bytes.
pub type Datagram = (SocketAddr, Vec<u8>);

/// Bind a non-blocking UDP socket tuned for a high-rate ingest path.
pub fn bind_udp_socket(port: u16) -> io::Result<UdpSocket> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().expect("valid bind addr");
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(target_os = "linux")]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Owns the UDP socket and feeds the bounded queue until cancelled.
pub struct UdpReader {
    socket: UdpSocket,
    queue_tx: Sender<Datagram>,
    read_timeout: Duration,
    scratch_len: usize,
    stats: SharedStats,
    cancel: CancellationToken,
}

impl UdpReader {
    pub fn new(
        socket: UdpSocket,
        queue_tx: Sender<Datagram>,
        read_timeout: Duration,
        scratch_len: usize,
        stats: SharedStats,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket,
            queue_tx,
            read_timeout,
            scratch_len,
            stats,
            cancel,
        }
    }

    /// Run the receive loop until the cancellation token fires. The
    /// socket is dropped when this returns, which is what unblocks
    /// `recv_from` on shutdown if the token fires mid-read.
    pub async fn run(mut self) {
        let mut scratch = vec![0u8; self.scratch_len];

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.stats.set_queue_depth(self.queue_tx.len() as i64);

            match tokio::time::timeout(self.read_timeout, self.socket.recv_from(&mut scratch)).await
            {
                Ok(Ok((len, remote))) => {
                    self.stats.record_ingress(len as u64);
                    let bytes = scratch[..len].to_vec();
                    tokio::select! {
                        result = self.queue_tx.send((remote, bytes)) => {
                            if result.is_err() {
                                // Queue closed underneath us; shutting down.
                                break;
                            }
                        }
                        _ = self.cancel.cancelled() => break,
                    }
                }
                Ok(Err(err)) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    tracing::warn!(error = %err, "udp read error");
                    self.stats.record_reader_error();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(_elapsed) => {
                    // No datagram within the deadline; loop and re-check cancellation.
                }
            }
        }

        tracing::info!("udp reader stopped");
    }
}
