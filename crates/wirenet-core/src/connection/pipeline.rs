//! Steady-state read and write pipelines.
//!
//! Each active connection runs exactly two tasks on its reactor:
//!
//! - the **read loop**: header → body (if any) → push to the inbound queue →
//!   next header. One read is outstanding at a time and the loop only ends on
//!   an I/O error or shutdown.
//! - the **write loop**: the only owner of the outbound queue. It writes the
//!   front message's header, then its body, pops it, and moves on; when the
//!   queue is empty it idles until the next [`Connection::send`].

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::trace;

use crate::connection::Connection;
use crate::error::ErrorKind;
use crate::protocol::codec::{decode_header, encode_header, HEADER_SIZE};
use crate::protocol::message::{Message, MessageHeader, MessageKind};

/// A failed pipeline step.
pub(crate) type StepError = (ErrorKind, io::Error);

/// Reads one framed message.
pub(crate) async fn read_message<T, R>(reader: &mut R) -> Result<Message<T>, StepError>
where
    T: MessageKind,
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header_bytes)
        .await
        .map_err(|e| (ErrorKind::ReadHeader, e))?;
    let header = decode_header::<T>(&header_bytes)
        .map_err(|e| (ErrorKind::ReadHeader, io::Error::new(io::ErrorKind::InvalidData, e)))?;

    // Grows with the bytes that actually arrive, not with the declared size.
    let mut body = Vec::new();
    if header.size > 0 {
        let read = (&mut *reader)
            .take(u64::from(header.size))
            .read_to_end(&mut body)
            .await
            .map_err(|e| (ErrorKind::ReadBody, e))?;
        if read != header.size as usize {
            return Err((
                ErrorKind::ReadBody,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("body ended after {read} of {} bytes", header.size),
                ),
            ));
        }
    }
    Ok(Message::with_body(header.id, body))
}

/// Writes one framed message: header first, then the body when non-empty.
pub(crate) async fn write_message<T, W>(writer: &mut W, message: &Message<T>) -> Result<(), StepError>
where
    T: MessageKind,
    W: AsyncWrite + Unpin,
{
    let header = encode_header(&MessageHeader {
        id: message.id(),
        size: message.body.len() as u32,
    });
    writer
        .write_all(&header)
        .await
        .map_err(|e| (ErrorKind::WriteHeader, e))?;
    if !message.body.is_empty() {
        writer
            .write_all(&message.body)
            .await
            .map_err(|e| (ErrorKind::WriteBody, e))?;
    }
    Ok(())
}

pub(crate) async fn read_loop<T, R>(conn: Arc<Connection<T>>, mut reader: R)
where
    T: MessageKind,
    R: AsyncRead + Unpin,
{
    let shutdown = conn.shutdown_token().clone();
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = read_message::<T, _>(&mut reader) => result,
        };
        match result {
            Ok(message) => {
                trace!(conn_id = conn.id(), "received {message}");
                let owned = conn.package(message);
                conn.inbound().push_back(owned);
            }
            Err((kind, e)) => {
                conn.fail(kind, Some(e));
                break;
            }
        }
    }
    conn.finish_task();
}

pub(crate) async fn write_loop<T, W>(
    conn: Arc<Connection<T>>,
    mut writer: W,
    mut outbound: UnboundedReceiver<Message<T>>,
) where
    T: MessageKind,
    W: AsyncWrite + Unpin,
{
    let shutdown = conn.shutdown_token().clone();
    let mut pending: VecDeque<Message<T>> = VecDeque::new();

    'pipeline: loop {
        if pending.is_empty() {
            // Idle until the next send().
            let next = tokio::select! {
                _ = shutdown.cancelled() => break 'pipeline,
                next = outbound.recv() => next,
            };
            match next {
                Some(message) => pending.push_back(message),
                None => break 'pipeline,
            }
        }

        while let Some(front) = pending.front() {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break 'pipeline,
                result = write_message(&mut writer, front) => result,
            };
            if let Err((kind, e)) = result {
                conn.fail(kind, Some(e));
                break 'pipeline;
            }
            pending.pop_front();
            while let Ok(message) = outbound.try_recv() {
                pending.push_back(message);
            }
        }
    }

    // Half-close so the peer sees a clean EOF.
    let _ = writer.shutdown().await;
    conn.finish_task();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
