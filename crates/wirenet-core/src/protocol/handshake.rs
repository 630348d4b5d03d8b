//! Admission and challenge/response handshake.
//!
//! Control bytes exchanged before any message flows:
//!
//! ```text
//! acceptor                          initiator
//! ────────                          ─────────
//! accept_flag:1  ─────────────────▶ (0 = denied, stop here)
//! challenge:8    ─────────────────▶
//!                ◀───────────────── response:8 = scramble(challenge)
//! result_flag:1  ─────────────────▶ (0 = failed)
//! ```
//!
//! All 8-byte values are little-endian `u64`.
//!
//! **This is not authentication.** [`scramble`] is a fixed, public bit shuffle
//! that keeps port scanners and unrelated clients from reaching the message
//! pipeline. Anyone who has this code can pass the check.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ErrorKind, HandshakeError};

/// First XOR key applied by [`scramble`].
pub const SCRAMBLE_KEY_IN: u64 = 0xDEAD_BEEF_C0DE_CAFE;

/// Second XOR key applied by [`scramble`].
pub const SCRAMBLE_KEY_OUT: u64 = 0xC0DE_FACE_1234_5678;

const FLAG_YES: u8 = 1;
const FLAG_NO: u8 = 0;

/// Deterministic challenge transform shared by both roles.
///
/// `out = swap_nibbles(input ^ K1) ^ K2`, where the nibble swap exchanges
/// the high and low four bits of every byte.
pub fn scramble(input: u64) -> u64 {
    let out = input ^ SCRAMBLE_KEY_IN;
    let out = ((out & 0xF0F0_F0F0_F0F0_F0F0) >> 4) | ((out & 0x0F0F_0F0F_0F0F_0F0F) << 4);
    out ^ SCRAMBLE_KEY_OUT
}

/// Produces a fresh challenge from a monotonic nanosecond counter.
///
/// The counter is offset by the wall clock at first use so values differ
/// across process restarts.
pub fn generate_challenge() -> u64 {
    static ORIGIN: OnceLock<(Instant, u64)> = OnceLock::new();
    let (start, offset) = ORIGIN.get_or_init(|| {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        (Instant::now(), wall)
    });
    offset.wrapping_add(start.elapsed().as_nanos() as u64)
}

/// Runs the acceptor side of the handshake on a freshly accepted stream.
///
/// `admitted` is the application's admission decision. A denied peer receives
/// only the deny flag.
///
/// # Errors
///
/// - [`ErrorKind::WriteAccepted`] if the accept flag cannot be written.
/// - [`ErrorKind::BadAccepted`] if `admitted` is false.
/// - [`ErrorKind::WriteValidation`] / [`ErrorKind::ReadValidation`] on
///   challenge or response I/O failure.
/// - [`ErrorKind::WriteValidationResult`] if the result flag cannot be written.
/// - [`ErrorKind::BadValidation`] if the response did not match.
pub async fn accept<S>(stream: &mut S, admitted: bool, challenge: u64) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let flag = if admitted { FLAG_YES } else { FLAG_NO };
    stream
        .write_all(&[flag])
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::WriteAccepted, e))?;
    if !admitted {
        return Err(HandshakeError::rejected(ErrorKind::BadAccepted));
    }

    stream
        .write_all(&challenge.to_le_bytes())
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::WriteValidation, e))?;

    let mut response = [0u8; 8];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::ReadValidation, e))?;

    let passed = u64::from_le_bytes(response) == scramble(challenge);
    let result = if passed { FLAG_YES } else { FLAG_NO };
    stream
        .write_all(&[result])
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::WriteValidationResult, e))?;

    if passed {
        Ok(())
    } else {
        Err(HandshakeError::rejected(ErrorKind::BadValidation))
    }
}

/// Runs the initiator side of the handshake on a freshly connected stream.
///
/// # Errors
///
/// - [`ErrorKind::ReadAccepted`] / [`ErrorKind::BadAccepted`] if the accept
///   flag cannot be read or says "denied".
/// - [`ErrorKind::ReadValidation`] / [`ErrorKind::WriteValidation`] on
///   challenge or response I/O failure.
/// - [`ErrorKind::ReadValidationResult`] / [`ErrorKind::BadValidation`] if the
///   result flag cannot be read or says "failed".
pub async fn initiate<S>(stream: &mut S) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let accepted = stream
        .read_u8()
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::ReadAccepted, e))?;
    if accepted == FLAG_NO {
        return Err(HandshakeError::rejected(ErrorKind::BadAccepted));
    }

    let mut challenge = [0u8; 8];
    stream
        .read_exact(&mut challenge)
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::ReadValidation, e))?;

    let response = scramble(u64::from_le_bytes(challenge));
    stream
        .write_all(&response.to_le_bytes())
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::WriteValidation, e))?;

    let result = stream
        .read_u8()
        .await
        .map_err(|e| HandshakeError::io(ErrorKind::ReadValidationResult, e))?;
    if result == FLAG_NO {
        return Err(HandshakeError::rejected(ErrorKind::BadValidation));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
