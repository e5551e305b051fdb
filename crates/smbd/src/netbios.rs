//! NetBIOS session service framing (RFC 1002) over TCP.
//!
//! Every SMB message travels behind a 4-byte prefix: one type octet and a
//! 17-bit length (the high extension bit lives in the flags octet).
//! Keep-alive frames are tolerated and skipped.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{Error, Result};

/// Session Message.
pub const FRAME_MESSAGE: u8 = 0x00;
/// Session Keep Alive; ignored on receipt.
pub const FRAME_KEEP_ALIVE: u8 = 0x85;

/// Largest frame the 17-bit length can describe.
pub const MAX_FRAME_SIZE: usize = 0x1FFFF;

/// Reads the next session message, skipping keep-alives. `None` on a clean
/// peer close.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let mut prefix = [0u8; 4];
        match reader.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        }

        let frame_type = prefix[0];
        let length = (usize::from(prefix[1] & 0x01) << 16)
            | (usize::from(prefix[2]) << 8)
            | usize::from(prefix[3]);

        if frame_type == FRAME_KEEP_ALIVE {
            continue;
        }
        if frame_type != FRAME_MESSAGE {
            return Err(Error::InvalidParameter("unexpected NetBIOS frame type"));
        }
        if length > MAX_FRAME_SIZE {
            return Err(Error::InvalidParameter("NetBIOS frame over length cap"));
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        return Ok(Some(body));
    }
}

/// Frames and sends one session message.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_SIZE {
        return Err(Error::fault("response exceeds the NetBIOS frame cap"));
    }
    let prefix = [
        FRAME_MESSAGE,
        ((body.len() >> 16) & 0x01) as u8,
        ((body.len() >> 8) & 0xff) as u8,
        (body.len() & 0xff) as u8,
    ];
    writer.write_all(&prefix).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}
