//! Frame codec for the result channel.
//!
//! One frame per connection, bit-exact:
//! `[4-byte BE u32 id_len][id bytes][4-byte BE u32 payload_len][payload]`.
//! Reads are exact; a connection that closes early surfaces as an
//! `UnexpectedEof` io error and the frame is discarded.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// One decoded result frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub task_id: String,
    pub payload: Vec<u8>,
}

/// Errors while decoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Includes `UnexpectedEof` for connections closed mid-frame.
    #[error("frame read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("task id is not valid UTF-8")]
    BadId,
}

/// Read exactly one frame from the stream.
pub async fn read_frame<S>(stream: &mut S) -> Result<Frame, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];

    stream.read_exact(&mut len_buf).await?;
    let id_len = u32::from_be_bytes(len_buf) as usize;
    let mut id_buf = vec![0u8; id_len];
    stream.read_exact(&mut id_buf).await?;
    let task_id = String::from_utf8(id_buf).map_err(|_| FrameError::BadId)?;

    stream.read_exact(&mut len_buf).await?;
    let payload_len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; payload_len];
    stream.read_exact(&mut payload).await?;

    Ok(Frame { task_id, payload })
}

/// Write one frame to the stream.
pub async fn write_frame<S>(stream: &mut S, task_id: &str, payload: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&(task_id.len() as u32).to_be_bytes())
        .await?;
    stream.write_all(task_id.as_bytes()).await?;
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

/// Sender side of the protocol: connect, send one framed artifact, close.
pub async fn send_artifact(addr: &str, task_id: &str, payload: &[u8]) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    write_frame(&mut stream, task_id, payload).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, "abc", b"\x89PNG payload").await.unwrap();
        drop(client);

        let frame = read_frame(&mut server).await.unwrap();
        assert_eq!(frame.task_id, "abc");
        assert_eq!(frame.payload, b"\x89PNG payload");
    }

    #[tokio::test]
    async fn wire_bytes_are_big_endian_length_prefixed() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, "abc", b"\x01\x02").await.unwrap();
        drop(client);

        let mut wire = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut wire)
            .await
            .unwrap();
        assert_eq!(
            wire,
            [
                0, 0, 0, 3, // id length
                b'a', b'b', b'c', // id
                0, 0, 0, 2, // payload length
                1, 2, // payload
            ]
        );
    }

    #[tokio::test]
    async fn empty_payload_is_valid() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut client, "abc", b"").await.unwrap();
        drop(client);

        let frame = read_frame(&mut server).await.unwrap();
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        // Declare 100 payload bytes but send only 40.
        client.write_all(&3u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        client.write_all(&100u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0u8; 40]).await.unwrap();
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, FrameError::Io(e)
            if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn truncated_id_length_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0]).await.unwrap();
        drop(client);

        assert!(read_frame(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn non_utf8_id_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&2u32.to_be_bytes()).await.unwrap();
        client.write_all(&[0xff, 0xfe]).await.unwrap();
        client.write_all(&0u32.to_be_bytes()).await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server).await.unwrap_err(),
            FrameError::BadId
        ));
    }

    #[tokio::test]
    async fn send_artifact_over_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_frame(&mut stream).await.unwrap()
        });

        send_artifact(&addr.to_string(), "abc", b"artifact bytes")
            .await
            .unwrap();

        let frame = server.await.unwrap();
        assert_eq!(frame.task_id, "abc");
        assert_eq!(frame.payload, b"artifact bytes");
    }
}
