//! Framed connection over any async byte stream

use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::{
    FRAME_HEADER_SIZE, TransportError, TransportResult, decode_header, decode_payload,
    encode_frame,
};

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read and write timeout
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadlines applied to each network operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl IoTimeouts {
    /// Same deadline for every operation
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            read: timeout,
            write: timeout,
        }
    }
}

impl Default for IoTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_IO_TIMEOUT,
            write: DEFAULT_IO_TIMEOUT,
        }
    }
}

async fn with_deadline<T, F>(limit: Duration, operation: F) -> TransportResult<T>
where
    F: Future<Output = TransportResult<T>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}

/// A stream that sends and receives whole JSON frames
pub struct FramedConnection<S = TcpStream> {
    stream: S,
    timeouts: IoTimeouts,
    peer_addr: Option<SocketAddr>,
    bytes_sent: u64,
    bytes_received: u64,
}

impl FramedConnection<TcpStream> {
    /// Open a TCP connection to `addr`
    pub async fn connect(addr: &str, timeouts: IoTimeouts) -> TransportResult<Self> {
        debug!("Connecting to {}", addr);

        let stream = tokio::time::timeout(timeouts.connect, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(timeouts.connect))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{addr}: {e}")))?;

        debug!("Connected to {}", addr);
        Self::from_tcp(stream, timeouts)
    }

    /// Wrap an accepted TCP stream
    pub fn from_tcp(stream: TcpStream, timeouts: IoTimeouts) -> TransportResult<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok();
        let mut conn = Self::new(stream, timeouts);
        conn.peer_addr = peer_addr;
        Ok(conn)
    }
}

impl<S> FramedConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, timeouts: IoTimeouts) -> Self {
        Self {
            stream,
            timeouts,
            peer_addr: None,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Write one message as a frame
    pub async fn send<T: Serialize>(&mut self, message: &T) -> TransportResult<()> {
        let frame = encode_frame(message)?;
        let limit = self.timeouts.write;

        with_deadline(limit, async {
            self.stream.write_all(&frame).await?;
            self.stream.flush().await?;
            Ok::<_, TransportError>(())
        })
        .await?;

        self.bytes_sent += frame.len() as u64;
        trace!(len = frame.len(), "Sent frame");
        Ok(())
    }

    /// Read one frame and decode its payload
    pub async fn recv<T: DeserializeOwned>(&mut self) -> TransportResult<T> {
        let limit = self.timeouts.read;

        let payload = with_deadline(limit, async {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            self.stream
                .read_exact(&mut header)
                .await
                .map_err(closed_on_eof)?;

            let len = decode_header(header)?;
            let mut payload = vec![0u8; len];
            self.stream
                .read_exact(&mut payload)
                .await
                .map_err(closed_on_eof)?;
            Ok::<_, TransportError>(payload)
        })
        .await?;

        self.bytes_received += (FRAME_HEADER_SIZE + payload.len()) as u64;
        trace!(len = payload.len(), "Received frame");
        Ok(decode_payload(&payload)?)
    }

    /// Send `request` and wait for a single response
    pub async fn request<Req, Resp>(&mut self, request: &Req) -> TransportResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.send(request).await?;
        self.recv().await
    }

    /// Flush and close the write half
    pub async fn shutdown(&mut self) -> TransportResult<()> {
        with_deadline(self.timeouts.write, async {
            self.stream.shutdown().await?;
            Ok::<_, TransportError>(())
        })
        .await
    }

    pub fn timeouts(&self) -> IoTimeouts {
        self.timeouts
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

fn closed_on_eof(err: std::io::Error) -> TransportError {
    match err.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            TransportError::ConnectionClosed
        }
        _ => TransportError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use shared_protocol::{PeerMessage, ProtocolError};
    use tokio::io::{ReadBuf, duplex};

    fn pair() -> (
        FramedConnection<tokio::io::DuplexStream>,
        FramedConnection<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(4096);
        (
            FramedConnection::new(a, IoTimeouts::default()),
            FramedConnection::new(b, IoTimeouts::default()),
        )
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (mut alice, mut bob) = pair();

        alice.send(&PeerMessage::dh_public(8)).await.unwrap();
        alice
            .send(&PeerMessage::Ciphertext {
                values: vec![2790, 1],
            })
            .await
            .unwrap();

        let first: PeerMessage = bob.recv().await.unwrap();
        assert_eq!(first.into_dh_public().unwrap(), 8);
        let second: PeerMessage = bob.recv().await.unwrap();
        assert_eq!(second.into_ciphertext().unwrap(), vec![2790, 1]);

        assert_eq!(alice.bytes_sent(), bob.bytes_received());
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (alice, mut bob) = pair();
        drop(alice);

        let result: TransportResult<PeerMessage> = bob.recv().await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_truncated_frame() {
        let (a, b) = duplex(4096);
        let mut raw = a;
        let mut conn = FramedConnection::new(b, IoTimeouts::default());

        raw.write_all(&100u64.to_be_bytes()).await.unwrap();
        raw.write_all(b"{\"type\"").await.unwrap();
        drop(raw);

        let result: TransportResult<PeerMessage> = conn.recv().await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_header() {
        let (mut raw, b) = duplex(4096);
        let mut conn = FramedConnection::new(b, IoTimeouts::default());

        raw.write_all(&u64::MAX.to_be_bytes()).await.unwrap();

        let result: TransportResult<PeerMessage> = conn.recv().await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_garbage_payload() {
        let (mut raw, b) = duplex(4096);
        let mut conn = FramedConnection::new(b, IoTimeouts::default());

        raw.write_all(&4u64.to_be_bytes()).await.unwrap();
        raw.write_all(b"nope").await.unwrap();

        let result: TransportResult<PeerMessage> = conn.recv().await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(ProtocolError::Serialization(_)))
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (_silent, b) = duplex(4096);
        let timeouts = IoTimeouts::uniform(Duration::from_millis(50));
        let mut conn = FramedConnection::new(b, timeouts);

        let result: TransportResult<PeerMessage> = conn.recv().await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_shutdown_closes_write_half() {
        let (mut alice, mut bob) = pair();
        alice.send(&PeerMessage::dh_public(8)).await.unwrap();
        alice.shutdown().await.unwrap();

        let first: PeerMessage = bob.recv().await.unwrap();
        assert_eq!(first.into_dh_public().unwrap(), 8);
        let result: TransportResult<PeerMessage> = bob.recv().await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
    }

    /// Stream whose shutdown never completes
    struct StalledShutdown(tokio::io::DuplexStream);

    impl AsyncRead for StalledShutdown {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.0).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for StalledShutdown {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.0).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.0).poll_flush(cx)
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_shutdown_timeout() {
        let (_peer, b) = duplex(4096);
        let timeouts = IoTimeouts::uniform(Duration::from_millis(50));
        let mut conn = FramedConnection::new(StalledShutdown(b), timeouts);

        let err = conn.shutdown().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(limit) if limit == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = FramedConnection::connect(&addr.to_string(), IoTimeouts::default()).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_tcp_request_response() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = FramedConnection::from_tcp(stream, IoTimeouts::default()).unwrap();
            let request: PeerMessage = conn.recv().await.unwrap();
            let value = request.into_dh_public().unwrap();
            conn.send(&PeerMessage::dh_public(value + 1)).await.unwrap();
        });

        let mut client = FramedConnection::connect(&addr.to_string(), IoTimeouts::default())
            .await
            .unwrap();
        assert_eq!(client.peer_addr(), Some(addr));
        let response: PeerMessage = client.request(&PeerMessage::dh_public(8)).await.unwrap();
        assert_eq!(response.into_dh_public().unwrap(), 9);

        server.await.unwrap();
    }
}
