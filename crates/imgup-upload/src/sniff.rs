//! Content sniffing
//!
//! Uploads are classified from their leading bytes. Whatever the client
//! claims (filename extension, `Content-Type` of the multipart part) is
//! attacker-controlled and never consulted here.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::policy::TypePolicy;
use crate::service::{UploadError, UploadResult};

/// Number of leading bytes examined when classifying a stream
pub const SNIFF_LEN: usize = 512;

/// Fallback type for content with no recognizable signature
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Type reported for content that looks like text
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Classify the MIME type of `head` from its byte signature.
///
/// Accepted image types are only reported when their full signature is
/// present; `infer` classifies everything else. Best effort on short input:
/// an empty or truncated head simply fails to match any signature.
pub fn sniff(head: &[u8]) -> String {
    let head = &head[..head.len().min(SNIFF_LEN)];

    if let Some(mime) = image_signature(head) {
        return mime.to_string();
    }

    // infer matches GIF and WebP on partial signatures
    if let Some(kind) = infer::get(head) {
        if TypePolicy.resolve(kind.mime_type()).is_none() {
            return kind.mime_type().to_string();
        }
    }

    if looks_like_text(head) {
        TEXT_PLAIN.to_string()
    } else {
        OCTET_STREAM.to_string()
    }
}

/// Strict signatures for the accepted image types
fn image_signature(head: &[u8]) -> Option<&'static str> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPEG: &[u8] = b"\xFF\xD8\xFF";

    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if head.starts_with(PNG) {
        Some("image/png")
    } else if head.starts_with(JPEG) {
        Some("image/jpeg")
    } else if head.len() >= 14 && head.starts_with(b"RIFF") && &head[8..14] == b"WEBPVP" {
        Some("image/webp")
    } else {
        None
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    !head.is_empty()
        && !head
            .iter()
            .any(|&b| matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F))
}

/// Buffering wrapper that lets one byte stream be read twice.
///
/// The first [`SNIFF_LEN`] bytes are pulled into a retained buffer for
/// classification; [`SniffedStream::drain`] then appends the rest of the
/// source to the same buffer, so the sniffed bytes are never lost from the
/// object body. The source is read exactly once.
pub struct SniffedStream<R> {
    inner: R,
    buf: BytesMut,
    max_len: usize,
}

impl<R> SniffedStream<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `inner`, refusing to buffer more than `max_len` bytes in total
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(SNIFF_LEN),
            max_len,
        }
    }

    /// Read up to [`SNIFF_LEN`] bytes and return them.
    ///
    /// Keeps reading until the window is full or the source hits EOF, so a
    /// short first read from a network body is not mistaken for a short
    /// file.
    pub async fn sniff_head(&mut self) -> UploadResult<&[u8]> {
        let mut chunk = [0u8; SNIFF_LEN];
        while self.buf.len() < SNIFF_LEN {
            let want = SNIFF_LEN - self.buf.len();
            let n = self.inner.read(&mut chunk[..want]).await?;
            if n == 0 {
                break;
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        self.check_len()?;
        Ok(&self.buf[..])
    }

    /// Read the remainder of the source into the retained buffer
    pub async fn drain(&mut self) -> UploadResult<()> {
        let mut chunk = vec![0u8; 8 * 1024];
        loop {
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return Ok(());
            }
            self.buf.extend_from_slice(&chunk[..n]);
            self.check_len()?;
        }
    }

    /// Consume the wrapper, yielding everything read from the source
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    fn check_len(&self) -> UploadResult<()> {
        if self.buf.len() > self.max_len {
            return Err(UploadError::TooLarge { max: self.max_len });
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_sniff_images() {
        assert_eq!(sniff(&png(16)), "image/png");
        assert_eq!(sniff(&jpeg()), "image/jpeg");
        assert_eq!(sniff(&gif()), "image/gif");
        assert_eq!(sniff(&webp()), "image/webp");
    }

    #[test]
    fn test_sniff_bare_jpeg_signature() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF]), "image/jpeg");
    }

    #[test]
    fn test_sniff_non_images() {
        assert_eq!(sniff(b""), OCTET_STREAM);
        assert_eq!(sniff(b"hello, world\n"), TEXT_PLAIN);
        assert_eq!(sniff(&[0x00, 0x13, 0x37, 0x00, 0x42]), OCTET_STREAM);
        assert_eq!(sniff(b"%PDF-1.7\n"), "application/pdf");
    }

    #[test]
    fn test_sniff_requires_full_image_signatures() {
        assert_eq!(sniff(b"GIF87a\x01\x00\x01\x00"), "image/gif");
        assert_eq!(sniff(b"GIF is my favourite format, honestly"), TEXT_PLAIN);
        assert_eq!(sniff(b"Hi thereWEBP <script>alert(1)</script>"), TEXT_PLAIN);

        let near_misses: [&[u8]; 4] = [
            b"GIF90a and then some",
            b"RIFF\x24\x00\x00\x00WEBPxx and more",
            b"\x89PNG\r\n",
            b"\xFF\xD8",
        ];
        for head in near_misses {
            let mime = sniff(head);
            assert!(TypePolicy.resolve(&mime).is_none(), "{:?} -> {}", head, mime);
        }
    }

    #[test]
    fn test_sniff_ignores_bytes_past_window() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.extend_from_slice(&PNG_SIGNATURE);
        assert_eq!(sniff(&data), TEXT_PLAIN);
    }

    #[tokio::test]
    async fn test_stream_keeps_sniffed_bytes() {
        let data = png(4096);
        let mut stream = SniffedStream::new(&data[..], usize::MAX);

        let head = stream.sniff_head().await.unwrap();
        assert_eq!(head.len(), SNIFF_LEN);
        assert_eq!(head, &data[..SNIFF_LEN]);

        stream.drain().await.unwrap();
        assert_eq!(stream.into_bytes(), Bytes::from(data));
    }

    #[tokio::test]
    async fn test_stream_short_input() {
        let data = [0xFF, 0xD8, 0xFF];
        let mut stream = SniffedStream::new(&data[..], usize::MAX);

        let head = stream.sniff_head().await.unwrap();
        assert_eq!(head, &data[..]);

        stream.drain().await.unwrap();
        assert_eq!(stream.into_bytes().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_fragmented_reads() {
        // Deliver the body a few bytes at a time, like a slow network peer
        let data = png(1024);
        let mut reader = ChunkedReader::new(&data, 7);
        let mut stream = SniffedStream::new(&mut reader, usize::MAX);

        let head = stream.sniff_head().await.unwrap();
        assert_eq!(head.len(), SNIFF_LEN);
        stream.drain().await.unwrap();
        assert_eq!(stream.into_bytes().len(), data.len());
    }

    #[tokio::test]
    async fn test_stream_enforces_limit() {
        let data = png(2048);
        let mut stream = SniffedStream::new(&data[..], 1024);

        stream.sniff_head().await.unwrap();
        let result = stream.drain().await;
        assert!(matches!(result, Err(UploadError::TooLarge { max: 1024 })));
    }

    struct ChunkedReader {
        chunks: Vec<Bytes>,
        pos: usize,
    }

    impl ChunkedReader {
        fn new(data: &[u8], chunk: usize) -> Self {
            Self {
                chunks: data.chunks(chunk).map(Bytes::copy_from_slice).collect(),
                pos: 0,
            }
        }
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            let pos = self.pos;
            if let Some(chunk) = self.chunks.get(pos).cloned() {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n == chunk.len() {
                    self.pos += 1;
                } else {
                    self.chunks[pos] = chunk.slice(n..);
                }
            }
            std::task::Poll::Ready(Ok(()))
        }
    }
}
