//! On-disk record header codec.
//!
//! Layout (little-endian):
//!
//! ```text
//! i32 magic | str key | str etag | i64 server_date | i64 last_modified
//!           | i64 ttl | i64 soft_ttl | i32 count { str name | str value }*
//! ```
//!
//! where `str` is an `i64` byte length followed by UTF-8 bytes. The payload
//! follows the header with no length prefix.

use super::entry::{CacheEntry, Headers};
use bytes::{BufMut, Bytes};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Leading magic; bump on any layout change.
pub(crate) const CACHE_MAGIC: i32 = 0x2015_0306;

/// Everything in a record except the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    /// Full record size on disk; derived from the file length, never stored.
    pub size: u64,
    pub key: String,
    pub etag: Option<String>,
    pub server_date: i64,
    pub last_modified: i64,
    pub ttl: i64,
    pub soft_ttl: i64,
    pub response_headers: Headers,
}

impl RecordHeader {
    pub fn from_entry(key: &str, entry: &CacheEntry) -> Self {
        let mut header = Self {
            size: 0,
            key: key.to_string(),
            etag: entry.etag.clone(),
            server_date: entry.server_date,
            last_modified: entry.last_modified,
            ttl: entry.ttl,
            soft_ttl: entry.soft_ttl,
            response_headers: entry.response_headers.clone(),
        };
        header.size = (header.encoded_len() + entry.data.len()) as u64;
        header
    }

    pub fn to_entry(&self, data: Bytes) -> CacheEntry {
        CacheEntry {
            data,
            etag: self.etag.clone(),
            server_date: self.server_date,
            last_modified: self.last_modified,
            ttl: self.ttl,
            soft_ttl: self.soft_ttl,
            response_headers: self.response_headers.clone(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        let str_len = |s: &str| 8 + s.len();
        4 + str_len(&self.key)
            + str_len(self.etag.as_deref().unwrap_or(""))
            + 8 * 4
            + 4
            + self
                .response_headers
                .iter()
                .map(|(k, v)| str_len(k) + str_len(v))
                .sum::<usize>()
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i32_le(CACHE_MAGIC);
        put_str(buf, &self.key);
        put_str(buf, self.etag.as_deref().unwrap_or(""));
        buf.put_i64_le(self.server_date);
        buf.put_i64_le(self.last_modified);
        buf.put_i64_le(self.ttl);
        buf.put_i64_le(self.soft_ttl);
        buf.put_i32_le(self.response_headers.len() as i32);
        for (name, value) in &self.response_headers {
            put_str(buf, name);
            put_str(buf, value);
        }
    }

    /// Read a header from `reader`, never consuming more than `limit` bytes.
    ///
    /// Returns the header and the number of bytes it occupied, so the caller
    /// can compute the payload length as `limit - consumed`.
    pub async fn read_from<R>(reader: &mut R, limit: u64) -> io::Result<(Self, u64)>
    where
        R: AsyncRead + Unpin,
    {
        let mut r = HeaderReader {
            inner: reader,
            consumed: 0,
            limit,
        };

        let magic = r.read_i32().await?;
        if magic != CACHE_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad cache magic {:#x}", magic),
            ));
        }
        let key = r.read_string().await?;
        let etag = r.read_string().await?;
        let server_date = r.read_i64().await?;
        let last_modified = r.read_i64().await?;
        let ttl = r.read_i64().await?;
        let soft_ttl = r.read_i64().await?;

        let count = r.read_i32().await?;
        if count < 0 {
            return Err(invalid("negative header count"));
        }
        let mut response_headers = Headers::new();
        for _ in 0..count {
            let name = r.read_string().await?;
            let value = r.read_string().await?;
            response_headers.insert(name, value);
        }

        let header = Self {
            size: limit,
            key,
            etag: if etag.is_empty() { None } else { Some(etag) },
            server_date,
            last_modified,
            ttl,
            soft_ttl,
            response_headers,
        };
        Ok((header, r.consumed))
    }
}

fn put_str<B: BufMut>(buf: &mut B, s: &str) {
    buf.put_i64_le(s.len() as i64);
    buf.put_slice(s.as_bytes());
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

struct HeaderReader<'a, R> {
    inner: &'a mut R,
    consumed: u64,
    limit: u64,
}

impl<R: AsyncRead + Unpin> HeaderReader<'_, R> {
    fn reserve(&mut self, n: u64) -> io::Result<()> {
        if self.consumed.saturating_add(n) > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record truncated: need {} bytes at offset {}, size {}",
                    n, self.consumed, self.limit
                ),
            ));
        }
        self.consumed += n;
        Ok(())
    }

    async fn read_i32(&mut self) -> io::Result<i32> {
        self.reserve(4)?;
        self.inner.read_i32_le().await
    }

    async fn read_i64(&mut self) -> io::Result<i64> {
        self.reserve(8)?;
        self.inner.read_i64_le().await
    }

    async fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_i64().await?;
        if len < 0 {
            return Err(invalid("negative string length"));
        }
        self.reserve(len as u64)?;
        let mut buf = vec![0u8; len as usize];
        self.inner.read_exact(&mut buf).await?;
        String::from_utf8(buf).map_err(|_| invalid("string is not valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entry() -> CacheEntry {
        let mut headers = Headers::new();
        headers.insert("Content-Type".into(), "text/plain; charset=utf-8".into());
        headers.insert("ETag".into(), "\"v1\"".into());
        CacheEntry::new(&b"payload bytes"[..])
            .with_etag("\"v1\"")
            .with_server_date(1_700_000_000_000)
            .with_last_modified(1_699_999_000_000)
            .with_ttls(1_700_000_060_000, 1_700_000_120_000)
            .with_headers(headers)
    }

    #[tokio::test]
    async fn test_header_layout_and_decode() {
        let entry = sample_entry();
        let header = RecordHeader::from_entry("GET:https://example.com/a", &entry);

        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), header.encoded_len());
        assert_eq!(&buf[..4], &CACHE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&entry.data);

        let total = buf.len() as u64;
        assert_eq!(header.size, total);
        let mut cursor = Cursor::new(buf);
        let (decoded, consumed) = RecordHeader::read_from(&mut cursor, total).await.unwrap();
        assert_eq!(consumed as usize, header.encoded_len());
        assert_eq!(decoded.key, "GET:https://example.com/a");
        assert_eq!(decoded.etag.as_deref(), Some("\"v1\""));
        assert_eq!(decoded.ttl, entry.ttl);
        assert_eq!(decoded.soft_ttl, entry.soft_ttl);
        assert_eq!(decoded.response_headers, entry.response_headers);
    }

    #[tokio::test]
    async fn test_empty_etag_decodes_as_absent() {
        let entry = CacheEntry::new(Bytes::new());
        let header = RecordHeader::from_entry("k", &entry);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        let len = buf.len() as u64;
        let (decoded, _) = RecordHeader::read_from(&mut Cursor::new(buf), len)
            .await
            .unwrap();
        assert_eq!(decoded.etag, None);
        assert!(decoded.response_headers.is_empty());
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        buf.put_i32_le(0x1234_5678);
        buf.extend_from_slice(&[0u8; 64]);
        let len = buf.len() as u64;
        let err = RecordHeader::read_from(&mut Cursor::new(buf), len)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_header_rejected() {
        let header = RecordHeader::from_entry("some-key", &sample_entry());
        let mut buf = Vec::new();
        header.encode(&mut buf);
        buf.truncate(buf.len() - 5);
        let len = buf.len() as u64;
        let err = RecordHeader::read_from(&mut Cursor::new(buf), len)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_oversized_string_length_rejected() {
        let mut buf = Vec::new();
        buf.put_i32_le(CACHE_MAGIC);
        buf.put_i64_le(i64::MAX);
        let len = buf.len() as u64;
        assert!(RecordHeader::read_from(&mut Cursor::new(buf), len)
            .await
            .is_err());
    }
}
