//! Blocking client.
//!
//! Each call runs to completion on the calling thread. Response bodies are
//! pulled through [`Lines`] in fixed-size reads; the protocol handling is the
//! same as the async [`Client`](crate::Client).
//!
//! ```rust,no_run
//! use repligit::blocking;
//!
//! # fn main() -> repligit::Result<()> {
//! let refs = blocking::discover_refs("https://github.com/spack/spack.git", None)?;
//! for (name, id) in &refs {
//!     println!("{id}\t{name}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::lines::{Line, LineBuffer};
use crate::pktline::{self, parse_length, strip_newline, PktLine};
use crate::protocol::discovery::{parse_advertisement, RefAdvertisement, RefMap};
use crate::protocol::fetch::{self, FetchStatus};
use crate::protocol::push::{self, RefUpdate};
use crate::protocol::{self as proto, RECEIVE_PACK_REQUEST, UPLOAD_PACK_REQUEST};
use crate::transport::{check_status, Credentials, Method, Request, Transport};
use crate::{GitError, ObjectId, Result, USER_AGENT};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::io::{self, Read};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bytes requested from the body per read.
pub const CHUNK_SIZE: usize = 512;

/// Pull-based line producer over a blocking reader.
pub struct Lines<R> {
    reader: R,
    buffer: LineBuffer,
    chunk: Vec<u8>,
    eof: bool,
}

impl<R: Read> Lines<R> {
    /// Creates a line producer reading [`CHUNK_SIZE`] bytes at a time.
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, CHUNK_SIZE)
    }

    /// Creates a line producer with a custom read size.
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            buffer: LineBuffer::new(),
            chunk: vec![0; chunk_size.max(1)],
            eof: false,
        }
    }

    /// Reads one chunk into the buffer. Returns false at end of stream.
    fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        loop {
            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.buffer.extend(&self.chunk[..n]);
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Returns the next line, or the unterminated remainder at end of stream.
    pub fn next_line(&mut self) -> Result<Option<Line>> {
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(Some(line));
            }
            if !self.fill()? {
                return Ok(self.buffer.finish());
            }
        }
    }

    /// Returns exactly `n` bytes, or `None` if the stream ends first.
    pub fn read_exact(&mut self, n: usize) -> Result<Option<Bytes>> {
        loop {
            if let Some(bytes) = self.buffer.take(n) {
                return Ok(Some(bytes));
            }
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Reads one frame by its declared length, leaving what follows untouched.
    ///
    /// Returns `None` if the stream ended cleanly before a header.
    pub fn read_frame(&mut self) -> Result<Option<PktLine>> {
        let Some(header) = self.read_exact(4)? else {
            if self.buffer.is_empty() {
                return Ok(None);
            }
            return Err(GitError::InvalidPktLine(
                "truncated length prefix".to_string(),
            ));
        };

        let len = parse_length(&header)?;
        if len == 0 {
            return Ok(Some(PktLine::Flush));
        }
        let payload = self.read_exact(len - 4)?.ok_or_else(|| {
            GitError::InvalidPktLine(format!("frame declares {len} bytes but the response ended"))
        })?;
        Ok(Some(PktLine::Data(strip_newline(payload))))
    }

    /// Hands over everything not yet consumed as a raw reader.
    pub fn into_pack_reader(mut self) -> PackReader<R> {
        let buffered = self.buffer.take_all();
        PackReader {
            inner: io::Cursor::new(buffered).chain(self.reader),
        }
    }
}

impl<R: Read> Iterator for Lines<R> {
    type Item = Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

/// Packfile bytes following a fetch status line.
///
/// Reads lazily from the open response; nothing past the status line has been
/// interpreted.
pub struct PackReader<R> {
    inner: io::Chain<io::Cursor<Bytes>, R>,
}

impl<R: Read> Read for PackReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Packfile reader over a live `reqwest` response.
pub type HttpPackReader = PackReader<reqwest::blocking::Response>;

/// Blocking transport backed by `reqwest::blocking`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Creates a transport without a request timeout.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(None)
            .build()?;
        Ok(Self { client })
    }

    /// Creates a transport whose requests time out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps a preconfigured client.
    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    type Body = reqwest::blocking::Response;

    fn send(&self, request: Request) -> Result<Self::Body> {
        debug!(method = ?request.method, url = %request.url, bytes = request.body.len(), "sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).body(request.body.clone()),
        };
        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some((username, password)) = request.basic_auth() {
            builder = builder.basic_auth(username, password);
        }

        let response = builder.send()?;
        check_status(&request.url, response.status().as_u16())?;
        Ok(response)
    }
}

/// Blocking smart HTTP client.
#[derive(Debug, Clone)]
pub struct Client<T = HttpTransport> {
    transport: T,
}

impl Client {
    /// Creates a client on the default `reqwest` transport.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new()?))
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client on a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches the full ref advertisement, including server capabilities.
    pub fn discover(
        &self,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<RefAdvertisement> {
        let url = proto::info_refs_url(base_url);
        debug!(url = %url, "discovering refs");

        let body = self.transport.send(Request::get(url, credentials))?;
        let advertisement = parse_advertisement(pktline::decode(Lines::new(body)))?;

        debug!(refs = advertisement.refs.len(), "ref advertisement parsed");
        Ok(advertisement)
    }

    /// Lists the remote's refs.
    pub fn discover_refs(&self, base_url: &str, credentials: Option<&Credentials>) -> Result<RefMap> {
        Ok(self.discover(base_url, credentials)?.refs)
    }

    /// Negotiates a packfile for `want`.
    ///
    /// Returns `None` when the server answers with anything but `NAK`/`ACK`.
    /// The returned reader streams the packfile straight off the response.
    pub fn fetch_pack<'a, I>(
        &self,
        base_url: &str,
        want: &ObjectId,
        haves: I,
        credentials: Option<&Credentials>,
    ) -> Result<Option<PackReader<T::Body>>>
    where
        I: IntoIterator<Item = &'a ObjectId>,
    {
        let body = fetch::build_request(want, haves)?;
        let url = proto::upload_pack_url(base_url);
        debug!(url = %url, want = %want, bytes = body.len(), "requesting packfile");

        let response = self
            .transport
            .send(Request::post(url, UPLOAD_PACK_REQUEST, body, credentials))?;
        let mut lines = Lines::new(response);
        let status = lines.read_frame()?.ok_or_else(|| {
            GitError::Protocol("upload-pack response has no status line".to_string())
        })?;

        let status = FetchStatus::from_pkt(&status);
        if !status.has_packfile() {
            warn!(status = ?status, "upload-pack sent no packfile");
            return Ok(None);
        }
        debug!(status = ?status, "packfile follows");
        Ok(Some(lines.into_pack_reader()))
    }

    /// Pushes `packfile` and updates one ref.
    ///
    /// Succeeds only if the report reads `unpack ok` then `ok <ref>`.
    pub fn send_pack<P: Read>(
        &self,
        base_url: &str,
        update: &RefUpdate,
        mut packfile: P,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let mut pack = Vec::new();
        packfile.read_to_end(&mut pack)?;
        let body = push::build_request(update, &pack)?;

        let url = proto::receive_pack_url(base_url);
        debug!(url = %url, ref_name = %update.ref_name, bytes = body.len(), "sending pack");

        let response = self
            .transport
            .send(Request::post(url, RECEIVE_PACK_REQUEST, body, credentials))?;
        let mut pkts = pktline::decode(Lines::new(response));
        let unpack = pkts.next().transpose()?;
        let ref_status = pkts.next().transpose()?;
        push::check_report(unpack.as_ref(), ref_status.as_ref(), &update.ref_name)?;

        info!(ref_name = %update.ref_name, old = %update.old, new = %update.new, "push accepted");
        Ok(())
    }
}

/// Lists a remote's refs with a fresh client.
pub fn discover_refs(base_url: &str, credentials: Option<&Credentials>) -> Result<RefMap> {
    Client::new()?.discover_refs(base_url, credentials)
}

/// Fetches a packfile with a fresh client.
pub fn fetch_pack<'a, I>(
    base_url: &str,
    want: &ObjectId,
    haves: I,
    credentials: Option<&Credentials>,
) -> Result<Option<HttpPackReader>>
where
    I: IntoIterator<Item = &'a ObjectId>,
{
    Client::new()?.fetch_pack(base_url, want, haves, credentials)
}

/// Pushes a packfile with a fresh client.
pub fn send_pack<P: Read>(
    base_url: &str,
    update: &RefUpdate,
    packfile: P,
    credentials: Option<&Credentials>,
) -> Result<()> {
    Client::new()?.send_pack(base_url, update, packfile, credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{advertisement, oid, ChunkedReader, MockTransport};

    #[test]
    fn test_lines_chunk_sizes_agree() {
        let data = b"001e# service=git-upload-pack\r\n0000003fabc\nlast".to_vec();
        let whole: Vec<Line> = Lines::new(io::Cursor::new(data.clone()))
            .collect::<Result<_>>()
            .unwrap();
        for size in 1..8 {
            let lines: Vec<Line> = Lines::new(ChunkedReader::new(data.clone(), size))
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(lines, whole, "chunk size {size}");
        }
        assert_eq!(whole.last().unwrap(), "last");
    }

    #[test]
    fn test_read_frame_then_pack_reader() {
        let mut data = b"0008NAK\n".to_vec();
        data.extend_from_slice(b"PACK\n\r\n\x00\xff");
        let mut lines = Lines::with_chunk_size(ChunkedReader::new(data, 3), 3);

        assert_eq!(lines.read_frame().unwrap(), Some(PktLine::from_string("NAK")));
        let mut pack = Vec::new();
        lines.into_pack_reader().read_to_end(&mut pack).unwrap();
        assert_eq!(pack, b"PACK\n\r\n\x00\xff");
    }

    #[test]
    fn test_read_frame_eof_and_truncation() {
        let mut empty = Lines::new(io::Cursor::new(Vec::new()));
        assert_eq!(empty.read_frame().unwrap(), None);

        let mut short_header = Lines::new(io::Cursor::new(b"00".to_vec()));
        assert!(short_header.read_frame().is_err());

        let mut short_payload = Lines::new(io::Cursor::new(b"0010NAK".to_vec()));
        assert!(short_payload.read_frame().is_err());

        let mut bad = Lines::new(io::Cursor::new(b"0002".to_vec()));
        assert!(matches!(bad.read_frame(), Err(GitError::InvalidPktLine(_))));
    }

    #[test]
    fn test_discover_rejects_advertisement_cut_mid_frame() {
        let a = "a".repeat(40);
        let mut body = advertisement(&[(&a, "refs/heads/main"), (&a, "refs/heads/develop")]);
        body.truncate(body.len() - "p\n0000".len());
        for size in [1, 3, 64] {
            let client = Client::with_transport(MockTransport::new(size).respond(body.clone()));
            let err = client
                .discover_refs("https://example.com/repo.git", None)
                .unwrap_err();
            assert!(matches!(err, GitError::InvalidPktLine(_)), "chunk size {size}");
        }
    }

    #[test]
    fn test_discover_refs() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        let body = advertisement(&[(&a, "refs/heads/main"), (&b, "refs/heads/dev")]);
        let client = Client::with_transport(MockTransport::new(5).respond(body));

        let refs = client
            .discover_refs("https://example.com/repo.git", None)
            .unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs["refs/heads/main"], a.as_str());
        assert_eq!(refs["refs/heads/dev"], b.as_str());

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(
            requests[0].url,
            "https://example.com/repo.git/info/refs?service=git-upload-pack"
        );
    }

    #[test]
    fn test_discover_wrong_service_line() {
        let body = b"001f# service=git-receive-pack\n0000".to_vec();
        let client = Client::with_transport(MockTransport::new(64).respond(body));
        let err = client.discover_refs("https://example.com/repo.git", None).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_discover_transport_error() {
        let client = Client::with_transport(MockTransport::new(64).fail(404));
        let err = client.discover_refs("https://example.com/repo.git", None).unwrap_err();
        assert!(matches!(err, GitError::Transport { status: 404, .. }));
    }

    #[test]
    fn test_fetch_pack_returns_raw_bytes() {
        let mut body = b"0008NAK\n".to_vec();
        body.extend_from_slice(b"PACK\x00\x00\x00\x02raw\nbytes");
        let client = Client::with_transport(MockTransport::new(2).respond(body));

        let haves = [oid('b'), oid('c')];
        let mut pack = client
            .fetch_pack("https://example.com/repo.git", &oid('a'), &haves, None)
            .unwrap()
            .expect("packfile");
        let mut bytes = Vec::new();
        pack.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"PACK\x00\x00\x00\x02raw\nbytes");

        let request = &client.transport().requests()[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://example.com/repo.git/git-upload-pack");
        assert_eq!(request.content_type, Some(UPLOAD_PACK_REQUEST));
        assert_eq!(
            request.body,
            fetch::build_request(&oid('a'), &haves).unwrap()
        );
    }

    #[test]
    fn test_fetch_pack_err_status_is_none() {
        let body = b"0012ERR forbidden\n".to_vec();
        let client = Client::with_transport(MockTransport::new(4).respond(body));
        let pack = client
            .fetch_pack("https://example.com/repo.git", &oid('a'), Vec::<&ObjectId>::new(), None)
            .unwrap();
        assert!(pack.is_none());
    }

    #[test]
    fn test_send_pack_ok() {
        let body = b"000eunpack ok\n0017ok refs/heads/main\n0000".to_vec();
        let client = Client::with_transport(MockTransport::new(3).respond(body));
        let update = RefUpdate::new("refs/heads/main", oid('a'), oid('b'));
        let creds = Credentials::basic("user", "token");

        client
            .send_pack(
                "https://example.com/repo.git",
                &update,
                io::Cursor::new(b"PACKDATA".to_vec()),
                Some(&creds),
            )
            .unwrap();

        let request = &client.transport().requests()[0];
        assert_eq!(request.url, "https://example.com/repo.git/git-receive-pack");
        assert_eq!(request.content_type, Some(RECEIVE_PACK_REQUEST));
        assert_eq!(request.body, push::build_request(&update, b"PACKDATA").unwrap());
        assert_eq!(request.basic_auth(), Some(("user", Some("token"))));
    }

    #[test]
    fn test_send_pack_rejected_keeps_reason() {
        let body = b"000eunpack ok\n0028ng refs/heads/main non-fast-forward\n0000".to_vec();
        let client = Client::with_transport(MockTransport::new(7).respond(body));
        let update = RefUpdate::new("refs/heads/main", oid('a'), oid('b'));

        let err = client
            .send_pack("https://example.com/repo.git", &update, io::empty(), None)
            .unwrap_err();
        match err {
            GitError::PushRejected(reason) => {
                assert_eq!(reason, "ng refs/heads/main non-fast-forward")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fetch_into_push_pipeline() {
        let mut fetch_body = b"0008NAK\n".to_vec();
        fetch_body.extend_from_slice(b"PACK-streamed");
        let source = Client::with_transport(MockTransport::new(4).respond(fetch_body));
        let destination = Client::with_transport(
            MockTransport::new(4).respond(b"000eunpack ok\n0017ok refs/heads/main\n".to_vec()),
        );

        let pack = source
            .fetch_pack("https://src.example/repo.git", &oid('a'), Vec::<&ObjectId>::new(), None)
            .unwrap()
            .unwrap();
        let update = RefUpdate::create("refs/heads/main", oid('a'));
        destination
            .send_pack("https://dst.example/repo.git", &update, pack, None)
            .unwrap();

        let sent = &destination.transport().requests()[0].body;
        assert!(sent.ends_with(b"0000PACK-streamed"));
    }
}
