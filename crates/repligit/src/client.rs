//! Async client.
//!
//! The operations here suspend on every body read, so many of them can run
//! concurrently on one runtime. Line splitting, frame decoding and the
//! protocol rules are shared with [`crate::blocking`].

use crate::lines::{Line, LineBuffer};
use crate::pktline::{decode_stream, parse_length, strip_newline, PktLine};
use crate::protocol::discovery::{AdvertisementParser, RefAdvertisement, RefMap};
use crate::protocol::fetch::{self, FetchStatus};
use crate::protocol::push::{self, RefUpdate};
use crate::protocol::{self as proto, RECEIVE_PACK_REQUEST, UPLOAD_PACK_REQUEST};
use crate::transport::{check_status, AsyncTransport, BodyStream, Credentials, Method, Request};
use crate::{GitError, ObjectId, Result, USER_AGENT};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use std::pin::pin;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Suspend-on-read line producer over a byte stream.
pub struct Lines<S> {
    stream: S,
    buffer: LineBuffer,
    eof: bool,
}

impl<S> Lines<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    /// Creates a line producer over `stream`.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: LineBuffer::new(),
            eof: false,
        }
    }

    async fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        match self.stream.next().await {
            Some(Ok(chunk)) => {
                self.buffer.extend(&chunk);
                Ok(true)
            }
            Some(Err(e)) => {
                self.eof = true;
                Err(e)
            }
            None => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    /// Returns the next line, or the unterminated remainder at end of stream.
    pub async fn next_line(&mut self) -> Result<Option<Line>> {
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(Some(line));
            }
            if !self.fill().await? {
                return Ok(self.buffer.finish());
            }
        }
    }

    /// Returns exactly `n` bytes, or `None` if the stream ends first.
    pub async fn read_exact(&mut self, n: usize) -> Result<Option<Bytes>> {
        loop {
            if let Some(bytes) = self.buffer.take(n) {
                return Ok(Some(bytes));
            }
            if !self.fill().await? {
                return Ok(None);
            }
        }
    }

    /// Reads one frame by its declared length, leaving what follows untouched.
    pub async fn read_frame(&mut self) -> Result<Option<PktLine>> {
        let Some(header) = self.read_exact(4).await? else {
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
        let payload = self.read_exact(len - 4).await?.ok_or_else(|| {
            GitError::InvalidPktLine(format!("frame declares {len} bytes but the response ended"))
        })?;
        Ok(Some(PktLine::Data(strip_newline(payload))))
    }

    /// Collects everything not yet consumed.
    pub async fn into_remainder(mut self) -> Result<Bytes> {
        let buffered = self.buffer.take_all();
        let mut out = BytesMut::from(&buffered[..]);
        while let Some(chunk) = self.stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }

    /// Turns the producer into a stream of lines.
    pub fn into_stream(self) -> impl Stream<Item = Result<Line>> {
        stream::unfold(self, |mut lines| async move {
            match lines.next_line().await {
                Ok(Some(line)) => Some((Ok(line), lines)),
                Ok(None) => None,
                Err(e) => Some((Err(e), lines)),
            }
        })
    }
}

/// Async transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport without a request timeout.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Creates a transport whose requests time out after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps a preconfigured client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AsyncTransport for HttpTransport {
    async fn send(&self, request: Request) -> Result<BodyStream> {
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

        let response = builder.send().await?;
        check_status(&request.url, response.status().as_u16())?;
        Ok(response.bytes_stream().map_err(GitError::from).boxed())
    }
}

/// Async smart HTTP client.
///
/// Cloning is cheap when the transport is; clones share the connection pool
/// of the default transport.
///
/// ```rust,no_run
/// use repligit::Client;
///
/// # async fn run() -> repligit::Result<()> {
/// let client = Client::new()?;
/// let (upstream, mirror) = tokio::try_join!(
///     client.discover_refs("https://github.com/spack/spack.git", None),
///     client.discover_refs("https://gitlab.example.com/mirror/spack.git", None),
/// )?;
/// println!("{} upstream refs, {} mirrored", upstream.len(), mirror.len());
/// # Ok(())
/// # }
/// ```
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

impl<T: AsyncTransport> Client<T> {
    /// Creates a client on a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches the full ref advertisement, including server capabilities.
    pub async fn discover(
        &self,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<RefAdvertisement> {
        let url = proto::info_refs_url(base_url);
        debug!(url = %url, "discovering refs");

        let body = self.transport.send(Request::get(url, credentials)).await?;
        let mut pkts = pin!(decode_stream(Lines::new(body).into_stream()));
        let mut parser = AdvertisementParser::new();
        while let Some(pkt) = pkts.next().await {
            parser.feed(pkt?)?;
        }
        let advertisement = parser.finish()?;

        debug!(refs = advertisement.refs.len(), "ref advertisement parsed");
        Ok(advertisement)
    }

    /// Lists the remote's refs.
    pub async fn discover_refs(
        &self,
        base_url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<RefMap> {
        Ok(self.discover(base_url, credentials).await?.refs)
    }

    /// Negotiates a packfile for `want`.
    ///
    /// Returns `None` when the server answers with anything but `NAK`/`ACK`.
    pub async fn fetch_pack<'a, I>(
        &self,
        base_url: &str,
        want: &ObjectId,
        haves: I,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Bytes>>
    where
        I: IntoIterator<Item = &'a ObjectId>,
    {
        let body = fetch::build_request(want, haves)?;
        let url = proto::upload_pack_url(base_url);
        debug!(url = %url, want = %want, bytes = body.len(), "requesting packfile");

        let response = self
            .transport
            .send(Request::post(url, UPLOAD_PACK_REQUEST, body, credentials))
            .await?;
        let mut lines = Lines::new(response);
        let status = lines.read_frame().await?.ok_or_else(|| {
            GitError::Protocol("upload-pack response has no status line".to_string())
        })?;

        let status = FetchStatus::from_pkt(&status);
        if !status.has_packfile() {
            warn!(status = ?status, "upload-pack sent no packfile");
            return Ok(None);
        }

        let pack = lines.into_remainder().await?;
        debug!(status = ?status, bytes = pack.len(), "packfile received");
        Ok(Some(pack))
    }

    /// Pushes `packfile` and updates one ref.
    ///
    /// Succeeds only if the report reads `unpack ok` then `ok <ref>`.
    pub async fn send_pack(
        &self,
        base_url: &str,
        update: &RefUpdate,
        packfile: Bytes,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let body = push::build_request(update, &packfile)?;
        let url = proto::receive_pack_url(base_url);
        debug!(url = %url, ref_name = %update.ref_name, bytes = body.len(), "sending pack");

        let response = self
            .transport
            .send(Request::post(url, RECEIVE_PACK_REQUEST, body, credentials))
            .await?;
        let mut pkts = pin!(decode_stream(Lines::new(response).into_stream()));
        let unpack = pkts.next().await.transpose()?;
        let ref_status = pkts.next().await.transpose()?;
        push::check_report(unpack.as_ref(), ref_status.as_ref(), &update.ref_name)?;

        info!(ref_name = %update.ref_name, old = %update.old, new = %update.new, "push accepted");
        Ok(())
    }
}

/// Lists a remote's refs with a fresh client.
pub async fn discover_refs(base_url: &str, credentials: Option<&Credentials>) -> Result<RefMap> {
    Client::new()?.discover_refs(base_url, credentials).await
}

/// Fetches a packfile with a fresh client.
pub async fn fetch_pack<'a, I>(
    base_url: &str,
    want: &ObjectId,
    haves: I,
    credentials: Option<&Credentials>,
) -> Result<Option<Bytes>>
where
    I: IntoIterator<Item = &'a ObjectId>,
{
    Client::new()?
        .fetch_pack(base_url, want, haves, credentials)
        .await
}

/// Pushes a packfile with a fresh client.
pub async fn send_pack(
    base_url: &str,
    update: &RefUpdate,
    packfile: Bytes,
    credentials: Option<&Credentials>,
) -> Result<()> {
    Client::new()?
        .send_pack(base_url, update, packfile, credentials)
        .await
}
