//! In-memory transports for unit tests.

use crate::transport::{AsyncTransport, BodyStream, Request, Transport};
use crate::{GitError, ObjectId, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::Mutex;

pub(crate) fn oid(c: char) -> ObjectId {
    ObjectId::from_hex(&c.to_string().repeat(40)).unwrap()
}

/// Builds an upload-pack advertisement the way a server frames it.
pub(crate) fn advertisement(refs: &[(&str, &str)]) -> Vec<u8> {
    let mut out = b"001e# service=git-upload-pack\n0000".to_vec();
    for (i, (id, name)) in refs.iter().enumerate() {
        let line = if i == 0 {
            format!("{id} {name}\0report-status side-band-64k agent=git/2.43.0\n")
        } else {
            format!("{id} {name}\n")
        };
        out.extend_from_slice(format!("{:04x}", line.len() + 4).as_bytes());
        out.extend_from_slice(line.as_bytes());
    }
    out.extend_from_slice(b"0000");
    out
}

/// Reader that never returns more than `chunk_size` bytes per read.
pub(crate) struct ChunkedReader {
    inner: io::Cursor<Vec<u8>>,
    chunk_size: usize,
}

impl ChunkedReader {
    pub(crate) fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            inner: io::Cursor::new(data),
            chunk_size,
        }
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk_size);
        self.inner.read(&mut buf[..n])
    }
}

pub(crate) fn chunked_stream(
    data: Vec<u8>,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes>> + Unpin + Send + 'static {
    let chunks: Vec<Result<Bytes>> = data
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks)
}

/// Serves canned responses in order and records every request.
pub(crate) struct MockTransport {
    responses: Mutex<VecDeque<std::result::Result<Vec<u8>, u16>>>,
    requests: Mutex<Vec<Request>>,
    chunk_size: usize,
}

impl MockTransport {
    pub(crate) fn new(chunk_size: usize) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            chunk_size,
        }
    }

    pub(crate) fn respond(self, body: Vec<u8>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(body));
        self
    }

    pub(crate) fn fail(self, status: u16) -> Self {
        self.responses.lock().unwrap().push_back(Err(status));
        self
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn next_body(&self, request: Request) -> Result<Vec<u8>> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(body)) => Ok(body),
            Some(Err(status)) => Err(GitError::Transport { url, status }),
            None => panic!("no canned response left for {url}"),
        }
    }
}

impl Transport for MockTransport {
    type Body = ChunkedReader;

    fn send(&self, request: Request) -> Result<Self::Body> {
        let body = self.next_body(request)?;
        Ok(ChunkedReader::new(body, self.chunk_size))
    }
}

#[async_trait]
impl AsyncTransport for MockTransport {
    async fn send(&self, request: Request) -> Result<BodyStream> {
        let body = self.next_body(request)?;
        Ok(chunked_stream(body, self.chunk_size).boxed())
    }
}
