//! Single-round want/have negotiation against `git-upload-pack`.

use crate::pktline::{PktLine, PktLineWriter};
use crate::{ObjectId, Result};
use bytes::Bytes;

/// Builds the negotiation request body.
///
/// One `want`, a flush, one `have` per id in caller order, then `done`.
/// There is no multi-ack, so the server answers after this single round.
pub fn build_request<'a, I>(want: &ObjectId, haves: I) -> Result<Bytes>
where
    I: IntoIterator<Item = &'a ObjectId>,
{
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line(format!("want {want}").as_bytes())?;
    writer.flush_pkt()?;
    for have in haves {
        writer.write_line(format!("have {have}").as_bytes())?;
    }
    writer.write_line(b"done")?;
    Ok(Bytes::from(writer.into_inner()))
}

/// The server's answer to a negotiation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// No common commit; a packfile follows.
    Nak,
    /// A common commit was acknowledged; a packfile follows.
    Ack(String),
    /// Anything else, such as an `ERR` report. No packfile follows.
    Other(String),
}

impl FetchStatus {
    /// Classifies a status frame by its first three bytes.
    pub fn from_pkt(pkt: &PktLine) -> Self {
        let payload = pkt.payload();
        if payload.starts_with(b"NAK") {
            Self::Nak
        } else if let Some(rest) = payload.strip_prefix(b"ACK") {
            Self::Ack(String::from_utf8_lossy(rest).trim().to_string())
        } else {
            Self::Other(String::from_utf8_lossy(payload).into_owned())
        }
    }

    /// Returns true if the rest of the response is a packfile.
    pub fn has_packfile(&self) -> bool {
        matches!(self, Self::Nak | Self::Ack(_))
    }
}
