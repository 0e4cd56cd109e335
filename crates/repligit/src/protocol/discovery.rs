//! Reference discovery against `info/refs`.

use crate::pktline::PktLine;
use crate::{GitError, ObjectId, Result};
use std::collections::HashMap;

/// The announcement every upload-pack advertisement starts with.
pub const SERVICE_LINE: &str = "# service=git-upload-pack";

/// Name used by empty repositories to carry capabilities without a ref.
const CAPABILITIES_PLACEHOLDER: &str = "capabilities^{}";

/// Ref name to object id.
pub type RefMap = HashMap<String, ObjectId>;

/// A parsed reference advertisement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefAdvertisement {
    /// Advertised refs.
    pub refs: RefMap,
    /// Capabilities the server attached to its first ref line.
    pub capabilities: Vec<String>,
}

impl RefAdvertisement {
    /// Looks up a ref by name.
    pub fn get(&self, name: &str) -> Option<&ObjectId> {
        self.refs.get(name)
    }

    /// Returns true if the server advertised the capability.
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c == name || c.split_once('=').is_some_and(|(k, _)| k == name))
    }
}

/// Incremental advertisement parser fed one decoded frame at a time.
#[derive(Debug, Default)]
pub struct AdvertisementParser {
    seen_service: bool,
    advertisement: RefAdvertisement,
}

impl AdvertisementParser {
    /// Creates a parser expecting the service announcement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one frame.
    pub fn feed(&mut self, pkt: PktLine) -> Result<()> {
        if !self.seen_service {
            if pkt.payload() != SERVICE_LINE.as_bytes() {
                return Err(GitError::Protocol(format!(
                    "expected {SERVICE_LINE:?}, got {:?}",
                    String::from_utf8_lossy(pkt.payload())
                )));
            }
            self.seen_service = true;
            return Ok(());
        }

        // Flush markers between sections carry nothing.
        let payload = pkt.payload();
        if payload.is_empty() {
            return Ok(());
        }
        self.parse_ref_line(payload)
    }

    fn parse_ref_line(&mut self, payload: &[u8]) -> Result<()> {
        let line = std::str::from_utf8(payload).map_err(|_| {
            GitError::Protocol(format!(
                "ref line is not UTF-8: {:?}",
                String::from_utf8_lossy(payload)
            ))
        })?;

        let (ref_part, caps) = match line.split_once('\0') {
            Some((ref_part, caps)) => (ref_part, Some(caps)),
            None => (line, None),
        };

        let tokens: Vec<&str> = ref_part.split_ascii_whitespace().collect();
        let [id, name] = tokens.as_slice() else {
            return Err(GitError::Protocol(format!(
                "malformed ref line {line:?}: expected \"<id> <name>\""
            )));
        };
        let id = ObjectId::from_hex(id)?;

        if let Some(caps) = caps {
            if self.advertisement.capabilities.is_empty() {
                self.advertisement.capabilities =
                    caps.split_ascii_whitespace().map(str::to_string).collect();
            }
        }

        if *name == CAPABILITIES_PLACEHOLDER {
            return Ok(());
        }

        if self
            .advertisement
            .refs
            .insert((*name).to_string(), id)
            .is_some()
        {
            return Err(GitError::Protocol(format!("duplicate ref {name}")));
        }
        Ok(())
    }

    /// Finishes parsing once the response is exhausted.
    pub fn finish(self) -> Result<RefAdvertisement> {
        if !self.seen_service {
            return Err(GitError::Protocol(
                "empty response, no service announcement".to_string(),
            ));
        }
        Ok(self.advertisement)
    }
}

/// Parses a complete advertisement from decoded frames.
pub fn parse_advertisement<I>(pkts: I) -> Result<RefAdvertisement>
where
    I: IntoIterator<Item = Result<PktLine>>,
{
    let mut parser = AdvertisementParser::new();
    for pkt in pkts {
        parser.feed(pkt?)?;
    }
    parser.finish()
}
