//! Ref update and report validation against `git-receive-pack`.

use crate::pktline::{PktLine, PktLineWriter};
use crate::{GitError, ObjectId, Result};
use bytes::Bytes;

/// Capability requested with every push.
pub const REPORT_STATUS: &str = "report-status";

/// First report line of a successful unpack.
pub const UNPACK_OK: &str = "unpack ok";

/// A single ref update command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// Full ref name, e.g. `refs/heads/main`.
    pub ref_name: String,
    /// Current id on the remote, all zeros when creating.
    pub old: ObjectId,
    /// Id the ref should point to afterwards.
    pub new: ObjectId,
}

impl RefUpdate {
    /// Creates an update of an existing ref.
    pub fn new(ref_name: impl Into<String>, old: ObjectId, new: ObjectId) -> Self {
        Self {
            ref_name: ref_name.into(),
            old,
            new,
        }
    }

    /// Creates an update that creates the ref.
    pub fn create(ref_name: impl Into<String>, new: ObjectId) -> Self {
        Self::new(ref_name, ObjectId::zero(), new)
    }

    /// Returns true if this creates the ref.
    pub fn is_create(&self) -> bool {
        self.old.is_zero()
    }

    fn command(&self) -> String {
        format!(
            "{} {} {}\0 {REPORT_STATUS}",
            self.old, self.new, self.ref_name
        )
    }
}

/// Builds the command section: one command line and a flush.
pub fn build_header(update: &RefUpdate) -> Result<Bytes> {
    let mut writer = PktLineWriter::new(Vec::new());
    writer.write_line(update.command().as_bytes())?;
    writer.flush_pkt()?;
    Ok(Bytes::from(writer.into_inner()))
}

/// Builds the full request body: command section then the unframed packfile.
pub fn build_request(update: &RefUpdate, packfile: &[u8]) -> Result<Bytes> {
    let header = build_header(update)?;
    let mut writer = PktLineWriter::new(Vec::with_capacity(header.len() + packfile.len()));
    writer.write_raw(&header)?;
    writer.write_raw(packfile)?;
    Ok(Bytes::from(writer.into_inner()))
}

/// Checks the two report lines for `ref_name`.
///
/// `None` means the response ended before that line. Any deviation fails the
/// whole push; a rejected ref after a good unpack is not a partial success.
pub fn check_report(
    unpack: Option<&PktLine>,
    ref_status: Option<&PktLine>,
    ref_name: &str,
) -> Result<()> {
    let unpack = unpack.ok_or_else(|| {
        GitError::Protocol("push report ended before the unpack status".to_string())
    })?;
    if unpack.payload() != UNPACK_OK.as_bytes() {
        return Err(GitError::PushRejected(lossy(unpack)));
    }

    let ref_status = ref_status.ok_or_else(|| {
        GitError::Protocol(format!("push report ended before the status of {ref_name}"))
    })?;
    if ref_status.payload() != format!("ok {ref_name}").as_bytes() {
        return Err(GitError::PushRejected(lossy(ref_status)));
    }
    Ok(())
}

fn lossy(pkt: &PktLine) -> String {
    String::from_utf8_lossy(pkt.payload()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> RefUpdate {
        RefUpdate::new(
            "refs/heads/main",
            ObjectId::from_hex(&"a".repeat(40)).unwrap(),
            ObjectId::from_hex(&"b".repeat(40)).unwrap(),
        )
    }

    fn line(s: &str) -> PktLine {
        PktLine::from_string(s)
    }

    #[test]
    fn test_build_header() {
        let header = build_header(&update()).unwrap();
        let command = format!(
            "{} {} refs/heads/main\0 report-status",
            "a".repeat(40),
            "b".repeat(40)
        );
        let mut expected = format!("{:04x}{command}\n", command.len() + 5).into_bytes();
        expected.extend_from_slice(b"0000");
        assert_eq!(&header[..], expected.as_slice());
    }

    #[test]
    fn test_build_request_appends_raw_pack() {
        let pack = b"PACK\x00\x00\x00\x02\n\x00";
        let body = build_request(&update(), pack).unwrap();
        assert!(body.ends_with(b"0000PACK\x00\x00\x00\x02\n\x00"));
    }

    #[test]
    fn test_create_uses_zero_id() {
        let new = ObjectId::from_hex(&"b".repeat(40)).unwrap();
        let create = RefUpdate::create("refs/heads/new", new);
        assert!(create.is_create());
        assert!(!update().is_create());
        let header = build_header(&create).unwrap();
        assert!(header[4..].starts_with("0".repeat(40).as_bytes()));
    }

    #[test]
    fn test_report_ok() {
        let result = check_report(
            Some(&line("unpack ok")),
            Some(&line("ok refs/heads/main")),
            "refs/heads/main",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_report_ref_rejected() {
        let err = check_report(
            Some(&line("unpack ok")),
            Some(&line("ng refs/heads/main non-fast-forward")),
            "refs/heads/main",
        )
        .unwrap_err();
        match err {
            GitError::PushRejected(reason) => {
                assert_eq!(reason, "ng refs/heads/main non-fast-forward")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_report_unpack_failed() {
        let err = check_report(
            Some(&line("unpack index-pack abnormal exit")),
            Some(&line("ng refs/heads/main unpacker error")),
            "refs/heads/main",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "push rejected: unpack index-pack abnormal exit");
    }

    #[test]
    fn test_report_ok_for_other_ref_rejected() {
        let err = check_report(
            Some(&line("unpack ok")),
            Some(&line("ok refs/heads/dev")),
            "refs/heads/main",
        )
        .unwrap_err();
        assert!(matches!(err, GitError::PushRejected(_)));
    }

    #[test]
    fn test_report_flush_is_empty_line() {
        let err = check_report(Some(&PktLine::Flush), None, "refs/heads/main").unwrap_err();
        assert!(matches!(err, GitError::PushRejected(ref r) if r.is_empty()));
    }

    #[test]
    fn test_report_truncated() {
        let err = check_report(Some(&line("unpack ok")), None, "refs/heads/main").unwrap_err();
        assert!(matches!(err, GitError::Protocol(_)));
        assert!(check_report(None, None, "refs/heads/main").is_err());
    }
}
