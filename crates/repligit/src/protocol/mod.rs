//! Git smart HTTP protocol, client side.
//!
//! Request builders and response interpreters for the three operations the
//! client performs. Nothing here does I/O; the blocking and async clients
//! move bytes and hand decoded [`PktLine`](crate::PktLine)s to these types.
//! See: https://git-scm.com/docs/http-protocol

pub mod discovery;
pub mod fetch;
pub mod push;

/// Service name used for ref discovery and fetch.
pub const UPLOAD_PACK: &str = "git-upload-pack";

/// Service name used for push.
pub const RECEIVE_PACK: &str = "git-receive-pack";

/// Content type of a fetch negotiation request.
pub const UPLOAD_PACK_REQUEST: &str = "application/x-git-upload-pack-request";

/// Content type of a push request.
pub const RECEIVE_PACK_REQUEST: &str = "application/x-git-receive-pack-request";

/// `{base}/info/refs?service=git-upload-pack`
pub fn info_refs_url(base_url: &str) -> String {
    format!("{}/info/refs?service={UPLOAD_PACK}", trim_base(base_url))
}

/// `{base}/git-upload-pack`
pub fn upload_pack_url(base_url: &str) -> String {
    format!("{}/{UPLOAD_PACK}", trim_base(base_url))
}

/// `{base}/git-receive-pack`
pub fn receive_pack_url(base_url: &str) -> String {
    format!("{}/{RECEIVE_PACK}", trim_base(base_url))
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let base = "https://github.com/spack/spack.git";
        assert_eq!(
            info_refs_url(base),
            "https://github.com/spack/spack.git/info/refs?service=git-upload-pack"
        );
        assert_eq!(
            upload_pack_url(base),
            "https://github.com/spack/spack.git/git-upload-pack"
        );
        assert_eq!(
            receive_pack_url(base),
            "https://github.com/spack/spack.git/git-receive-pack"
        );
    }

    #[test]
    fn test_endpoint_urls_trailing_slash() {
        assert_eq!(
            upload_pack_url("http://localhost/repo.git/"),
            "http://localhost/repo.git/git-upload-pack"
        );
    }
}
