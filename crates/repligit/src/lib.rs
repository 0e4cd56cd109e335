//! Git smart HTTP client.
//!
//! This crate speaks the client half of Git's smart HTTP protocol (v0):
//! reference discovery against `info/refs`, single-round fetch negotiation
//! against `git-upload-pack` and single-ref push against `git-receive-pack`.
//! Packfiles are moved as opaque bytes and never interpreted.
//!
//! Every operation exists twice. The async [`Client`] and the free functions
//! at the crate root suspend on body reads; [`blocking`] performs the same
//! operations on the calling thread. Both share one pkt-line codec and one set
//! of protocol rules, so a response yields the same result in either mode.
//!
//! ```rust,no_run
//! use repligit::{Credentials, ObjectId, RefUpdate};
//!
//! # async fn mirror() -> repligit::Result<()> {
//! let upstream = "https://github.com/spack/spack.git";
//! let mirror = "https://gitlab.example.com/mirror/spack.git";
//! let creds = Credentials::basic("bot", "token");
//!
//! let refs = repligit::discover_refs(upstream, None).await?;
//! let want = &refs["refs/heads/develop"];
//! if let Some(pack) = repligit::fetch_pack(upstream, want, Vec::<&ObjectId>::new(), None).await? {
//!     let update = RefUpdate::create("refs/heads/develop", want.clone());
//!     repligit::send_pack(mirror, &update, pack, Some(&creds)).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod blocking;
mod client;
mod error;
mod lines;
mod oid;
pub mod pktline;
pub mod protocol;
mod transport;

#[cfg(test)]
mod testing;

pub use client::{discover_refs, fetch_pack, send_pack, Client, HttpTransport, Lines};
pub use error::{ErrorKind, GitError};
pub use lines::{Line, LineBuffer};
pub use oid::{ObjectId, HEX_LEN};
pub use pktline::{PktLine, PktLineWriter};
pub use protocol::discovery::{RefAdvertisement, RefMap};
pub use protocol::fetch::FetchStatus;
pub use protocol::push::RefUpdate;
pub use transport::{AsyncTransport, BodyStream, Credentials, Method, Request, Transport};

/// Result type for smart HTTP operations.
pub type Result<T> = std::result::Result<T, GitError>;

/// `User-Agent` sent by the default transports.
pub const USER_AGENT: &str = concat!("repligit/", env!("CARGO_PKG_VERSION"));
