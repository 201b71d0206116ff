//! Git state for tandem sessions.
//!
//! A [`GitState`] is captured fresh on every request. It names the default
//! session for the current checkout and tells the caller whether a stored
//! session recorded on another branch or commit may be continued.

pub mod error;
pub mod resolver;
pub mod state;

pub use error::{GitError, GitResult};
pub use resolver::GitStateResolver;
pub use state::{Continuation, GitState, COMMIT_PREFIX_LEN};
