//! Command handlers for the tandem CLI.

pub mod ask;
pub mod backends;
pub mod logging;
pub mod session;

pub use ask::*;
pub use backends::*;
pub use logging::*;
pub use session::*;
