pub mod changes;
pub mod ticket;
pub mod ztag;

use crate::error::P4Error;

/// Trait for turning captured `p4` stdout into something typed.
/// Tagged listings, login output and plain-text listings each get their own
/// implementation.
pub trait OutputParser: Send + Sync {
    type Output;

    fn parse(&self, stdout: &[u8]) -> Result<Self::Output, P4Error>;
}
