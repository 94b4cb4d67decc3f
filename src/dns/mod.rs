//! MX resolution with a process-wide cache.
//!
//! The entry point is [`MxResolver::mx`], which returns the lowercased MX
//! hosts for a domain (ascending preference) and memoizes them for the
//! lifetime of the engine. Lookup failures resolve to an empty list so callers
//! can treat "no MX" uniformly.

mod error;
mod resolver;

pub use error::DnsError;
pub use resolver::{LookupMx, MxRecord, MxResolver, SystemResolver};
