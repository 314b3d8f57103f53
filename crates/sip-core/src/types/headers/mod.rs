//! Header names, the ordered header multimap and typed accessors

mod access;
mod header_map;
mod header_name;

pub use access::HeaderAccess;
pub use header_map::{Headers, Iter};
pub use header_name::HeaderName;
