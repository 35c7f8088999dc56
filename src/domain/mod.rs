pub mod access;
pub mod policy;
pub mod verdict;

pub use access::{AccessRequest, Caller, Grant};
pub use policy::AccessPolicy;
pub use verdict::Verdict;
