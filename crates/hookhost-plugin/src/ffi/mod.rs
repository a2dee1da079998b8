//! C ABI for shared-library modules (feature `dynamic`).

pub mod abi;
pub mod safety;
