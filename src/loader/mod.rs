//! Source loading: the IDL front end and the TOML architecture description reader.

pub mod arch;
pub mod idl;

pub use arch::ArchLoader;
