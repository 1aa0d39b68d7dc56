pub mod devices;
pub mod filter;
pub mod parser;
pub mod session;
pub mod source;
