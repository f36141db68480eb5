pub mod filter;
pub mod types;
