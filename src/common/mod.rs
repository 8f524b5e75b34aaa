pub mod error;
pub mod response;
pub mod security;
pub mod transfer;
