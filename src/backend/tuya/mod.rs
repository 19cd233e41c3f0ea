mod client;
mod session;

pub use client::TuyaClient;
pub use session::{ApiPlatform, Credentials, Session};
