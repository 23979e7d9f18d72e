pub mod allowlist;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod decode;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod ownership;
pub mod policy;
pub mod predict;
pub mod rate_limit;
pub mod rpc;
pub mod run;
pub mod server;
pub mod session;
pub mod testing;
pub mod upstream;

pub use allowlist::*;
pub use chain::*;
pub use config::*;
pub use decode::*;
pub use engine::*;
pub use error::*;
pub use metrics::*;
pub use ownership::*;
pub use policy::*;
pub use predict::*;
pub use rate_limit::*;
pub use rpc::*;
pub use server::*;
pub use session::*;
pub use upstream::*;
