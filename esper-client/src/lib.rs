//! Blocking ESPER client: UDP device discovery and chunked variable
//! transfer over HTTP. Protocol types and codecs live in `esper-proto`.

pub mod config;
pub mod discovery;
pub mod http;
pub mod poll;

pub use config::Config;
pub use discovery::DiscoveryClient;
pub use http::EsperHttp;
pub use poll::RepeatPolicy;
