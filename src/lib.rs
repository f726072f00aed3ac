// Library crate - provider clients and the shared request/table plumbing

pub mod config;
pub mod credentials;
pub mod de;
pub mod error;
pub mod request;
pub mod table;
pub mod token;

pub mod alpha;
pub mod defillama;
pub mod finnhub;
pub mod iol;
pub mod primary;

// Re-export commonly used types
pub use config::ApiConfig;
pub use credentials::CredentialRecord;
pub use error::ApiError;
pub use request::{ParamValue, Payload, RequestClient};
pub use table::{Cell, Table};
pub use token::{ensure_fresh, Login, RefreshPolicy, Token};
