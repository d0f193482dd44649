//! Skylight Core - Shared Data Types
//!
//! Pure data structures and the error taxonomy shared by every other crate.
//! This crate contains no I/O: gateways, caching, and auth logic live in
//! `skylight-store` and `skylight-auth`.

pub mod clock;
pub mod entities;
pub mod error;

pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use entities::{
    params_fingerprint, CachedDataset, DatasetKey, Role, SessionRecord, SessionState, TableData,
    Timestamp, UserRecord, UserTable, ViewAccess,
};
pub use error::{
    AuthError, ConfigError, DataError, GatewayError, SkylightError, SkylightResult,
};
