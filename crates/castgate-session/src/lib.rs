//! Castgate Session - client-side session lifecycle
//!
//! Stores the token pair, decodes the identity it carries, keeps a session
//! state machine current, and refreshes tokens with at most one refresh in
//! flight.
//!
//! # Quick Start
//!
//! ```ignore
//! use castgate_session::{SessionClient, SessionConfig};
//!
//! let client = SessionClient::connect(SessionConfig::from_env()?)?;
//! client.restore();
//! client.login("host@example.com", "correct horse battery").await?;
//!
//! let request = http::Request::get("https://api.example.com/podcasts")
//!     .body(bytes::Bytes::new())?;
//! let response = client.execute(request).await?;
//! ```
//!
//! # Components
//!
//! - [`TokenStore`] - synchronous save/load/clear of the active pair
//! - [`decode`](decode::decode) - identity from an access token, no network
//! - [`SessionStateMachine`] - reducer-driven state published over `watch`
//! - [`RefreshCoordinator`] - single-flight refresh, logout wins
//! - [`Interceptor`] - bearer and request-id headers, one refresh-and-retry on 401

pub mod api;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod interceptor;
pub mod metrics;
pub mod refresh;
pub mod state;
pub mod store;

pub use api::{AuthApi, HttpAuthApi};
pub use client::SessionClient;
pub use config::{ConfigError, SessionConfig};
pub use decode::{decode, is_expired, DecodeError};
pub use error::{ApiClientError, SessionError};
pub use interceptor::{InterceptError, Interceptor, ReqwestTransport, Transport, TransportError};
pub use refresh::{RefreshCoordinator, RefreshError};
pub use state::{reduce, SessionEvent, SessionPhase, SessionState, SessionStateMachine};
pub use store::{FileTokenStore, MemoryTokenStore, StorageKeys, StoreError, TokenStore};
