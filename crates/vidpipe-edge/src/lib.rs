//! Vidpipe Edge Library
//!
//! The public delivery surface: a stateless HTTP proxy that maps request
//! paths under the configured key root to storage objects, applying the
//! asymmetric cache policy (immutable segments, short-lived playlists),
//! CORS, and byte-range semantics HLS players expect.

pub mod proxy;
pub mod range;

pub use proxy::{router, AppState};
