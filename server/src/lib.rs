//! The HTTP surface from `spec.md` §5/§6: axum routes over the executor and
//! the two persisted stores. Split into a library (this crate) plus a thin
//! [`src/main.rs`] binary so integration tests can build a router directly,
//! the same `[lib]` + `[[bin]]` split an axum service typically uses so its
//! router can be exercised without going through a bound socket.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
