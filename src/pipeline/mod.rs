//! Ingestion pipeline: chunked jobs feeding the conversation and aggregate
//! builder
//!
//! # Architecture
//!
//! ```text
//! NDJSON records
//!     │
//!     └──→ IngestCoordinator (job lifecycle, per-job serialization)
//!             │
//!             └──→ builder::apply_chunk (per chunk)
//!                     │
//!                     ├──→ conversations  (merge: max turns, sum messages)
//!                     ├──→ messages       (append-only, duplicate guard)
//!                     └──→ user_aggregates (read-merge-write)
//! ```
//!
//! Chunks are submitted strictly sequentially by the caller; the coordinator
//! processes one chunk at a time per job and never reorders.

pub mod builder;
pub mod coordinator;

pub use builder::ChunkOutcome;
pub use coordinator::IngestCoordinator;
