//! QCut Timeline Model
//!
//! Defines the editing data model and the operations on it:
//! - **Timing:** Effective (trimmed) durations and frame/time conversion
//! - **Elements & Tracks:** Tagged element payloads owned by typed tracks
//! - **Timeline:** Mutation primitives and consistency checks
//! - **Edit Algebra:** Split, ripple removal/move/insert, audio separation
//! - **History:** Snapshot undo/redo
//!
//! All times are in seconds. Every render and ripple computation uses the
//! *effective* range of an element (`duration` minus both trims), never
//! the raw `duration`.

pub mod document;
pub mod edit;
pub mod element;
pub mod history;
pub mod settings;
pub mod timeline;
pub mod timing;
pub mod track;

pub use document::*;
pub use element::*;
pub use history::*;
pub use settings::*;
pub use timeline::*;
pub use track::*;
