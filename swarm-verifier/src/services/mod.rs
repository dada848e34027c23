//! Synchronous pipeline services
//!
//! Everything here runs without I/O and is bounded by the size of one
//! conversation tree.

pub mod conversation;
pub mod duplicate_detector;
pub mod slice_validator;

pub use conversation::{build_reply_chain, ThreadContext};
pub use duplicate_detector::{DedupCandidate, DedupThresholds, DuplicateDetector};
pub use slice_validator::{validate_prediction_slices, SliceKind, SliceViolation};
