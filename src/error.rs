//! Typed errors for the handful of library-surface fallible operations that are
//! not on the hot allocation/task/ECS path (§3.5).
//!
//! `Allocator::alloc`, `TaskQueue::append`, and `World::get`/`add`/`has` keep
//! returning `Option`/bare values exactly as specified — converting those to
//! `Result` would add branching the spec explicitly rules out retrying on. These
//! two enums cover construction-time sizing mistakes and world/query setup
//! mistakes instead, mirroring `legion-core`'s own `thiserror` dependency.

use thiserror::Error;

/// Oversubscribed arena/pool construction.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("commit size {commit} exceeds reserved size {reserved}")]
    CommitExceedsReserved { reserved: usize, commit: usize },
}

/// Contract violations in ECS world setup.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("component space exhausted: no ids remain below HI_COMPONENT_ID")]
    ComponentSpaceExhausted,
    #[error("component `{name}` was already registered")]
    ComponentAlreadyRegistered { name: &'static str },
    #[error("query term list is empty")]
    EmptyTermList,
}
