//! A multicore task runtime and archetype ECS: fixed-capacity allocators, OS
//! thread/lane primitives, a dependency-graph task queue (both a cooperative
//! barrier-synchronised mode and a worker-pool mode), and a flecs-style entity
//! component system with cached queries, change detection, and automatic
//! inter-system dependency inference.
//!
//! Modules:
//!
//! - [`memory`] (A) — `Arena`/`Pool` allocators.
//! - [`thread`] (B) — `Thread`, `Mutex`, `RwMutex`, `Semaphore`, `Barrier`, `CondVar`.
//! - [`context`] (C) — per-lane `ThreadContext` and SIMT-style lane collectives.
//! - [`task`] (D) — the cooperative, barrier-drained `TaskQueue`.
//! - [`runtime`] (D, external interface) — `Runtime::run`, the `mcr_run` entry point.
//! - [`task_system`] (E) — the worker-pool `TaskSystem`.
//! - [`entity`] (F) — the generational `EntityIndex`.
//! - [`table`] (G) — archetype `Table`/`TableStore` storage and the add/remove graph.
//! - [`query`] (H) — `Term`/`Query`/`Iter`, cached matching and iteration.
//! - [`change`] (I) — per-query change-counter tracking.
//! - [`system`] (J) — `System` registration and the automatic dependency planner.
//! - [`world`] — the `World` facade tying F through J together.
//! - [`error`] — typed errors for the non-hot-path fallible operations.

pub mod change;
pub mod context;
pub mod entity;
pub mod error;
pub mod memory;
pub mod query;
pub mod runtime;
pub mod system;
pub mod table;
pub mod task;
pub mod task_system;
pub mod thread;
pub mod world;

pub use change::ChangeTracker;
pub use context::{tctx_current, tctx_set_current, ThreadContext};
pub use entity::{Entity, EntityIndex, ENTITY_PAGE_SIZE};
pub use error::{AllocError, WorldError};
// `Arena`/`Pool` are this crate's `ArenaAllocator`/`PoolAllocator` (§6): both
// implement `Allocator` directly rather than existing as separate wrapper types.
pub use memory::{Allocator, Arena, Pool};
pub use query::{InOut, Iter, Oper, Query, Term};
pub use runtime::Runtime;
pub use system::{Callback, IterMode, SyncMode, System, SystemId};
pub use table::{Column, ComponentRecord, Table, TableId, TableStore, Type, TypeInfo, HI_COMPONENT_ID};
pub use task::{AccessMode, ResourceAccess, TaskHandle, TaskQueue, MAX_DEPENDENTS, MAX_TASKS, MAX_TASK_RESOURCES};
pub use task_system::TaskSystem;
pub use thread::{cpu_pause, Barrier, CondVar, Mutex, RwMutex, Semaphore, Thread};
pub use world::{World, FIRST_USER_ENTITY_ID};
