//! Systems and the automatic inter-system dependency planner (component J).
//!
//! The planner is grounded on `examples/0x112233-legion/src/system.rs`'s
//! `StageExecutor::new`: each newly registered item is compared against every
//! earlier one's recorded read/write sets, and a hazard (write-after-read,
//! write-after-write, or read-after-write) adds an edge. Legion does this over
//! resource/component type ids with a `HashMap<TypeId, Vec<usize>>`; this port does
//! the same comparison over component-id bitmasks (`bit_set::BitSet`, one bit per
//! component id below `HI_COMPONENT_ID`) since §4.J specifies the hazard check as a
//! bitmask intersection rather than a type-id lookup.

use crate::context::Range;
use crate::query::{InOut, Query, Term};
use crate::table::{Table, TableStore};
use bit_set::BitSet;

/// Index of a registered system, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub(crate) u32);

/// How a system's callback is driven once its query is matched (§3.4/§4.J).
pub enum IterMode {
    /// Callback runs once per matched table, receiving the lane's row range within it.
    Terms,
    /// Callback runs once per lane, receiving the lane's range over a fixed count
    /// unrelated to any query match (e.g. a particle system iterating a flat array).
    Range { iter_count: u64 },
}

/// Whether a barrier separates this system's completion from the next system
/// beginning, independent of the DAG dependency the planner infers (§4.J).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Rely solely on the dependency graph; no extra barrier.
    None,
    /// Insert a barrier after this system so every lane observes its writes
    /// before any lane starts the next one.
    Barrier,
}

/// A system's callback, shaped by its [`IterMode`].
pub enum Callback {
    Terms(Box<dyn FnMut(&Table, Range) + Send>),
    Range(Box<dyn FnMut(Range) + Send>),
}

/// A registered system: a query, a callback, and the dependency edges the planner
/// inferred for it at registration time.
pub struct System {
    id: SystemId,
    name: String,
    query: Query,
    callback: Callback,
    iter_mode: IterMode,
    sync_mode: SyncMode,
    depends_on: Vec<SystemId>,
    read_fields: BitSet,
    write_fields: BitSet,
}

impl System {
    /// Registers a new system after `existing`, running the hazard planner (§4.J
    /// steps 1-3) against every system already registered.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SystemId,
        name: impl Into<String>,
        store: &TableStore,
        terms: Vec<Term>,
        callback: Callback,
        iter_mode: IterMode,
        sync_mode: SyncMode,
        existing: &[System],
    ) -> System {
        let (read_fields, write_fields) = field_masks(&terms);
        let depends_on = plan_dependencies(&read_fields, &write_fields, existing);
        let query = Query::init(store, terms);
        System {
            id,
            name: name.into(),
            query,
            callback,
            iter_mode,
            sync_mode,
            depends_on,
            read_fields,
            write_fields,
        }
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depends_on(&self) -> &[SystemId] {
        &self.depends_on
    }

    pub fn iter_mode(&self) -> &IterMode {
        &self.iter_mode
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    pub fn callback_mut(&mut self) -> &mut Callback {
        &mut self.callback
    }
}

/// Derives a term list's `read_fields`/`write_fields` bitmasks from each term's
/// resolved in/out marker (§3.4's `Query::{read,write}_fields`), keyed by component id.
fn field_masks(terms: &[Term]) -> (BitSet, BitSet) {
    let mut read = BitSet::new();
    let mut write = BitSet::new();
    for term in terms {
        let bit = term.id.index() as usize;
        match term.resolved_inout() {
            InOut::In => {
                read.insert(bit);
            }
            InOut::Out => {
                write.insert(bit);
            }
            InOut::InOut => {
                read.insert(bit);
                write.insert(bit);
            }
            InOut::InOutNone | InOut::Default => {}
        }
    }
    (read, write)
}

/// Implements §4.J steps 1-3: walk `existing` in registration order, adding an edge
/// to any system whose write set overlaps this one's read or write set, or whose
/// read set this one writes to.
fn plan_dependencies(read: &BitSet, write: &BitSet, existing: &[System]) -> Vec<SystemId> {
    let mut deps = Vec::new();
    for earlier in existing {
        let hazard = !write.is_disjoint(&earlier.read_fields)
            || !write.is_disjoint(&earlier.write_fields)
            || !read.is_disjoint(&earlier.write_fields);
        if hazard {
            deps.push(earlier.id);
        }
    }
    deps
}
