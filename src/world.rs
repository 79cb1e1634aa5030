//! The ECS world: entity/component glue tying together the entity index, the
//! archetype table store, queries, change detection, and systems (F+G+H+I+J).
//!
//! Grounded on `original_source/wasm-multicore-demo/ecs/ecs_entity.h`'s `EcsWorld`
//! (`entity_index` + arena) for the overall shape, and validated behaviourally
//! against `original_source/wasm-multicore-demo/tests/test_ecs_add_remove.c` (no
//! `.c` body for `ecs_add`/`ecs_remove`/`ecs_get`/`ecs_set_ptr` exists in the
//! retrieved source — see DESIGN.md's "Open questions" entry 5 for why the
//! migration logic below is an original design rather than a port).

use crate::context::{tctx_current, Range, ThreadContext};
use crate::entity::{Entity, EntityIndex};
use crate::error::WorldError;
use crate::query::{Iter, Query, Term};
use crate::system::{Callback, IterMode, SyncMode, System, SystemId};
use crate::table::{ComponentRecord, TableId, TableStore, TypeInfo, HI_COMPONENT_ID};
use crate::task::{TaskHandle, TaskQueue};
use std::any::TypeId;
use std::collections::HashMap;
use tracing::{debug, info};

/// First id handed to a user entity; ids below this are reserved for components
/// (§6).
pub const FIRST_USER_ENTITY_ID: u32 = 384;

/// A flecs-style ECS world (§3.4): entity index, archetype storage, and the
/// systems registered against it.
pub struct World {
    entities: EntityIndex,
    type_info: Vec<Option<TypeInfo>>,
    component_records: Vec<Option<ComponentRecord>>,
    tables: TableStore,
    systems: Vec<System>,
    next_component_id: u32,
    registered_types: HashMap<TypeId, Entity>,
}

impl World {
    /// Mirrors `ecs_world_init`: an empty entity index reserving ids below
    /// [`FIRST_USER_ENTITY_ID`] for components, and a table store holding only the
    /// root (empty-type) archetype.
    pub fn new() -> World {
        info!("world created");
        World {
            entities: EntityIndex::new(FIRST_USER_ENTITY_ID - 1),
            type_info: vec![None; HI_COMPONENT_ID],
            component_records: vec![None; HI_COMPONENT_ID],
            tables: TableStore::new(),
            systems: Vec::new(),
            next_component_id: 1,
            registered_types: HashMap::new(),
        }
    }

    // -- entities --------------------------------------------------------

    pub fn entity_new(&mut self) -> Entity {
        self.entities.new_entity()
    }

    pub fn entity_delete(&mut self, entity: Entity) {
        if let Some(record) = self.entities.get(entity).copied() {
            if let Some(table_id) = record.table {
                self.detach_from_table(table_id, record.row as usize);
            }
        }
        self.entities.delete(entity);
    }

    pub fn entity_is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Registers `T` as a component, reserving the next id below
    /// [`HI_COMPONENT_ID`] (mirrors `ECS_COMPONENT`/`ecs_component_register`).
    /// Registering the same Rust type twice is a contract violation rather than a
    /// silent no-op or a second id, since `T`'s `TypeInfo` (size, alignment, name)
    /// is assumed fixed for the world's lifetime once any table is built against it.
    pub fn component_register<T: 'static>(&mut self, name: &'static str) -> Result<Entity, WorldError> {
        if self.registered_types.contains_key(&TypeId::of::<T>()) {
            return Err(WorldError::ComponentAlreadyRegistered { name });
        }

        let id = self.next_component_id;
        if id as usize >= HI_COMPONENT_ID {
            return Err(WorldError::ComponentSpaceExhausted);
        }
        self.next_component_id += 1;

        let entity = self.entities.ensure(id);
        self.type_info[id as usize] = Some(TypeInfo::of::<T>(entity, name));
        self.registered_types.insert(TypeId::of::<T>(), entity);
        debug!(component = name, id, "component registered");
        Ok(entity)
    }

    // -- components --------------------------------------------------------

    pub fn has(&self, entity: Entity, component: Entity) -> bool {
        match self.entities.get(entity).and_then(|r| r.table) {
            Some(table_id) => self.tables.get(table_id).has_component(component),
            None => false,
        }
    }

    /// Adds `component` to `entity`, migrating it to the (cached) archetype
    /// reached by `TableStore::traverse_add` and carrying over every overlapping
    /// column's bytes.
    pub fn add(&mut self, entity: Entity, component: Entity) {
        let (from, from_row) = match self.entities.get(entity) {
            Some(r) => (r.table, r.row as usize),
            None => return,
        };
        let from_table = from.unwrap_or_else(|| self.tables.root());
        if self.tables.get(from_table).has_component(component) {
            return;
        }

        let to = self
            .tables
            .traverse_add(from_table, component, &self.type_info, &mut self.component_records);
        self.migrate(entity, from, from_row, to);
    }

    /// Removes `component` from `entity`. A no-op if `entity` doesn't have it.
    pub fn remove(&mut self, entity: Entity, component: Entity) {
        let (from, from_row) = match self.entities.get(entity) {
            Some(r) if r.table.is_some() => (r.table, r.row as usize),
            _ => return,
        };
        let from_table = from.unwrap();
        if !self.tables.get(from_table).has_component(component) {
            return;
        }

        let to = self
            .tables
            .traverse_remove(from_table, component, &self.type_info, &mut self.component_records);
        self.migrate(entity, from, from_row, to);
    }

    /// # Safety
    /// `T` must match `component`'s registered layout.
    pub unsafe fn get<T>(&self, entity: Entity, component: Entity) -> Option<&T> {
        let record = self.entities.get(entity)?;
        let table_id = record.table?;
        let row = record.row as usize;
        let table = self.tables.get(table_id);
        let col = table.column_index(component)?;
        Some(table.column(col).get::<T>(row))
    }

    /// # Safety
    /// See [`World::get`]. Bumps the column's change counter.
    pub unsafe fn get_mut<T>(&mut self, entity: Entity, component: Entity) -> Option<&mut T> {
        let record = *self.entities.get(entity)?;
        let table_id = record.table?;
        let col = self.tables.get(table_id).column_index(component)?;
        Some(self.tables.get_mut(table_id).column_mut(col).get_mut::<T>(record.row as usize))
    }

    /// Sets `entity`'s `component` to `value`, adding the component first if
    /// `entity` doesn't already have it (mirrors the `ecs_set` macro's
    /// add-then-write convenience). `T: Copy` since the underlying column is an
    /// untyped byte buffer with no drop glue — it holds plain-old-data layouts.
    pub fn set<T: Copy + 'static>(&mut self, entity: Entity, component: Entity, value: T) {
        self.add(entity, component);
        let record = match self.entities.get(entity) {
            Some(r) => *r,
            None => return,
        };
        let table_id = match record.table {
            Some(t) => t,
            None => return,
        };
        if let Some(col) = self.tables.get(table_id).column_index(component) {
            let bytes = unsafe { std::slice::from_raw_parts(&value as *const T as *const u8, std::mem::size_of::<T>()) };
            unsafe {
                self.tables.get_mut(table_id).column_mut(col).set_raw(record.row as usize, bytes);
            }
        }
    }

    /// Moves `entity` from `from` (if any) into `to`, copying every component the
    /// two archetypes share and fixing up both the vacated row's displaced
    /// occupant and `entity`'s own record.
    fn migrate(&mut self, entity: Entity, from: Option<TableId>, from_row: usize, to: TableId) {
        let to_row = self.tables.get_mut(to).append(entity);

        if let Some(from_id) = from {
            self.copy_shared_components(from_id, from_row, to, to_row);
            self.detach_from_table(from_id, from_row);
        }

        if let Some(r) = self.entities.get_mut(entity) {
            r.table = Some(to);
            r.row = to_row as u32;
        }
    }

    /// Swap-removes whatever occupies `row` of `table_id`, fixing up the record of
    /// whichever entity got swapped into that slot.
    fn detach_from_table(&mut self, table_id: TableId, row: usize) {
        if let Some(moved) = self.tables.get_mut(table_id).swap_remove(row) {
            if let Some(r) = self.entities.get_mut(moved) {
                r.row = row as u32;
            }
        }
    }

    /// Copies every component `from` and `to` both carry storage for, byte for
    /// byte, from `from_row` to `to_row`.
    fn copy_shared_components(&mut self, from: TableId, from_row: usize, to: TableId, to_row: usize) {
        let shared_ty = self.tables.get(from).ty().clone();
        for component in shared_ty {
            let from_col = self.tables.get(from).column_index(component);
            let to_col = self.tables.get(to).column_index(component);
            if let (Some(fc), Some(tc)) = (from_col, to_col) {
                let bytes = unsafe { self.tables.get(from).column(fc).raw(from_row) }.to_vec();
                unsafe {
                    self.tables.get_mut(to).column_mut(tc).set_raw(to_row, &bytes);
                }
            }
        }
    }

    // -- queries --------------------------------------------------------

    pub fn query_init(&self, terms: Vec<Term>) -> Query {
        Query::init(&self.tables, terms)
    }

    /// Like [`World::query_init`], but rejects an empty term list instead of
    /// building a query that vacuously matches every table (§3.5).
    pub fn query_try_init(&self, terms: Vec<Term>) -> Result<Query, WorldError> {
        if terms.is_empty() {
            return Err(WorldError::EmptyTermList);
        }
        Ok(Query::init(&self.tables, terms))
    }

    /// Rescans `query` against tables created since its last match (§4.H).
    pub fn query_rematch(&self, query: &mut Query) {
        query.rematch(&self.tables);
    }

    /// Whether any of `query`'s matched tables changed a read field since its last
    /// [`World::query_sync`] (§4.I).
    pub fn query_changed(&self, query: &Query) -> bool {
        query.changed(&self.tables)
    }

    /// Records `query`'s matched tables' current change-counter snapshot as the new
    /// baseline for [`World::query_changed`].
    pub fn query_sync(&self, query: &mut Query) {
        query.sync(&self.tables);
    }

    pub fn query_iter<'a>(&'a self, query: &'a Query) -> Iter<'a> {
        Iter::new(query, &self.tables)
    }

    pub fn query_iter_with_change_tracking<'a>(&'a self, query: &'a mut Query) -> Iter<'a> {
        Iter::with_change_tracking(query, &self.tables)
    }

    // -- systems --------------------------------------------------------

    /// Registers a system, running the auto-dependency planner (§4.J) against
    /// every system already registered.
    #[allow(clippy::too_many_arguments)]
    pub fn system_init(
        &mut self,
        name: impl Into<String>,
        terms: Vec<Term>,
        callback: Callback,
        iter_mode: IterMode,
        sync_mode: SyncMode,
    ) -> SystemId {
        let id = SystemId(self.systems.len() as u32);
        let system = System::new(id, name, &self.tables, terms, callback, iter_mode, sync_mode, &self.systems);
        debug!(system = system.name(), depends_on = system.depends_on().len(), "system registered");
        self.systems.push(system);
        id
    }

    pub fn system_depends_on(&self, id: SystemId) -> &[SystemId] {
        self.systems[id.0 as usize].depends_on()
    }

    /// Mirrors `ecs_progress`: lane 0 rematches every Terms-mode system's query,
    /// builds one DAG task per system wired to its planner-inferred dependencies,
    /// and every lane then cooperatively drains the queue (§4.D/§4.J).
    ///
    /// # Safety
    /// Must be called collectively by every lane in `ctx`'s thread group at the
    /// same program point; `queue` must not be shared with any other concurrent
    /// `progress` call.
    pub fn progress(&mut self, ctx: &ThreadContext, queue: &TaskQueue) {
        if ctx.is_main_thread() {
            self.build_frame_tasks(queue);
        }
        ctx.lane_sync();
        queue.process(ctx);
    }

    fn build_frame_tasks(&mut self, queue: &TaskQueue) {
        queue.reset_counters();
        // Raw addresses, not references, cross into the `Send` task closures below:
        // a `*const`/`*mut` pointer is itself `!Send`, but the `usize` it's cast
        // through is plain data.
        let tables_addr = &self.tables as *const TableStore as usize;
        let mut handles: Vec<TaskHandle> = Vec::with_capacity(self.systems.len());

        for system in self.systems.iter_mut() {
            if let IterMode::Terms = system.iter_mode() {
                system.query_mut().rematch(unsafe { &*(tables_addr as *const TableStore) });
            }

            let deps: Vec<TaskHandle> = system.depends_on().iter().map(|dep| handles[dep.0 as usize]).collect();

            let name = system.name().to_string();
            let sys_addr = system as *mut System as usize;
            let handle = queue.append(
                move || {
                    // SAFETY: `tables_addr`/`sys_addr` stay valid for the duration of this
                    // task: `progress` does not return until the `queue.process` call
                    // just below has drained every task scheduled here.
                    let tables = unsafe { &*(tables_addr as *const TableStore) };
                    let system = unsafe { &mut *(sys_addr as *mut System) };
                    run_system(system, tables);
                    debug!(system = %name, "system executed");
                },
                &deps,
            );
            handles.push(handle);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}

/// Drives one system's callback for the current lane (via the thread-local
/// context set by [`crate::context::tctx_set_current`]), then honours its
/// `SyncMode` (§4.J).
fn run_system(system: &mut System, tables: &TableStore) {
    match system.iter_mode() {
        IterMode::Terms => {
            let matched = system.query().matched_tables().to_vec();
            for table_id in matched {
                let table = tables.get(table_id);
                let range = lane_range_or_all(table.count() as u64);
                if let Callback::Terms(cb) = system.callback_mut() {
                    cb(table, range);
                }
            }
        }
        IterMode::Range { iter_count } => {
            let range = lane_range_or_all(*iter_count);
            if let Callback::Range(cb) = system.callback_mut() {
                cb(range);
            }
        }
    }

    if let SyncMode::Barrier = system.sync_mode() {
        if let Some(ctx) = unsafe { tctx_current() } {
            ctx.lane_sync();
        }
    }
}

/// This lane's partition of `[0, count)`, or the whole range if no
/// `ThreadContext` was installed (e.g. a single-threaded test calling a system
/// callback directly).
fn lane_range_or_all(count: u64) -> Range {
    match unsafe { tctx_current() } {
        Some(ctx) => ctx.lane_range(count),
        None => Range { min: 0, max: count },
    }
}
