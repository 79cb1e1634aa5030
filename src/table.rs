//! Archetype tables: type-info, column-major storage, and the add/remove graph
//! (component G).
//!
//! Grounded on `original_source/wasm-multicore-demo/ecs/ecs_table.c`
//! (`ecs_table_init`/`_append`/`_delete`, the type-hash table map) for storage
//! layout and the `EcsGraphNode`/`EcsGraphEdge` declarations in `ecs_table.h` for
//! the archetype graph shape; no `.c` body for graph traversal or `ecs_add`/
//! `ecs_remove` was present in the retrieved source, so that traversal logic below
//! is original, following the declared data shapes.

use crate::entity::Entity;
use fxhash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Reserved id space for components; also the size of a table's packed
/// `component_map` (§6).
pub const HI_COMPONENT_ID: usize = 256;

/// A sorted list of component ids identifying an archetype.
pub type Type = Vec<Entity>;

/// Per-component layout and identity, indexed by component id in the world
/// (§3.4's `TypeInfo`).
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub component: Entity,
    pub size: usize,
    pub align: usize,
    pub name: &'static str,
}

impl TypeInfo {
    pub fn of<T: 'static>(component: Entity, name: &'static str) -> TypeInfo {
        TypeInfo {
            component,
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            name,
        }
    }
}

/// Every archetype currently holding a given component (§3.4's `ComponentRecord`).
/// The original's intrusive `{first, last, count}` linked list becomes a plain
/// growable vector here; nothing needs O(1) removal from the middle of this list.
#[derive(Debug, Default, Clone)]
pub struct ComponentRecord {
    pub tables: Vec<TableId>,
}

/// An index into a [`TableStore`]'s table vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub(crate) u32);

impl TableId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One archetype's column-major component storage. Zero-sized ("tag") components
/// have no column: they still occupy a `type` slot but contribute nothing here.
pub struct Column {
    data: Vec<u8>,
    elem_size: usize,
    change_counter: AtomicU32,
}

impl Column {
    fn new(elem_size: usize) -> Column {
        Column {
            data: Vec::new(),
            elem_size,
            change_counter: AtomicU32::new(0),
        }
    }

    fn push_zeroed(&mut self) {
        self.data.resize(self.data.len() + self.elem_size, 0);
    }

    fn swap_remove(&mut self, row: usize, last_row: usize) {
        if row != last_row {
            let (dst, src) = (row * self.elem_size, last_row * self.elem_size);
            let (lo, hi) = if dst < src { (dst, src) } else { (src, dst) };
            let (left, right) = self.data.split_at_mut(hi);
            left[lo..lo + self.elem_size].copy_from_slice(&right[..self.elem_size]);
        }
        self.data.truncate(self.data.len() - self.elem_size);
    }

    /// # Safety
    /// `row` must be in bounds and `T`'s layout must match the column's element
    /// layout (enforced by construction from [`TypeInfo`]).
    pub unsafe fn get<T>(&self, row: usize) -> &T {
        &*(self.data.as_ptr().add(row * self.elem_size) as *const T)
    }

    /// # Safety
    /// See [`Column::get`]. Bumps the change counter.
    pub unsafe fn get_mut<T>(&mut self, row: usize) -> &mut T {
        self.change_counter.fetch_add(1, Ordering::Relaxed);
        &mut *(self.data.as_mut_ptr().add(row * self.elem_size) as *mut T)
    }

    /// # Safety
    /// `row` must be in bounds; does not bump the change counter.
    pub unsafe fn set_raw(&mut self, row: usize, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.elem_size);
        self.change_counter.fetch_add(1, Ordering::Relaxed);
        let start = row * self.elem_size;
        self.data[start..start + self.elem_size].copy_from_slice(bytes);
    }

    /// # Safety
    /// `row` must be in bounds.
    pub unsafe fn raw(&self, row: usize) -> &[u8] {
        let start = row * self.elem_size;
        &self.data[start..start + self.elem_size]
    }

    pub fn change_counter(&self) -> u32 {
        self.change_counter.load(Ordering::Acquire)
    }
}

struct GraphNode {
    add_edges: FxHashMap<Entity, TableId>,
    remove_edges: FxHashMap<Entity, TableId>,
}

impl GraphNode {
    fn new() -> GraphNode {
        GraphNode {
            add_edges: FxHashMap::default(),
            remove_edges: FxHashMap::default(),
        }
    }
}

/// One archetype: a fixed component `Type`, its column-major data, and memoised
/// graph edges to neighbouring archetypes (§3.4).
pub struct Table {
    id: TableId,
    ty: Type,
    entities: Vec<Entity>,
    columns: Vec<Column>,
    /// 1-based column index per component id below [`HI_COMPONENT_ID`]; `0` means
    /// the component is absent from this archetype's storage (tags included, since
    /// they have no column but may still appear in `ty`).
    component_map: Box<[i16; HI_COMPONENT_ID]>,
    node: GraphNode,
}

impl Table {
    fn new(id: TableId, ty: Type, type_info: &[Option<TypeInfo>]) -> Table {
        let mut component_map = Box::new([0i16; HI_COMPONENT_ID]);
        let mut columns = Vec::new();

        for &component in &ty {
            let id_usize = component.index() as usize;
            let ti = type_info.get(id_usize).and_then(|t| *t);
            if let Some(ti) = ti {
                if ti.size > 0 {
                    columns.push(Column::new(ti.size));
                    if id_usize < HI_COMPONENT_ID {
                        component_map[id_usize] = columns.len() as i16;
                    }
                }
            }
        }

        Table {
            id,
            ty,
            entities: Vec::new(),
            columns,
            component_map,
            node: GraphNode::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn column_index(&self, component: Entity) -> Option<usize> {
        let id = component.index() as usize;
        if id < HI_COMPONENT_ID {
            let packed = self.component_map[id];
            if packed <= 0 {
                None
            } else {
                Some((packed - 1) as usize)
            }
        } else {
            None
        }
    }

    pub fn has_component(&self, component: Entity) -> bool {
        let id = component.index() as usize;
        if id < HI_COMPONENT_ID {
            self.component_map[id] != 0 || self.ty.contains(&component)
        } else {
            self.ty.contains(&component)
        }
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut Column {
        &mut self.columns[index]
    }

    /// Appends `entity` with zeroed component storage, returning its row.
    pub(crate) fn append(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.columns {
            column.push_zeroed();
        }
        row
    }

    /// Removes the entity at `row` via swap-remove, returning the entity that was
    /// moved into `row` from the end (if any), so the caller can fix up its record.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        let last_row = self.entities.len() - 1;
        self.entities.swap_remove(row);
        for column in &mut self.columns {
            column.swap_remove(row, last_row);
        }
        if row != last_row {
            Some(self.entities[row])
        } else {
            None
        }
    }
}

/// Owns every archetype and the hash map from `Type` to [`TableId`] (§3.4).
pub struct TableStore {
    tables: Vec<Table>,
    table_map: FxHashMap<Type, TableId>,
}

impl TableStore {
    pub fn new() -> TableStore {
        let mut store = TableStore {
            tables: Vec::new(),
            table_map: FxHashMap::default(),
        };
        let root_id = TableId(0);
        store.tables.push(Table::new(root_id, Vec::new(), &[]));
        store.table_map.insert(Vec::new(), root_id);
        store
    }

    pub fn root(&self) -> TableId {
        TableId(0)
    }

    pub fn get(&self, id: TableId) -> &Table {
        &self.tables[id.idx()]
    }

    pub fn get_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.idx()]
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Finds the archetype for `ty`, creating it (and registering it in every
    /// member component's [`ComponentRecord`]) if it doesn't exist yet.
    pub fn find_or_create(&mut self, ty: Type, type_info: &[Option<TypeInfo>], component_records: &mut [Option<ComponentRecord>]) -> TableId {
        if ty.is_empty() {
            return self.root();
        }

        if let Some(&id) = self.table_map.get(&ty) {
            return id;
        }

        let id = TableId(self.tables.len() as u32);
        let table = Table::new(id, ty.clone(), type_info);
        for &component in &table.ty {
            let comp_id = component.index() as usize;
            if let Some(slot) = component_records.get_mut(comp_id) {
                slot.get_or_insert_with(ComponentRecord::default).tables.push(id);
            }
        }
        self.tables.push(table);
        self.table_map.insert(ty, id);
        id
    }

    /// Returns (creating if needed) the archetype reached by adding `component` to
    /// `from`'s type, memoising the edge on both tables.
    pub fn traverse_add(&mut self, from: TableId, component: Entity, type_info: &[Option<TypeInfo>], component_records: &mut [Option<ComponentRecord>]) -> TableId {
        if let Some(&cached) = self.tables[from.idx()].node.add_edges.get(&component) {
            return cached;
        }

        let mut ty = self.tables[from.idx()].ty.clone();
        let pos = ty.binary_search(&component).unwrap_or_else(|p| p);
        if ty.get(pos) == Some(&component) {
            self.tables[from.idx()].node.add_edges.insert(component, from);
            return from;
        }
        ty.insert(pos, component);

        let to = self.find_or_create(ty, type_info, component_records);
        self.tables[from.idx()].node.add_edges.insert(component, to);
        self.tables[to.idx()].node.remove_edges.insert(component, from);
        to
    }

    /// Returns (creating if needed) the archetype reached by removing `component`
    /// from `from`'s type, memoising the edge on both tables.
    pub fn traverse_remove(&mut self, from: TableId, component: Entity, type_info: &[Option<TypeInfo>], component_records: &mut [Option<ComponentRecord>]) -> TableId {
        if let Some(&cached) = self.tables[from.idx()].node.remove_edges.get(&component) {
            return cached;
        }

        let mut ty = self.tables[from.idx()].ty.clone();
        let pos = match ty.binary_search(&component) {
            Ok(p) => p,
            Err(_) => {
                self.tables[from.idx()].node.remove_edges.insert(component, from);
                return from;
            }
        };
        ty.remove(pos);

        let to = self.find_or_create(ty, type_info, component_records);
        self.tables[from.idx()].node.remove_edges.insert(component, to);
        self.tables[to.idx()].node.add_edges.insert(component, from);
        to
    }
}

impl Default for TableStore {
    fn default() -> Self {
        TableStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_component(id: u32) -> Entity {
        Entity(id as u64)
    }

    #[test]
    fn root_table_is_empty_and_shared() {
        let store = TableStore::new();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(store.root()).count(), 0);
    }

    #[test]
    fn traverse_add_then_remove_returns_to_origin() {
        let mut store = TableStore::new();
        let mut type_info: Vec<Option<TypeInfo>> = vec![None; HI_COMPONENT_ID];
        let mut records: Vec<Option<ComponentRecord>> = vec![None; HI_COMPONENT_ID];
        let c1 = mk_component(10);
        type_info[10] = Some(TypeInfo::of::<[f32; 2]>(c1, "Position"));

        let root = store.root();
        let with_c1 = store.traverse_add(root, c1, &type_info, &mut records);
        assert_ne!(with_c1, root);
        assert_eq!(store.get(with_c1).ty(), &vec![c1]);

        let back_to_root = store.traverse_remove(with_c1, c1, &type_info, &mut records);
        assert_eq!(back_to_root, root);

        // Edges are memoised and idempotent.
        let with_c1_again = store.traverse_add(root, c1, &type_info, &mut records);
        assert_eq!(with_c1_again, with_c1);
    }

    #[test]
    fn append_and_swap_remove_updates_last_entity() {
        let mut store = TableStore::new();
        let mut type_info: Vec<Option<TypeInfo>> = vec![None; HI_COMPONENT_ID];
        let mut records: Vec<Option<ComponentRecord>> = vec![None; HI_COMPONENT_ID];
        let c1 = mk_component(10);
        type_info[10] = Some(TypeInfo::of::<u32>(c1, "Count"));

        let root = store.root();
        let table_id = store.traverse_add(root, c1, &type_info, &mut records);

        let e1 = Entity(1001);
        let e2 = Entity(1002);
        let table = store.get_mut(table_id);
        let row1 = table.append(e1);
        let row2 = table.append(e2);
        assert_eq!((row1, row2), (0, 1));

        let moved = table.swap_remove(0);
        assert_eq!(moved, Some(e2));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn tag_component_has_no_column_but_counts_toward_type() {
        let mut store = TableStore::new();
        let type_info: Vec<Option<TypeInfo>> = vec![None; HI_COMPONENT_ID];
        let mut records: Vec<Option<ComponentRecord>> = vec![None; HI_COMPONENT_ID];
        let tag = mk_component(20);

        let root = store.root();
        let tagged = store.traverse_add(root, tag, &type_info, &mut records);
        let table = store.get(tagged);
        assert_eq!(table.ty(), &vec![tag]);
        assert!(table.has_component(tag));
        assert!(table.column_index(tag).is_none());
    }
}
