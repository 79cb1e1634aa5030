//! Per-table change detection over query results (component I).
//!
//! No original-source file covers this directly; grounded on §4.I's description
//! of a monotonic per-column change counter compared against a query's per-table
//! last-synced snapshot — the same "cheap baseline, explicit sync point" shape as
//! [`crate::task`]'s ticket counters, applied at table granularity instead of a
//! queue slot.

use crate::query::{InOut, Term};
use crate::table::{TableId, TableStore};
use fxhash::FxHashMap;

/// Tracks, per table a query has matched, the change-counter snapshot observed at
/// the last [`crate::query::Query::sync`]/[`crate::query::Iter::sync`] call.
pub struct ChangeTracker {
    last_seen: FxHashMap<TableId, u32>,
}

impl ChangeTracker {
    pub fn new() -> ChangeTracker {
        ChangeTracker {
            last_seen: FxHashMap::default(),
        }
    }

    fn current_version(store: &TableStore, terms: &[Term], table_id: TableId) -> u32 {
        let table = store.get(table_id);
        terms
            .iter()
            .filter(|t| matches!(t.resolved_inout(), InOut::In | InOut::InOut))
            .filter_map(|t| table.column_index(t.id))
            .map(|c| table.column(c).change_counter())
            .max()
            .unwrap_or(0)
    }

    pub fn table_changed(&self, store: &TableStore, terms: &[Term], table_id: TableId) -> bool {
        let current = Self::current_version(store, terms, table_id);
        self.last_seen.get(&table_id).copied().unwrap_or(0) != current
    }

    pub fn changed(&self, store: &TableStore, terms: &[Term], matched: &[TableId]) -> bool {
        matched.iter().any(|&id| self.table_changed(store, terms, id))
    }

    pub fn sync_table(&mut self, store: &TableStore, terms: &[Term], table_id: TableId) {
        let current = Self::current_version(store, terms, table_id);
        self.last_seen.insert(table_id, current);
    }

    pub fn sync(&mut self, store: &TableStore, terms: &[Term], matched: &[TableId]) {
        for &id in matched {
            self.sync_table(store, terms, id);
        }
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        ChangeTracker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::table::{ComponentRecord, TypeInfo, HI_COMPONENT_ID};

    #[test]
    fn detects_change_only_after_a_write_and_resets_on_sync() {
        let mut store = TableStore::new();
        let mut type_info: Vec<Option<TypeInfo>> = vec![None; HI_COMPONENT_ID];
        let mut records: Vec<Option<ComponentRecord>> = vec![None; HI_COMPONENT_ID];
        let pos = Entity(10);
        type_info[10] = Some(TypeInfo::of::<f32>(pos, "Position"));

        let root = store.root();
        let table_id = store.traverse_add(root, pos, &type_info, &mut records);
        store.get_mut(table_id).append(Entity(100));

        let terms = vec![Term::new(pos)];
        let mut tracker = ChangeTracker::new();
        tracker.sync_table(&store, &terms, table_id);
        assert!(!tracker.table_changed(&store, &terms, table_id));

        let col = store.get(table_id).column_index(pos).unwrap();
        unsafe {
            store.get_mut(table_id).column_mut(col).get_mut::<f32>(0);
        }
        assert!(tracker.table_changed(&store, &terms, table_id));

        tracker.sync_table(&store, &terms, table_id);
        assert!(!tracker.table_changed(&store, &terms, table_id));
    }

    #[test]
    fn a_write_only_term_never_registers_as_a_change() {
        let mut store = TableStore::new();
        let mut type_info: Vec<Option<TypeInfo>> = vec![None; HI_COMPONENT_ID];
        let mut records: Vec<Option<ComponentRecord>> = vec![None; HI_COMPONENT_ID];
        let pos = Entity(10);
        type_info[10] = Some(TypeInfo::of::<f32>(pos, "Position"));

        let root = store.root();
        let table_id = store.traverse_add(root, pos, &type_info, &mut records);
        store.get_mut(table_id).append(Entity(100));

        let terms = vec![Term::new(pos).out()];
        let mut tracker = ChangeTracker::new();
        tracker.sync_table(&store, &terms, table_id);
        assert!(!tracker.table_changed(&store, &terms, table_id));

        let col = store.get(table_id).column_index(pos).unwrap();
        unsafe {
            store.get_mut(table_id).column_mut(col).get_mut::<f32>(0);
        }
        assert!(!tracker.table_changed(&store, &terms, table_id));
    }
}
