//! Runtime query terms, cached matching, and iteration (component H).
//!
//! No `ecs_query.c` was present in the retrieved original source (only callers in
//! `demos/demo_ecs_query.c` and `tests/test_ecs_query*.c` naming the API), so the
//! term/operator vocabulary here follows §3.4/§4.H directly; the cache/filter
//! *composition* idiom (a small set of composable match predicates evaluated once
//! per archetype) is grounded on `examples/0x112233-legion/src/query.rs`'s
//! `ArchetypeFilter`/`And`/`Not` pattern, adapted from compile-time generics to
//! runtime `Term` values since the external interface (§6) requires
//! `Term::new`/`.inn()`/`.out()`/`.not()`/`.optional()`/`.or()` as runtime builders.

use crate::change::ChangeTracker;
use crate::entity::Entity;
use crate::table::{Table, TableId, TableStore};

/// Read/write access declared by a term, used by [`crate::system`]'s automatic
/// dependency planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InOut {
    /// `In` for `Not`/`Optional` terms with no explicit marker, `InOut` otherwise.
    Default,
    In,
    Out,
    InOut,
    /// Declares presence is checked but the field is never read or written.
    InOutNone,
}

/// How a term constrains archetype membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oper {
    And,
    /// Part of a run of consecutive `Or` terms: the table matches if it has at
    /// least one member of the run.
    Or,
    Not,
    Optional,
}

/// One clause of a [`Query`]: a component id plus how it constrains matching and
/// how the matched system intends to access it.
#[derive(Debug, Clone, Copy)]
pub struct Term {
    pub id: Entity,
    pub inout: InOut,
    pub oper: Oper,
}

impl Term {
    pub fn new(id: Entity) -> Term {
        Term {
            id,
            inout: InOut::Default,
            oper: Oper::And,
        }
    }

    pub fn inn(mut self) -> Term {
        self.inout = InOut::In;
        self
    }

    pub fn out(mut self) -> Term {
        self.inout = InOut::Out;
        self
    }

    pub fn in_out(mut self) -> Term {
        self.inout = InOut::InOut;
        self
    }

    /// Declares the term as access-only: its presence may gate matching but the
    /// matched system neither reads nor writes through it.
    pub fn none(mut self) -> Term {
        self.inout = InOut::InOutNone;
        self
    }

    pub fn not(mut self) -> Term {
        self.oper = Oper::Not;
        self
    }

    pub fn optional(mut self) -> Term {
        self.oper = Oper::Optional;
        self
    }

    pub fn or(mut self) -> Term {
        self.oper = Oper::Or;
        self
    }

    /// The effective access mode once `Default` is resolved against `oper`.
    pub fn resolved_inout(&self) -> InOut {
        match (self.inout, self.oper) {
            (InOut::Default, Oper::Not) => InOut::InOutNone,
            (InOut::Default, _) => InOut::InOut,
            (explicit, _) => explicit,
        }
    }

    fn matches(&self, table: &Table) -> bool {
        table.has_component(self.id)
    }
}

/// Whether `ty`'s table matches every clause of `terms` under And/Not/Or/Optional
/// semantics (§4.H). Consecutive `Or` terms are grouped: the table must have at
/// least one member of each such run.
fn table_matches(table: &Table, terms: &[Term]) -> bool {
    let mut i = 0;
    while i < terms.len() {
        let term = &terms[i];
        match term.oper {
            Oper::And => {
                if !term.matches(table) {
                    return false;
                }
                i += 1;
            }
            Oper::Not => {
                if term.matches(table) {
                    return false;
                }
                i += 1;
            }
            Oper::Optional => {
                i += 1;
            }
            Oper::Or => {
                let mut any = false;
                while i < terms.len() && terms[i].oper == Oper::Or {
                    any |= terms[i].matches(table);
                    i += 1;
                }
                if !any {
                    return false;
                }
            }
        }
    }
    true
}

/// A compiled, uncached query: the set of terms plus the archetype list they
/// currently match, recomputed each time [`Query::rematch`] is called.
pub struct Query {
    terms: Vec<Term>,
    matched: Vec<TableId>,
    last_seen_table_count: usize,
    tracker: ChangeTracker,
}

impl Query {
    /// Builds a query and performs its first match against every existing table.
    pub fn init(store: &TableStore, terms: Vec<Term>) -> Query {
        let mut q = Query {
            terms,
            matched: Vec::new(),
            last_seen_table_count: 0,
            tracker: ChangeTracker::new(),
        };
        q.rematch(store);
        q
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Rescans only tables created since the last match (append-only growth, per
    /// §9's resolved open question on late `component_register`), keeping a cached
    /// query correct without a full rescan.
    pub fn rematch(&mut self, store: &TableStore) {
        for table in store.iter().skip(self.last_seen_table_count) {
            if table_matches(table, &self.terms) {
                self.matched.push(table.id());
            }
        }
        self.last_seen_table_count = store.len();
    }

    pub fn matched_tables(&self) -> &[TableId] {
        &self.matched
    }

    /// Whether any matched table's relevant columns changed since the last
    /// [`Query::sync`] (§4.I).
    pub fn changed(&self, store: &TableStore) -> bool {
        self.tracker.changed(store, &self.terms, &self.matched)
    }

    /// Records the current change-counter snapshot of every matched table as the
    /// new baseline for [`Query::changed`].
    pub fn sync(&mut self, store: &TableStore) {
        self.tracker.sync(store, &self.terms, &self.matched);
    }
}

/// Iteration state over a [`Query`]'s matched tables, one table at a time.
pub struct Iter<'a> {
    store: &'a TableStore,
    terms: &'a [Term],
    tables: std::slice::Iter<'a, TableId>,
    current: Option<&'a Table>,
    current_id: Option<TableId>,
    row: usize,
    tracker: Option<&'a mut ChangeTracker>,
}

impl<'a> Iter<'a> {
    pub fn new(query: &'a Query, store: &'a TableStore) -> Iter<'a> {
        Iter {
            store,
            terms: &query.terms,
            tables: query.matched.iter(),
            current: None,
            current_id: None,
            row: 0,
            tracker: None,
        }
    }

    /// Like [`Iter::new`], but tracks change state so [`Iter::changed`] and
    /// [`Iter::sync`] can be used per-table during iteration.
    pub fn with_change_tracking(query: &'a mut Query, store: &'a TableStore) -> Iter<'a> {
        Iter {
            store,
            terms: &query.terms,
            tables: query.matched.iter(),
            current: None,
            current_id: None,
            row: 0,
            tracker: Some(&mut query.tracker),
        }
    }

    /// Advances to the next matching row, switching tables as needed. Returns the
    /// entity at the new position, or `None` once every matched table is exhausted.
    pub fn next(&mut self) -> Option<Entity> {
        loop {
            if let Some(table) = self.current {
                if self.row < table.count() {
                    let e = table.entities()[self.row];
                    return Some(e);
                }
            }
            match self.tables.next() {
                Some(&id) => {
                    self.current = Some(self.store.get(id));
                    self.current_id = Some(id);
                    self.row = 0;
                }
                None => return None,
            }
        }
    }

    /// Whether the table currently being iterated changed since its last
    /// [`Iter::sync`]/[`Query::sync`].
    pub fn changed(&self) -> bool {
        match (&self.tracker, self.current_id) {
            (Some(tracker), Some(id)) => tracker.table_changed(self.store, self.terms, id),
            _ => false,
        }
    }

    /// Records the current table's change-counter snapshot as its new baseline.
    pub fn sync(&mut self) {
        if let (Some(tracker), Some(id)) = (&mut self.tracker, self.current_id) {
            tracker.sync_table(self.store, self.terms, id);
        }
    }

    /// Call after consuming the entity from [`Iter::next`] to move past this row.
    pub fn advance(&mut self) {
        self.row += 1;
    }

    /// Raw bytes for `term_index`'s component at the current row, or `None` if the
    /// term is absent from the current table (only possible for `Optional` terms)
    /// or carries no storage (a zero-sized tag).
    pub fn field_raw(&self, term_index: usize) -> Option<&[u8]> {
        let table = self.current?;
        let term = self.terms.get(term_index)?;
        let col = table.column_index(term.id)?;
        Some(unsafe { table.column(col).raw(self.row) })
    }

    pub fn field_is_set(&self, term_index: usize) -> bool {
        match self.current {
            Some(table) => self.terms.get(term_index).map(|t| table.has_component(t.id)).unwrap_or(false),
            None => false,
        }
    }

    /// Typed access to `term_index`'s component at the current row.
    ///
    /// # Safety
    /// `T` must match the component's registered layout.
    pub unsafe fn field<T>(&self, term_index: usize) -> Option<&T> {
        let table = self.current?;
        let term = self.terms.get(term_index)?;
        let col = table.column_index(term.id)?;
        Some(table.column(col).get::<T>(self.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{ComponentRecord, TypeInfo, HI_COMPONENT_ID};

    fn setup() -> (TableStore, Vec<Option<TypeInfo>>, Vec<Option<ComponentRecord>>, Entity, Entity) {
        let mut store = TableStore::new();
        let mut type_info: Vec<Option<TypeInfo>> = vec![None; HI_COMPONENT_ID];
        let mut records: Vec<Option<ComponentRecord>> = vec![None; HI_COMPONENT_ID];
        let pos = Entity(10);
        let vel = Entity(11);
        type_info[10] = Some(TypeInfo::of::<[f32; 2]>(pos, "Position"));
        type_info[11] = Some(TypeInfo::of::<[f32; 2]>(vel, "Velocity"));

        let root = store.root();
        let with_pos = store.traverse_add(root, pos, &type_info, &mut records);
        let with_both = store.traverse_add(with_pos, vel, &type_info, &mut records);

        store.get_mut(with_pos).append(Entity(100));
        store.get_mut(with_both).append(Entity(200));
        store.get_mut(with_both).append(Entity(201));

        (store, type_info, records, pos, vel)
    }

    #[test]
    fn and_query_matches_only_tables_with_every_term() {
        let (store, _ti, _rec, pos, vel) = setup();
        let q = Query::init(&store, vec![Term::new(pos), Term::new(vel)]);

        let mut it = Iter::new(&q, &store);
        let mut seen = Vec::new();
        while let Some(e) = it.next() {
            seen.push(e);
            it.advance();
        }
        seen.sort();
        assert_eq!(seen, vec![Entity(200), Entity(201)]);
    }

    #[test]
    fn not_query_excludes_matching_tables() {
        let (store, _ti, _rec, pos, vel) = setup();
        let q = Query::init(&store, vec![Term::new(pos), Term::new(vel).not()]);

        let mut it = Iter::new(&q, &store);
        let mut seen = Vec::new();
        while let Some(e) = it.next() {
            seen.push(e);
            it.advance();
        }
        assert_eq!(seen, vec![Entity(100)]);
    }

    #[test]
    fn optional_term_is_unset_when_absent() {
        let (store, _ti, _rec, pos, vel) = setup();
        let q = Query::init(&store, vec![Term::new(pos), Term::new(vel).optional()]);

        let mut it = Iter::new(&q, &store);
        let mut flags = Vec::new();
        while let Some(_e) = it.next() {
            flags.push(it.field_is_set(1));
            it.advance();
        }
        flags.sort();
        assert_eq!(flags, vec![false, true, true]);
    }

    #[test]
    fn rematch_picks_up_tables_created_after_init() {
        let (mut store, mut ti, mut rec, pos, _vel) = setup();
        let mut q = Query::init(&store, vec![Term::new(pos)]);
        assert_eq!(q.matched_tables().len(), 2);

        let health = Entity(12);
        ti[12] = Some(TypeInfo::of::<f32>(health, "Health"));
        let root = store.root();
        let with_pos_health = store.traverse_add(store.traverse_add(root, pos, &ti, &mut rec), health, &ti, &mut rec);
        store.get_mut(with_pos_health).append(Entity(300));

        q.rematch(&store);
        assert_eq!(q.matched_tables().len(), 3);
    }
}
