//! Named, priority-ordered container with lazy value materialization.
//!
//! # Responsibilities
//! - Keep items unique by name, ordered by descending priority
//! - Resolve raw items into values on first access, at most once
//! - Hand out the same resolved value on every later access
//!
//! # Design Decisions
//! - Each slot is an explicit `Unresolved(raw) | Resolved(value)` cell
//! - The resolver is a pure function of the raw item; the list swaps the
//!   cell after it returns, so no borrow is held while resolving
//! - Equal priorities fall back to insertion order, newest first by default

use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;

use crate::error::{RouterError, RouterResult};

/// Resolves a raw item into its value.
pub type Resolver<R, V> = Box<dyn Fn(R) -> RouterResult<V>>;

/// How entries with equal priority are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Most recently inserted first.
    #[default]
    Lifo,
    /// Declaration order.
    Fifo,
}

enum Slot<R, V> {
    Unresolved(R),
    Resolved(V),
}

struct Entry<R, V> {
    priority: i32,
    serial: u64,
    slot: Slot<R, V>,
}

/// Priority-ordered map of lazily resolved items.
pub struct PriorityList<R, V> {
    entries: RefCell<IndexMap<String, Entry<R, V>>>,
    serial: u64,
    tie_break: TieBreak,
    resolver: Resolver<R, V>,
}

impl<R, V> fmt::Debug for PriorityList<R, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        f.debug_struct("PriorityList")
            .field("names", &entries.keys().collect::<Vec<_>>())
            .field("tie_break", &self.tie_break)
            .finish()
    }
}

impl<R: Clone, V: Clone> PriorityList<R, V> {
    /// Create an empty list resolving items with `resolver`.
    pub fn new(resolver: impl Fn(R) -> RouterResult<V> + 'static) -> Self {
        Self {
            entries: RefCell::new(IndexMap::new()),
            serial: 0,
            tie_break: TieBreak::default(),
            resolver: Box::new(resolver),
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Add or replace an entry. A replaced entry is unresolved again and
    /// takes the newest insertion position.
    pub fn insert(&mut self, name: impl Into<String>, raw: R, priority: i32) {
        self.serial += 1;
        self.entries.get_mut().insert(
            name.into(),
            Entry {
                priority,
                serial: self.serial,
                slot: Slot::Unresolved(raw),
            },
        );
    }

    /// Resolved value for `name`, resolving it on first access.
    pub fn get(&self, name: &str) -> RouterResult<V> {
        let raw = {
            let entries = self.entries.borrow();
            let entry = entries
                .get(name)
                .ok_or_else(|| RouterError::NotFound(format!("item \"{name}\"")))?;
            match &entry.slot {
                Slot::Resolved(value) => return Ok(value.clone()),
                Slot::Unresolved(raw) => raw.clone(),
            }
        };

        let value = (self.resolver)(raw)?;
        if let Some(entry) = self.entries.borrow_mut().get_mut(name) {
            // A re-entrant resolution may have won the race; keep its value.
            match &entry.slot {
                Slot::Resolved(existing) => return Ok(existing.clone()),
                Slot::Unresolved(_) => entry.slot = Slot::Resolved(value.clone()),
            }
        }
        Ok(value)
    }

    /// Replace the value of an existing entry.
    pub fn set(&mut self, name: &str, value: V) -> RouterResult<()> {
        match self.entries.get_mut().get_mut(name) {
            Some(entry) => {
                entry.slot = Slot::Resolved(value);
                Ok(())
            }
            None => Err(RouterError::Runtime(format!("item {name} not found"))),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    /// Remove an entry, returning whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.get_mut().shift_remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.get_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn priority(&self, name: &str) -> Option<i32> {
        self.entries.borrow().get(name).map(|e| e.priority)
    }

    /// Whether the entry has already been materialized.
    pub fn is_resolved(&self, name: &str) -> bool {
        matches!(
            self.entries.borrow().get(name).map(|e| &e.slot),
            Some(Slot::Resolved(_))
        )
    }

    /// Entry names in iteration order, without resolving anything.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.borrow();
        let mut order: Vec<(&String, i32, u64)> = entries
            .iter()
            .map(|(name, e)| (name, e.priority, e.serial))
            .collect();
        order.sort_by(|a, b| {
            b.1.cmp(&a.1).then_with(|| match self.tie_break {
                TieBreak::Lifo => b.2.cmp(&a.2),
                TieBreak::Fifo => a.2.cmp(&b.2),
            })
        });
        order.into_iter().map(|(name, _, _)| name.clone()).collect()
    }

    /// Walk entries in priority order, resolving each on first visit.
    pub fn iter(&self) -> Iter<'_, R, V> {
        Iter {
            list: self,
            names: self.names().into_iter(),
        }
    }

    /// All entries, resolved, in priority order.
    pub fn to_vec(&self) -> RouterResult<Vec<(String, V)>> {
        self.iter().collect()
    }
}

/// Ordered, lazily resolving iterator over a [`PriorityList`].
pub struct Iter<'a, R, V> {
    list: &'a PriorityList<R, V>,
    names: std::vec::IntoIter<String>,
}

impl<R: Clone, V: Clone> Iterator for Iter<'_, R, V> {
    type Item = RouterResult<(String, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.next()?;
        Some(self.list.get(&name).map(|value| (name, value)))
    }
}
