//! Slot layout of a new type.
//!
//! Bases are laid out independently, each starting at slot 0, so merging
//! several of them produces colliding indices. [`build_table`] merges the
//! inherited schemas along the linearized ancestry, moves colliding ones
//! to free slots and gives the declared attributes the rest, so the final
//! table always covers exactly `0..N`.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::{AttrError, Result};
use crate::object_type::ObjectType;
use crate::schema::{AttributeSchema, SchemaId};

/// Finalized schema table of one type.
#[derive(Debug, Default)]
pub(crate) struct SchemaTable {
    pub attrs: IndexMap<String, Arc<AttributeSchema>>,
    /// Names declared, overridden or re-slotted by this type.
    pub specific: IndexSet<String>,
    /// Schemas this type may mutate in place.
    pub owned: HashSet<SchemaId>,
}

impl SchemaTable {
    /// Take ownership of `schema` under `name`. Returns the schema actually
    /// stored: a clone when someone else already claimed it.
    pub fn adopt(&mut self, name: &str, schema: Arc<AttributeSchema>) -> Arc<AttributeSchema> {
        let schema = if schema.claim() {
            schema
        } else {
            let copy = Arc::new(schema.as_ref().clone());
            copy.claim();
            copy
        };
        self.owned.insert(schema.id());
        self.specific.insert(name.to_string());
        self.attrs.insert(name.to_string(), schema.clone());
        schema
    }

    pub fn is_contiguous(&self) -> bool {
        let indices: BTreeSet<usize> = self.attrs.values().map(|s| s.index()).collect();
        indices.len() == self.attrs.len()
            && indices.iter().copied().eq(0..self.attrs.len())
    }
}

// ── Linearization ───────────────────────────────────────────────────

/// C3 linearization of the ancestry of a type with the given direct
/// bases, most specific first, excluding the type itself.
pub(crate) fn linearize(name: &str, bases: &[Arc<ObjectType>]) -> Result<Vec<Arc<ObjectType>>> {
    let mut seqs: Vec<VecDeque<Arc<ObjectType>>> = bases
        .iter()
        .map(|base| {
            std::iter::once(base.clone())
                .chain(base.ancestors().iter().cloned())
                .collect()
        })
        .collect();
    seqs.push(bases.iter().cloned().collect());

    let mut out = Vec::new();
    loop {
        seqs.retain(|seq| !seq.is_empty());
        if seqs.is_empty() {
            return Ok(out);
        }
        let head = seqs
            .iter()
            .map(|seq| &seq[0])
            .find(|candidate| {
                !seqs
                    .iter()
                    .any(|seq| seq.iter().skip(1).any(|t| Arc::ptr_eq(t, candidate)))
            })
            .cloned();
        let Some(head) = head else {
            let names: Vec<&str> = bases.iter().map(|b| b.name()).collect();
            return Err(AttrError::config(format!(
                "cannot create a consistent linearization for '{}' with bases {:?}",
                name, names
            )));
        };
        for seq in seqs.iter_mut() {
            if Arc::ptr_eq(&seq[0], &head) {
                seq.pop_front();
            }
        }
        out.push(head);
    }
}

// ── Merge ───────────────────────────────────────────────────────────

fn relocated(schema: &Arc<AttributeSchema>, index: usize) -> Arc<AttributeSchema> {
    let copy = Arc::new(schema.as_ref().clone());
    copy.set_index(index);
    copy
}

/// Build the schema table of type `name` from its linearized ancestors
/// and its declared attributes.
pub(crate) fn build_table(
    name: &str,
    ancestors: &[Arc<ObjectType>],
    declared: Vec<(String, Arc<AttributeSchema>)>,
) -> Result<SchemaTable> {
    let mut table = SchemaTable::default();

    // Least specific first; a later base overrides by name and inherits
    // the slot and static observers of what it replaces.
    let mut merged: IndexMap<String, Arc<AttributeSchema>> = IndexMap::new();
    for base in ancestors.iter().rev() {
        for (attr, schema) in base.specific_schemas() {
            let schema = match merged.get(&attr) {
                Some(old)
                    if !Arc::ptr_eq(old, &schema)
                        && (old.index() != schema.index() || old.has_observers()) =>
                {
                    let copy = relocated(&schema, old.index());
                    copy.copy_static_observers(old);
                    copy.claim();
                    table.owned.insert(copy.id());
                    table.specific.insert(attr.clone());
                    copy
                }
                _ => schema,
            };
            merged.insert(attr, schema);
        }
    }

    let count = merged.len()
        + declared
            .iter()
            .map(|(attr, _)| attr)
            .collect::<IndexSet<_>>()
            .into_iter()
            .filter(|attr| !merged.contains_key(*attr))
            .count();

    // Schemas sharing an index with an earlier one, or out of range.
    let mut claimed = HashSet::new();
    let mut conflicts = Vec::new();
    for (attr, schema) in &merged {
        let index = schema.index();
        if index >= count || !claimed.insert(index) {
            conflicts.push((attr.clone(), schema.clone()));
        }
    }
    let mut free = (0..count).filter(|i| !claimed.contains(i));

    conflicts.sort_by_key(|(_, schema)| schema.index());
    for (attr, schema) in &conflicts {
        let index = free.next().ok_or_else(|| {
            AttrError::Layout(format!("'{name}': no free slot for inherited '{attr}'"))
        })?;
        let copy = relocated(schema, index);
        copy.claim();
        table.owned.insert(copy.id());
        table.specific.insert(attr.clone());
        merged.insert(attr.clone(), copy);
    }
    if !conflicts.is_empty() {
        debug!(type_name = name, count = conflicts.len(), "resolved slot collisions");
    }

    table.attrs = merged;
    for (attr, schema) in declared {
        let previous = table.attrs.get(&attr).cloned();
        let schema = table.adopt(&attr, schema);
        schema.set_name(&attr);
        match previous {
            Some(old) => {
                schema.set_index(old.index());
                schema.copy_static_observers(&old);
            }
            None => {
                let index = free.next().ok_or_else(|| {
                    AttrError::Layout(format!("'{name}': no free slot for '{attr}'"))
                })?;
                schema.set_index(index);
            }
        }
    }

    if table.attrs.len() != count || !table.is_contiguous() {
        let indices: Vec<(String, usize)> = table
            .attrs
            .iter()
            .map(|(attr, s)| (attr.clone(), s.index()))
            .collect();
        return Err(AttrError::Layout(format!(
            "'{name}': slots are not exactly 0..{count}: {indices:?}"
        )));
    }
    Ok(table)
}
