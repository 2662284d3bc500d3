//! Declaration table
//!
//! Every declaration ever made gets a record indexed by [`DeclId`]. Records
//! are never removed; rollback and unload only change their visibility and
//! drop them from the name index, so ids stay valid for bookkeeping.

use std::collections::HashMap;

use crate::kernel::transaction::{DeclId, TransactionId};
use crate::util::span::Span;

/// Return type of a function after deduction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Int,
    Void,
}

/// What a declaration declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Variable,
    Function {
        arity: usize,
        returns: ReturnKind,
        /// Transaction holding the body, if any
        definition: Option<TransactionId>,
    },
}

/// Visibility of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Added by the transaction being compiled
    Pending,
    Visible,
    /// Rolled back or unloaded
    Forgotten,
}

#[derive(Debug, Clone)]
pub struct DeclRecord {
    pub id: DeclId,
    pub name: String,
    pub kind: DeclKind,
    pub owner: TransactionId,
    pub visibility: Visibility,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct DeclTable {
    records: Vec<DeclRecord>,
    by_name: HashMap<String, Vec<DeclId>>,
}

impl DeclTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pending declaration
    pub fn declare(
        &mut self,
        name: &str,
        kind: DeclKind,
        owner: TransactionId,
        span: Span,
    ) -> DeclId {
        let id = DeclId(self.records.len() as u32);
        self.records.push(DeclRecord {
            id,
            name: name.to_string(),
            kind,
            owner,
            visibility: Visibility::Pending,
            span,
        });
        self.by_name.entry(name.to_string()).or_default().push(id);
        id
    }

    pub fn get(
        &self,
        id: DeclId,
    ) -> Option<&DeclRecord> {
        self.records.get(id.0 as usize)
    }

    /// Replace the kind of a pending declaration
    pub fn refine(
        &mut self,
        id: DeclId,
        kind: DeclKind,
    ) {
        if let Some(record) = self.records.get_mut(id.0 as usize) {
            debug_assert_eq!(record.visibility, Visibility::Pending);
            record.kind = kind;
        }
    }

    /// Latest live declaration of `name`
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<&DeclRecord> {
        self.by_name
            .get(name)
            .and_then(|ids| ids.last())
            .and_then(|id| self.get(*id))
    }

    /// Make the pending declarations of `owner` visible
    pub fn commit(
        &mut self,
        owner: TransactionId,
    ) -> usize {
        let mut count = 0;
        for record in self.records.iter_mut().rev() {
            if record.owner == owner && record.visibility == Visibility::Pending {
                record.visibility = Visibility::Visible;
                count += 1;
            }
        }
        count
    }

    /// Forget every live declaration of `owner`
    pub fn forget(
        &mut self,
        owner: TransactionId,
    ) -> usize {
        let mut forgotten = Vec::new();
        for record in self.records.iter_mut() {
            if record.owner == owner && record.visibility != Visibility::Forgotten {
                record.visibility = Visibility::Forgotten;
                forgotten.push((record.name.clone(), record.id));
            }
        }
        for (name, id) in &forgotten {
            if let Some(ids) = self.by_name.get_mut(name) {
                ids.retain(|other| other != id);
                if ids.is_empty() {
                    self.by_name.remove(name);
                }
            }
        }
        forgotten.len()
    }

    /// Number of live declarations
    pub fn live_count(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_prefers_latest() {
        let mut table = DeclTable::new();
        let first = table.declare("f", DeclKind::Variable, TransactionId(0), Span::dummy());
        table.commit(TransactionId(0));
        let second = table.declare(
            "f",
            DeclKind::Function {
                arity: 0,
                returns: ReturnKind::Int,
                definition: Some(TransactionId(1)),
            },
            TransactionId(1),
            Span::dummy(),
        );
        assert_eq!(table.lookup("f").map(|r| r.id), Some(second));

        table.forget(TransactionId(1));
        assert_eq!(table.lookup("f").map(|r| r.id), Some(first));
        assert_eq!(
            table.get(second).map(|r| r.visibility),
            Some(Visibility::Forgotten)
        );
    }

    #[test]
    fn test_forget_clears_names() {
        let mut table = DeclTable::new();
        table.declare("a", DeclKind::Variable, TransactionId(4), Span::dummy());
        table.declare("b", DeclKind::Variable, TransactionId(4), Span::dummy());
        assert_eq!(table.commit(TransactionId(4)), 2);
        assert_eq!(table.forget(TransactionId(4)), 2);
        assert!(table.lookup("a").is_none());
        assert_eq!(table.live_count(), 0);
    }
}
