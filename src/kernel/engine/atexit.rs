//! At-exit bookkeeping
//!
//! Actions are stored in registration order and always handed out newest
//! first, mirroring static destructor order.

use std::fmt;

use crate::backends::loader::Destructor;
use crate::backends::{SymbolAddress, Value};
use crate::kernel::transaction::{DeclId, TransactionId};

/// Entity whose unload triggers an action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtExitOwner {
    Transaction(TransactionId),
    Library(String),
}

impl fmt::Display for AtExitOwner {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AtExitOwner::Transaction(id) => write!(f, "transaction {}", id),
            AtExitOwner::Library(name) => write!(f, "library `{}`", name),
        }
    }
}

/// What to call
#[derive(Clone)]
pub enum AtExitCallback {
    /// Generated function called with one argument.
    ///
    /// `address` is bound when the action is registered; the name is kept
    /// for logging only.
    Jit {
        function: String,
        address: SymbolAddress,
        arg: Value,
    },
    /// Host routine
    Native(Destructor),
}

impl fmt::Debug for AtExitCallback {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            AtExitCallback::Jit {
                function,
                address,
                arg,
            } => f
                .debug_struct("Jit")
                .field("function", function)
                .field("address", address)
                .field("arg", arg)
                .finish(),
            AtExitCallback::Native(_) => f.write_str("Native(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtExitAction {
    pub callback: AtExitCallback,
    pub owner: AtExitOwner,
    /// Declaration whose code registered the action
    pub from_decl: Option<DeclId>,
}

/// Outstanding at-exit actions
#[derive(Debug, Default)]
pub struct AtExitRegistry {
    actions: Vec<AtExitAction>,
}

impl AtExitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        action: AtExitAction,
    ) {
        self.actions.push(action);
    }

    /// Remove the actions of `owner`, newest first
    pub fn take_owned(
        &mut self,
        owner: &AtExitOwner,
    ) -> Vec<AtExitAction> {
        let (mut owned, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.actions)
            .into_iter()
            .partition(|action| &action.owner == owner);
        self.actions = rest;
        owned.reverse();
        owned
    }

    /// Remove every action, newest first
    pub fn drain_all(&mut self) -> Vec<AtExitAction> {
        let mut all = std::mem::take(&mut self.actions);
        all.reverse();
        all
    }

    /// Number of actions waiting on `owner`
    pub fn pending_for(
        &self,
        owner: &AtExitOwner,
    ) -> usize {
        self.actions
            .iter()
            .filter(|action| &action.owner == owner)
            .count()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
