use std::sync::{Arc, Weak};

use async_trait::async_trait;
use mint_common::context::Context;

use crate::core::error::LedgerError;

/// Handle of one open unit-of-work.
///
/// The handle travels to repository calls inside the request `Context`; a
/// write issued with it stays invisible to other transactions until commit.
/// The embedded token doubles as a liveness marker: when the request future
/// is dropped before settling, every clone of the handle goes away and the
/// backend treats the orphaned writes as rolled back.
#[derive(Clone)]
pub struct TxHandle {
    id: u64,
    token: Arc<()>,
}

impl TxHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            token: Arc::new(()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.token)
    }
}

/// Unit-of-work contract: everything written between `begin` and `commit`
/// becomes visible atomically; `rollback` discards it. Repository calls
/// issued without a handle in their context are single-operation
/// autocommits.
#[async_trait]
pub trait TransactionalProvider {
    async fn begin_transaction(&self) -> Result<TxHandle, LedgerError>;

    async fn commit_transaction(&self, handle: TxHandle) -> Result<(), LedgerError>;

    async fn rollback_transaction(&self, handle: TxHandle) -> Result<(), LedgerError>;
}

/// Transaction handle carried by the given context, if any.
pub fn ambient_transaction(ctx: &Context) -> Option<&TxHandle> {
    ctx.get_optional::<TxHandle>()
}
