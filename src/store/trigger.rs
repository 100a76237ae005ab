use crate::core::error::Result;
use crate::core::types::RecId;
use crate::store::store::Store;

/// Observer fired by `Store` on every mutation (`spec.md` §4.4, §4.9).
/// Both the Gix/geo indexer and every registered stream aggregate are
/// plain `Trigger` implementations fanned out from `Store::add_trigger`.
/// Per `spec.md` §7: a trigger's own error is logged and suppressed, it
/// never aborts the mutation that fired it — callers should not
/// propagate a trigger's `Result` upward, only log it.
pub trait Trigger: Send {
    fn name(&self) -> &str;
    fn on_add_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()>;
    fn on_update_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()>;
    fn on_delete_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()>;
}
