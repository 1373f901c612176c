use crate::context::Context;
use crate::entity_id::EntityKey;
use crate::error::{EngineError, Result};
use crate::sheet::Sindex;
use crate::structure;
use crate::subscriber::Reaction;

/// Row or column that follows a row or column of another sheet.
///
/// Position and size are presentation only, so updates do not propagate. A
/// deleted parent takes the follower (and its cells) with it.
#[derive(Debug, Clone)]
pub struct SindexSubscriber {
    sindex: Sindex,
}

impl SindexSubscriber {
    pub fn new(sindex: Sindex) -> Self {
        Self { sindex }
    }

    pub fn sindex(&self) -> &Sindex {
        &self.sindex
    }

    pub fn into_sindex(self) -> Sindex {
        self.sindex
    }

    /// Follow exactly one sindex on the same axis.
    pub fn follow_sindexes(&mut self, publishers: &[Sindex], ctx: &mut Context) -> Result<()> {
        let [parent] = publishers else {
            return Err(EngineError::Arity {
                expected: "exactly 1",
                actual: publishers.len(),
            });
        };
        if parent.axis != self.sindex.axis {
            return Err(EngineError::Invariant(format!(
                "{} {} cannot follow {} {}",
                self.sindex.axis, self.sindex.id, parent.axis, parent.id
            )));
        }
        ctx.broker.subscribe(&[parent.key()], self.sindex.key())
    }

    pub fn unfollow_sindexes(&mut self, publishers: &[Sindex], ctx: &mut Context) -> Result<()> {
        let keys: Vec<EntityKey> = publishers.iter().map(Sindex::key).collect();
        ctx.broker.unsubscribe(&keys, self.sindex.key());
        Ok(())
    }

    pub fn on_sindex_updated(&mut self, _old: &Sindex, _actual: &Sindex, _ctx: &mut Context) -> Result<Reaction> {
        Ok(Reaction::Unchanged)
    }

    /// Delete this sindex from its own sheet.
    pub fn on_sindex_deleted(&mut self, publisher: &Sindex, ctx: &mut Context) -> Result<Reaction> {
        log::debug!("{} follows deleted {}; removing it", self.sindex.id, publisher.id);
        let Sindex { sheet_id, position, axis, .. } = self.sindex;
        structure::delete_sindexes_from_position(ctx, sheet_id, position, 1, axis)?;
        Ok(Reaction::Removed)
    }
}
