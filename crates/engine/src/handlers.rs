//! Default event handlers.
//!
//! One handler per `(transition, kind)`. Each asks the broker who follows the
//! changed entity, rebuilds every follower from the repositories, lets it
//! react, and saves it if it changed.

use crate::bus::EventBus;
use crate::context::Context;
use crate::entity_id::{EntityKey, EntityKind};
use crate::error::{EngineError, Result};
use crate::events::{Event, EventKind};
use crate::subscriber::{Reaction, Subscriber};

/// Boxed handler stored by the bus.
pub type Handler = Box<dyn FnMut(&Event, &mut Context) -> Result<()>>;

/// Register the six default handlers on `bus`.
pub fn register_defaults(bus: &mut EventBus) {
    for kind in EntityKind::ALL {
        bus.register(EventKind::updated(kind), handle_updated);
        bus.register(EventKind::deleted(kind), handle_deleted);
    }
}

pub fn handle_updated(event: &Event, ctx: &mut Context) -> Result<()> {
    let Event::Updated { old, new, .. } = event else {
        return Err(EngineError::Invariant(format!("{} is not an update", event.id())));
    };
    let reacted = fan_out(new.key(), ctx, |subscriber, ctx| subscriber.on_updated(old, new, ctx))?;
    log::trace!("{} {} reached {reacted} subscriber(s)", event.id(), event.kind());
    Ok(())
}

pub fn handle_deleted(event: &Event, ctx: &mut Context) -> Result<()> {
    let Event::Deleted { entity, .. } = event else {
        return Err(EngineError::Invariant(format!("{} is not a deletion", event.id())));
    };
    let reacted = fan_out(entity.key(), ctx, |subscriber, ctx| subscriber.on_deleted(entity, ctx))?;
    log::trace!("{} {} reached {reacted} subscriber(s)", event.id(), event.kind());
    remove_dangling_edges(entity.key(), ctx);
    Ok(())
}

/// Let every current subscriber of `publisher` react. Returns how many did.
///
/// Subscribers are reloaded one at a time: an earlier reaction in the same
/// fan-out may have moved or removed a later one.
fn fan_out<F>(publisher: EntityKey, ctx: &mut Context, mut react: F) -> Result<usize>
where
    F: FnMut(&mut Subscriber, &mut Context) -> Result<Reaction>,
{
    let mut keys: Vec<EntityKey> = ctx.broker.get_subscribers(publisher).into_iter().collect();
    keys.sort();

    let mut reacted = 0;
    for key in keys {
        let Some(entity) = ctx.registry.load(&ctx.repos, [key])?.pop() else {
            log::trace!("{key} no longer exists; skipping");
            continue;
        };
        let mut subscriber = ctx.factory.create(entity);
        let reaction = react(&mut subscriber, ctx)?;
        log::trace!("{key} -> {reaction:?}");
        if reaction == Reaction::Changed {
            ctx.repos.save(subscriber.into_entity())?;
        }
        reacted += 1;
    }
    Ok(reacted)
}

/// Drop edges between `key` and entities that are gone as well.
///
/// An edge to a surviving entity stays: a follower of a deleted cell keeps
/// its link and shows `REF_ERROR` until it is re-followed.
fn remove_dangling_edges(key: EntityKey, ctx: &mut Context) {
    if ctx.repos.contains(key) {
        return;
    }
    for subscriber in ctx.broker.get_subscribers(key) {
        if !ctx.repos.contains(subscriber) {
            ctx.broker.unsubscribe(&[key], subscriber);
        }
    }
    for publisher in ctx.broker.get_publishers(key) {
        if !ctx.repos.contains(publisher) {
            ctx.broker.unsubscribe(&[publisher], key);
        }
    }
}
