//! Request/reply plumbing shared by `EventBus::receive` and `send_and_receive`.
//!
//! Both paths boil down to the same decision: publish the handler's result
//! to whichever bus the inbound event names as its reply target, falling
//! back to the bus that received the request.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::event::Event;
use crate::key::Key;

/// Resolve the bus a reply should be published on for a given inbound event:
/// its `reply_to_observable` if present, else `fallback`.
pub fn reply_target(event: &Event<impl Send + Sync>, fallback: &Arc<EventBus>) -> Arc<EventBus> {
    event.reply_to_observable().unwrap_or_else(|| fallback.clone())
}

/// Publish `data` to `event`'s reply address on the resolved reply target, if
/// the event named one. A no-op if the inbound event carries no `reply_to`.
pub fn publish_reply<R: Send + Sync + 'static>(event: &Event<impl Send + Sync>, fallback: &Arc<EventBus>, data: R) {
    let Some(reply_key) = event.reply_to().cloned() else {
        return;
    };
    reply_target(event, fallback).notify(reply_key, Event::new(Key::address(""), data));
}
