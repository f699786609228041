//! Listener registrations, server-pushed events and lifecycle events.

mod codecs;
mod dispatcher;
mod event;
mod lifecycle;
mod service;

pub use codecs::{
    ListenerMessageCodec, MapInvalidationListenerCodec, ReplicatedMapNearCacheListenerCodec,
    TopicListenerCodec,
};
pub use event::{decode_event, ClientEvent, EventHandler};
pub use lifecycle::LifecycleEvent;

pub(crate) use dispatcher::EventDispatcher;
pub(crate) use lifecycle::LifecycleBroadcaster;
pub(crate) use service::ListenerService;
