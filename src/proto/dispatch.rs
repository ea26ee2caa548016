//! Command dispatch by (command kind, target id).
//!
//! Handlers are plain function pointers over a caller-chosen context
//! type. The registry is filled once at start-up, then moved into the
//! [`Dispatcher`], which never mutates it again.

use log::debug;

use super::message::{CommandKind, ErrorCode, Message, Outbox, Responder};
use crate::config::ProtocolVersion;
use crate::error::DispatchError;

/// Maximum number of (kind, target) routes.
pub const MAX_HANDLERS: usize = 32;

/// A request handler.
pub type Handler<C> = fn(&mut C, &Message<'_>, &mut Responder<'_>);

/// One registered route.
pub struct HandlerEntry<C> {
    pub kind: CommandKind,
    pub target: u8,
    pub handler: Handler<C>,
}

// Derives would demand `C: Clone`.
impl<C> Clone for HandlerEntry<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for HandlerEntry<C> {}

/// Route table, at most one handler per key.
pub struct HandlerRegistry<C> {
    entries: heapless::Vec<HandlerEntry<C>, MAX_HANDLERS>,
}

impl<C> HandlerRegistry<C> {
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        kind: CommandKind,
        target: u8,
        handler: Handler<C>,
    ) -> Result<(), DispatchError> {
        if self.lookup(kind, target).is_some() {
            return Err(DispatchError::DuplicateHandler {
                kind: kind as u8,
                target,
            });
        }
        self.entries
            .push(HandlerEntry {
                kind,
                target,
                handler,
            })
            .map_err(|_| DispatchError::RegistryFull)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        kind: CommandKind,
        target: u8,
        handler: Handler<C>,
    ) -> Result<Self, DispatchError> {
        self.register(kind, target, handler)?;
        Ok(self)
    }

    pub fn lookup(&self, kind: CommandKind, target: u8) -> Option<Handler<C>> {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.target == target)
            .map(|e| e.handler)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HandlerEntry<C>] {
        &self.entries
    }
}

impl<C> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to a dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran.
    Handled,
    /// No handler, silently dropped (legacy peers).
    Ignored,
    /// No handler, an unsupported error was queued.
    Rejected,
}

/// Routes parsed messages to their handlers.
pub struct Dispatcher<C> {
    registry: HandlerRegistry<C>,
    version: ProtocolVersion,
}

impl<C> Dispatcher<C> {
    pub fn new(registry: HandlerRegistry<C>, version: ProtocolVersion) -> Self {
        Self { registry, version }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn registry(&self) -> &HandlerRegistry<C> {
        &self.registry
    }

    pub fn dispatch(&self, ctx: &mut C, msg: &Message<'_>, outbox: &mut Outbox) -> DispatchOutcome {
        let mut responder = Responder::new(self.version, msg.seq, outbox);
        match self.registry.lookup(msg.kind, msg.target) {
            Some(handler) => {
                handler(ctx, msg, &mut responder);
                DispatchOutcome::Handled
            }
            None => {
                debug!("link: no handler for {:?}/{}", msg.kind, msg.target);
                if responder.error(msg.target, ErrorCode::Unsupported) {
                    DispatchOutcome::Rejected
                } else {
                    DispatchOutcome::Ignored
                }
            }
        }
    }
}
