//! Closed-set typed event bus.
//!
//! An [`EventBus`] is parameterised by an [`EventSet`]: a marker type that
//! lists, at compile time, every event type the bus accepts.  Each member
//! type carries a constant slot index, so subscribing or dispatching a type
//! outside the set is a compile error and lookups never go through runtime
//! type reflection.
//!
//! ```rust
//! use cadence_kernel::{EventBus, event_set};
//!
//! #[derive(Debug)]
//! struct Connected { peer: u32 }
//! #[derive(Debug)]
//! struct Disconnected { peer: u32 }
//!
//! event_set!(pub NetEvents { Connected, Disconnected });
//!
//! let bus = EventBus::<NetEvents>::new();
//! let _sub = bus.subscribe(|e: &Connected| println!("peer {} up", e.peer));
//! bus.dispatch(Connected { peer: 7 });
//! ```
//!
//! # Concurrency
//!
//! Subscribing and unsubscribing take the listener table's write lock.
//! Dispatch clones the relevant listener list under the read lock and drops
//! the lock before calling anything, so a listener may subscribe or
//! unsubscribe (itself included) from inside a callback without deadlocking.
//! Such changes affect later dispatches, not the one in progress.
//!
//! A panic in a listener during [`EventBus::dispatch`] propagates to the
//! caller and skips the remaining listeners.  [`EventBus::dispatch_async`]
//! runs on a detached thread, so panics there are caught and logged.
//!
//! `dispatch_async` spawns one OS thread per call with no upper bound; a
//! caller that dispatches faster than listeners complete can exhaust the
//! process's thread budget, in which case the call returns
//! [`KernelError::ThreadSpawn`].

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::thread;

use crossbeam::sync::ShardedLock;

use crate::error::{KernelError, Result};
use crate::pacer::panic_message;
use crate::subscription::SubscriptionHandle;

// ---------------------------------------------------------------------------
// Event set traits
// ---------------------------------------------------------------------------

/// A closed set of event types accepted by an [`EventBus`].
///
/// Implement it with [`event_set!`](crate::event_set) rather than by hand.
pub trait EventSet: Send + Sync + 'static {
    /// Member type names, indexed by slot.
    const NAMES: &'static [&'static str];
    /// Number of members.
    const LEN: usize = Self::NAMES.len();
}

/// Marks `Self` as a member of the event set `S`.
pub trait Member<S: EventSet>: Send + Sync + 'static {
    /// Position of this type in `S`; unique within the set.
    const SLOT: usize;
}

/// Declare a closed event set.
///
/// Expands to a unit marker struct implementing [`EventSet`] and a
/// [`Member`] impl for every listed type.  Listing the same type twice is a
/// compile error.
#[macro_export]
macro_rules! event_set {
    ($(#[$meta:meta])* $vis:vis $name:ident { $($event:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        const _: () = {
            #[allow(non_camel_case_types, dead_code)]
            enum Slot { $($event),+ }

            impl $crate::bus::EventSet for $name {
                const NAMES: &'static [&'static str] = &[$(stringify!($event)),+];
            }

            $(
                impl $crate::bus::Member<$name> for $event {
                    const SLOT: usize = Slot::$event as usize;
                }
            )+
        };
    };
}

// ---------------------------------------------------------------------------
// Bus internals
// ---------------------------------------------------------------------------

type ErasedListener = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct Listener {
    id: u64,
    call: ErasedListener,
}

struct BusInner<S> {
    /// One listener list per slot, in subscription order.
    slots: ShardedLock<Vec<Vec<Listener>>>,
    next_id: AtomicU64,
    _set: PhantomData<fn() -> S>,
}

impl<S: EventSet> BusInner<S> {
    fn snapshot(&self, slot: usize) -> Vec<ErasedListener> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots[slot].iter().map(|l| Arc::clone(&l.call)).collect()
    }

    fn deliver<T: Member<S>>(&self, event: &T) {
        let listeners = self.snapshot(T::SLOT);
        tracing::trace!(
            event = S::NAMES[T::SLOT],
            listeners = listeners.len(),
            "dispatching"
        );
        let event: &dyn Any = event;
        for call in listeners {
            call(event);
        }
    }

    fn remove(&self, slot: usize, id: u64) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let list = &mut slots[slot];
        if let Some(pos) = list.iter().position(|l| l.id == id) {
            list.remove(pos);
            tracing::debug!(event = S::NAMES[slot], listener = id, "listener removed");
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Typed publish/subscribe registry over the event set `S`.
///
/// Cheaply cloneable; clones share one listener table.
pub struct EventBus<S: EventSet> {
    inner: Arc<BusInner<S>>,
}

impl<S: EventSet> EventBus<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                slots: ShardedLock::new((0..S::LEN).map(|_| Vec::new()).collect()),
                next_id: AtomicU64::new(0),
                _set: PhantomData,
            }),
        }
    }

    /// Register `callback` for events of type `T`.
    ///
    /// The listener stays registered until the returned handle is dropped or
    /// unsubscribed.
    pub fn subscribe<T, F>(&self, callback: F) -> SubscriptionHandle
    where
        T: Member<S>,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let call: ErasedListener = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<T>() {
                callback(event);
            }
        });

        self.inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)[T::SLOT]
            .push(Listener { id, call });
        tracing::debug!(event = S::NAMES[T::SLOT], listener = id, "listener subscribed");

        let bus = Arc::downgrade(&self.inner);
        SubscriptionHandle::new(move || {
            if let Some(bus) = bus.upgrade() {
                bus.remove(T::SLOT, id);
            }
        })
    }

    /// Invoke every listener currently subscribed to `T`, in subscription
    /// order, on the calling thread.
    pub fn dispatch<T: Member<S>>(&self, event: T) {
        self.inner.deliver(&event);
    }

    /// Deliver `event` on a new detached thread and return immediately.
    ///
    /// There is no ordering between concurrent async dispatches.
    pub fn dispatch_async<T: Member<S>>(&self, event: T) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let name = S::NAMES[T::SLOT];
        thread::Builder::new()
            .name(format!("dispatch-{name}"))
            .spawn(move || {
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(|| inner.deliver(&event)))
                {
                    tracing::error!(
                        event = name,
                        panic = %panic_message(payload.as_ref()),
                        "listener panicked during async dispatch"
                    );
                }
            })
            .map(drop)
            .map_err(|e| {
                tracing::error!(event = name, error = %e, "async dispatch spawn failed");
                KernelError::ThreadSpawn {
                    name: format!("dispatch-{name}"),
                    reason: e.to_string(),
                }
            })
    }

    /// Number of listeners currently subscribed to `T`.
    pub fn listener_count<T: Member<S>>(&self) -> usize {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)[T::SLOT]
            .len()
    }

    /// Number of listeners across all event types.
    pub fn total_listeners(&self) -> usize {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Vec::len)
            .sum()
    }
}

impl<S: EventSet> Clone for EventBus<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: EventSet> Default for EventBus<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSet> std::fmt::Debug for EventBus<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.inner.slots.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map()
            .entries(S::NAMES.iter().zip(slots.iter().map(Vec::len)))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
