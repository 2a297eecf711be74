// SPDX-License-Identifier: GPL-3.0-only

//! Element lifecycle contract
//!
//! Every processing node (device, filter, encoder, synchronizer, muxer)
//! implements [`Element`] and moves through the same three states:
//!
//! ```text
//!   Null ──init──> Paused <──toggle──> Playing
//!    ^               │                    │
//!    └────uninit─────┴────────uninit──────┘
//! ```
//!
//! Null → Paused and Null → Playing both acquire native resources. Paused and
//! Playing differ only in whether pushed packets are processed. Going back
//! to Null releases everything, flushes pending data and finalizes output.

pub mod notify;
pub mod registry;
pub mod worker;

use crate::errors::{ElementResult, PipelineError};
use crate::media::packet::Packet;
use notify::Signal;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lifecycle state of an element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ElementState {
    /// No resources held
    #[default]
    Null,
    /// Resources held, input discarded
    Paused,
    /// Resources held, input processed
    Playing,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementState::Null => "Null",
            ElementState::Paused => "Paused",
            ElementState::Playing => "Playing",
        };
        write!(f, "{}", name)
    }
}

/// Work required to move between two states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Already in the target state
    Stay,
    /// Acquire resources; `paused` tells whether input is gated afterwards
    Start { paused: bool },
    Pause,
    Resume,
    /// Release resources and finalize
    Stop,
    /// Refused by an element's own [`Lifecycle::plan`]; the default table
    /// never returns it
    Unsupported,
}

/// The uniform transition table
pub fn plan(from: ElementState, to: ElementState) -> Transition {
    use ElementState::*;

    match (from, to) {
        (Null, Null) | (Paused, Paused) | (Playing, Playing) => Transition::Stay,
        (Null, Paused) => Transition::Start { paused: true },
        (Null, Playing) => Transition::Start { paused: false },
        (Playing, Paused) => Transition::Pause,
        (Paused, Playing) => Transition::Resume,
        (Paused, Null) | (Playing, Null) => Transition::Stop,
    }
}

/// Resource hooks an element provides to [`StateCell::drive`]
pub trait Lifecycle {
    /// Acquire resources. Called on Null → Paused/Playing.
    fn init(&self) -> ElementResult<()>;

    /// Release resources. Must be a no-op when nothing was acquired.
    fn uninit(&self);

    /// Transition table for this element
    ///
    /// Override to return [`Transition::Unsupported`] for moves the element
    /// cannot make, such as pausing a live source.
    fn plan(&self, from: ElementState, to: ElementState) -> Transition {
        plan(from, to)
    }
}

/// State bookkeeping shared by every element
#[derive(Debug, Default)]
pub struct StateCell {
    state: Mutex<ElementState>,
    transition: Mutex<()>,
    paused: AtomicBool,
    changed: Signal<ElementState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ElementState {
        *lock(&self.state)
    }

    /// Whether input should currently be discarded
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn changed(&self) -> &Signal<ElementState> {
        &self.changed
    }

    /// Move to `target`, running the element's hooks as required
    ///
    /// Transitions are serialized, but the state lock itself is never held
    /// while hooks run, so hooks and signal handlers may query the state.
    pub fn drive(
        &self,
        element: &str,
        target: ElementState,
        hooks: &dyn Lifecycle,
    ) -> ElementResult<()> {
        let _serial = lock(&self.transition);
        let current = self.get();

        match hooks.plan(current, target) {
            Transition::Stay => return Ok(()),
            Transition::Start { paused } => {
                self.paused.store(paused, Ordering::SeqCst);

                if let Err(e) = hooks.init() {
                    self.paused.store(false, Ordering::SeqCst);
                    error!(element, error = %e, "Failed to start element");
                    return Err(e);
                }
            }
            Transition::Pause => self.paused.store(true, Ordering::SeqCst),
            Transition::Resume => self.paused.store(false, Ordering::SeqCst),
            Transition::Stop => {
                hooks.uninit();
                self.paused.store(false, Ordering::SeqCst);
            }
            Transition::Unsupported => {
                let err = PipelineError::UnsupportedTransition {
                    element: element.to_string(),
                    from: current,
                    to: target,
                };
                error!(element, error = %err, "Rejected state change");
                return Err(err);
            }
        }

        *lock(&self.state) = target;
        debug!(element, from = %current, to = %target, "State changed");
        self.changed.emit(&target);

        Ok(())
    }
}

/// A processing node in the pipeline
pub trait Element: Send + Sync {
    /// Stable name used in logs and by the registry
    fn name(&self) -> &str;

    fn state_cell(&self) -> &StateCell;

    fn set_state(&self, state: ElementState) -> ElementResult<()>;

    /// Hand a packet to the element. Output, if any, is emitted on
    /// [`Element::output`], possibly from another thread.
    fn push(&self, packet: &Packet);

    fn output(&self) -> &Signal<Packet>;

    /// Upcast used by the registry to hand out concrete element types
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn state(&self) -> ElementState {
        self.state_cell().get()
    }

    fn state_changed(&self) -> &Signal<ElementState> {
        self.state_cell().changed()
    }

    /// Forward this element's output into `next`
    fn link(&self, next: Arc<dyn Element>) -> notify::HandlerId {
        self.output().connect(move |packet| next.push(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Hooks {
        inits: AtomicUsize,
        uninits: AtomicUsize,
        fail: AtomicBool,
    }

    impl Lifecycle for Hooks {
        fn init(&self) -> ElementResult<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(PipelineError::Config("boom".into()))
            } else {
                Ok(())
            }
        }

        fn uninit(&self) {
            self.uninits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_plan_table() {
        use ElementState::*;

        assert_eq!(plan(Null, Null), Transition::Stay);
        assert_eq!(plan(Null, Paused), Transition::Start { paused: true });
        assert_eq!(plan(Null, Playing), Transition::Start { paused: false });
        assert_eq!(plan(Paused, Playing), Transition::Resume);
        assert_eq!(plan(Playing, Paused), Transition::Pause);
        assert_eq!(plan(Playing, Null), Transition::Stop);
        assert_eq!(plan(Paused, Null), Transition::Stop);
    }

    #[test]
    fn test_drive_runs_hooks() {
        let cell = StateCell::new();
        let hooks = Hooks::default();

        cell.drive("test", ElementState::Paused, &hooks).unwrap();
        assert!(cell.is_paused());
        cell.drive("test", ElementState::Playing, &hooks).unwrap();
        assert!(!cell.is_paused());
        cell.drive("test", ElementState::Null, &hooks).unwrap();

        assert_eq!(hooks.inits.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.uninits.load(Ordering::SeqCst), 1);
        assert_eq!(cell.get(), ElementState::Null);
    }

    #[test]
    fn test_failed_init_stays_null() {
        let cell = StateCell::new();
        let hooks = Hooks::default();
        hooks.fail.store(true, Ordering::SeqCst);

        assert!(cell.drive("test", ElementState::Paused, &hooks).is_err());
        assert_eq!(cell.get(), ElementState::Null);
        assert!(!cell.is_paused());
    }

    #[test]
    fn test_same_state_is_noop() {
        let cell = StateCell::new();
        let hooks = Hooks::default();
        let changes = Arc::new(AtomicUsize::new(0));
        let changes_clone = Arc::clone(&changes);
        cell.changed().connect(move |_| {
            changes_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.drive("test", ElementState::Null, &hooks).unwrap();
        assert_eq!(hooks.uninits.load(Ordering::SeqCst), 0);
        assert_eq!(changes.load(Ordering::SeqCst), 0);
    }

    /// Starts straight into Playing and cannot pause
    #[derive(Default)]
    struct LiveHooks {
        inner: Hooks,
    }

    impl Lifecycle for LiveHooks {
        fn init(&self) -> ElementResult<()> {
            self.inner.init()
        }

        fn uninit(&self) {
            self.inner.uninit();
        }

        fn plan(&self, from: ElementState, to: ElementState) -> Transition {
            match plan(from, to) {
                Transition::Pause | Transition::Start { paused: true } => Transition::Unsupported,
                transition => transition,
            }
        }
    }

    #[test]
    fn test_refused_transition_keeps_state() {
        let cell = StateCell::new();
        let hooks = LiveHooks::default();

        let err = cell.drive("live", ElementState::Paused, &hooks).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedTransition { .. }));
        assert_eq!(cell.get(), ElementState::Null);
        assert_eq!(hooks.inner.inits.load(Ordering::SeqCst), 0);

        cell.drive("live", ElementState::Playing, &hooks).unwrap();
        assert!(cell.drive("live", ElementState::Paused, &hooks).is_err());
        assert_eq!(cell.get(), ElementState::Playing);
        assert!(!cell.is_paused());

        cell.drive("live", ElementState::Null, &hooks).unwrap();
        assert_eq!(hooks.inner.uninits.load(Ordering::SeqCst), 1);
    }
}
