// The MIT License (MIT)

// Copyright (c) 2015 Rustcc Developers

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! A single coroutine: its state, its private stack, and the handle task
//! bodies use to suspend themselves.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::os::unix::io::RawFd;

use crate::event::{Event, Interest};
use crate::machine::CoroutineMachine;
use crate::stack::{Stack, DEFAULT_STACK_SIZE};

/// Opaque coroutine identifier, stable for the coroutine's lifetime and
/// recycled once it terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoroutineId(pub(crate) u64);

impl CoroutineId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a coroutine is in its lifecycle. See the module-level scheduler
/// documentation in `machine` for the full transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    New,
    Ready,
    Running,
    Yielded,
    Waiting,
    Dead,
}

/// Options controlling how a coroutine is constructed.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub name: Option<String>,
    pub stack_size: usize,
}

impl Default for SpawnOptions {
    fn default() -> SpawnOptions {
        SpawnOptions {
            name: None,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitDescriptor {
    pub fd: RawFd,
    pub interest: Interest,
}

/// The destination a `YieldValue`/termination writes into: a raw pointer and
/// a byte length fixed by the generic parameter the caller supplied to
/// `call::<T>`, not by a runtime-supplied size. `delivered` lets the callee
/// tell the caller it actually wrote a value, as opposed to terminating
/// without ever calling `yield_value`.
#[derive(Clone, Copy)]
pub(crate) struct ResultSlot {
    pub ptr: *mut u8,
    pub len: usize,
    pub delivered: *mut bool,
}

pub(crate) struct Rendezvous {
    pub caller: CoroutineId,
    pub slot: ResultSlot,
    /// Where `finish` writes the callee's panic message, if it terminated
    /// by panicking rather than returning. Read back by `call` once the
    /// caller resumes.
    pub poison: *mut Option<String>,
}

/// Internal per-coroutine state. Lives in the machine's live set; task
/// bodies only ever see it through a [`CoroutineRef`].
pub(crate) struct Coroutine {
    pub id: CoroutineId,
    pub name: RefCell<Option<String>>,
    pub state: Cell<State>,
    pub stack: Stack,
    pub context: Cell<Option<context::Context>>,
    pub self_wake: Event,
    pub wait: Cell<Option<WaitDescriptor>>,
    pub rendezvous: RefCell<Option<Rendezvous>>,
    pub last_tick: Cell<u64>,
    pub user_data: RefCell<Option<Box<dyn Any>>>,
    pub poisoned: RefCell<Option<String>>,
    pub body: RefCell<Option<Box<dyn FnOnce(&CoroutineRef)>>>,
}

impl Coroutine {
    pub(crate) fn new(
        id: CoroutineId,
        options: SpawnOptions,
        body: Box<dyn FnOnce(&CoroutineRef)>,
    ) -> std::io::Result<Coroutine> {
        Ok(Coroutine {
            id,
            name: RefCell::new(options.name),
            state: Cell::new(State::New),
            stack: Stack::new(options.stack_size),
            context: Cell::new(None),
            self_wake: Event::new()?,
            wait: Cell::new(None),
            rendezvous: RefCell::new(None),
            last_tick: Cell::new(0),
            user_data: RefCell::new(None),
            poisoned: RefCell::new(None),
            body: RefCell::new(Some(body)),
        })
    }

    pub(crate) fn staleness(&self, tick_count: u64) -> u64 {
        tick_count.saturating_sub(self.last_tick.get())
    }
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id)
            .field("name", &self.name.borrow())
            .field("state", &self.state.get())
            .finish()
    }
}

/// The handle a running task function uses to suspend itself. Every public
/// suspension primitive from the core's external interface lives here.
#[derive(Clone, Copy)]
pub struct CoroutineRef {
    pub(crate) id: CoroutineId,
    pub(crate) machine: *const CoroutineMachine,
}

impl CoroutineRef {
    fn machine(&self) -> &CoroutineMachine {
        // SAFETY: a CoroutineRef is only ever constructed by the machine
        // that owns it and only handed to task bodies while that machine's
        // `run` call is on the stack; the machine does not move or drop
        // across a coroutine's lifetime.
        unsafe { &*self.machine }
    }

    pub fn id(&self) -> CoroutineId {
        self.id
    }

    /// Spawns a sibling coroutine on the same machine. Useful for a
    /// listener-style coroutine that creates one handler per connection.
    pub fn spawn<F>(&self, options: SpawnOptions, body: F) -> crate::error::Result<CoroutineId>
    where
        F: FnOnce(&CoroutineRef) + 'static,
    {
        self.machine().spawn(options, body)
    }

    /// Transitions a freshly spawned sibling from `New` to `Ready`.
    pub fn start(&self, id: CoroutineId) -> crate::error::Result<()> {
        self.machine().start(id)
    }

    /// Suspends until `fd` becomes ready for the given interest.
    pub fn wait(&self, fd: RawFd, interest: Interest) {
        self.machine().wait(self.id, fd, interest);
    }

    /// Suspends, becoming immediately runnable again next tick.
    pub fn yield_now(&self) {
        self.machine().yield_now(self.id);
    }

    /// Delivers `value` to whichever coroutine is waiting on us via `call`,
    /// then suspends. If nobody is waiting, the value is dropped. Errs with
    /// `PayloadMismatch` (and still drops the value) if the caller's `call`
    /// was typed for a different size than `T`.
    pub fn yield_value<T: Copy + 'static>(&self, value: T) -> crate::error::Result<()> {
        self.machine().yield_value(self.id, value)
    }

    /// Rendezvous with `callee`: resumes it (starting it if new) and
    /// suspends until it yields a value or terminates, returning the value
    /// if one was delivered, or `None` if it terminated without yielding
    /// one. Errs with `NotAlive` if `callee` is already dead, or `Poisoned`
    /// if `callee` panicked instead of returning normally.
    pub fn call<T: Copy + 'static>(&self, callee: CoroutineId) -> crate::error::Result<Option<T>> {
        self.machine().call(self.id, callee)
    }

    /// True if `other` is a live (non-terminated, still-tracked) coroutine.
    pub fn is_alive(&self, other: CoroutineId) -> bool {
        self.machine().is_alive(other)
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.machine().set_name(self.id, name.into());
    }

    /// This coroutine's name, defaulting to `co-<id>` if none was set.
    pub fn name(&self) -> Option<String> {
        self.machine().name(self.id)
    }

    /// Runs `f` against the coroutine's stored user data, if any is present
    /// and matches type `T`.
    pub fn with_user_data<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.machine().with_user_data(self.id, f)
    }

    pub fn set_user_data<T: 'static>(&self, value: T) {
        self.machine().set_user_data(self.id, value);
    }

    /// Manually triggers this coroutine's own event descriptor.
    pub fn trigger_event(&self) {
        self.machine().trigger_event(self.id);
    }

    /// Clears this coroutine's own event descriptor.
    pub fn clear_event(&self) {
        self.machine().clear_event(self.id);
    }

    /// Terminates the coroutine now, as if the task function had returned.
    pub fn exit(&self) -> ! {
        self.machine().exit(self.id)
    }

    /// Asks the machine to end its run loop once the current coroutine next
    /// suspends. Safe to call from a coroutine body: it only flips a flag
    /// and triggers the interrupt descriptor, it does not itself suspend.
    pub fn stop(&self) {
        let _ = self.machine().stop();
    }
}
