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

//! The scheduler: a single-threaded, readiness-poll-driven run loop over a
//! live set of coroutines.
//!
//! Every suspension a coroutine performs switches back to exactly one place:
//! the `Context::resume` call inside [`CoroutineMachine::resume_one`]. That
//! symmetry means we never need to store an explicit "yield point" snapshot
//! alongside the live set the way a setjmp/longjmp port would; the return
//! address of that one call already plays that role, once per tick.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};

use linked_hash_map::LinkedHashMap;
use log::{debug, trace, warn};

use crate::coroutine::{
    Coroutine, CoroutineId, CoroutineRef, Rendezvous, ResultSlot, SpawnOptions, State,
    WaitDescriptor,
};
use crate::error::{panic_message, Error, Result};
use crate::event::{Event, Interest};
use crate::poll::PollSet;

thread_local! {
    static PEER: Cell<Option<context::Context>> = Cell::new(None);
}

/// Carries just enough to bootstrap the very first resume of a coroutine:
/// a stable pointer back to its machine and its own id. Leaked across the
/// stack switch and reclaimed by the trampoline on the other side.
struct Bootstrap {
    machine: *const CoroutineMachine,
    id: CoroutineId,
}

extern "C" fn trampoline(t: context::Transfer) -> ! {
    PEER.with(|p| p.set(Some(t.context)));
    let bootstrap = unsafe { *Box::from_raw(t.data as *mut Bootstrap) };
    let coroutine_ref = CoroutineRef {
        id: bootstrap.id,
        machine: bootstrap.machine,
    };
    let machine = unsafe { &*bootstrap.machine };
    let body = machine.take_body(bootstrap.id);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Some(body) = body {
            body(&coroutine_ref);
        }
    }));
    machine.finish(bootstrap.id, result.err());
    loop {
        switch_out(0);
    }
}

fn switch_out(data: usize) -> usize {
    let peer = PEER
        .with(|p| p.take())
        .expect("a suspension primitive was used outside a running coroutine");
    let transfer = unsafe { peer.resume(data) };
    PEER.with(|p| p.set(Some(transfer.context)));
    transfer.data
}

struct Inner {
    coroutines: LinkedHashMap<CoroutineId, Box<Coroutine>>,
    ids: crate::idpool::IdPool,
    interrupt: Event,
    tick_count: u64,
    running: bool,
}

/// The scheduler plus its live set of coroutines. One per program; pass it
/// by reference rather than reaching for it globally (see `DESIGN.md`).
pub struct CoroutineMachine {
    inner: RefCell<Inner>,
}

impl CoroutineMachine {
    pub fn new() -> Result<CoroutineMachine> {
        Ok(CoroutineMachine {
            inner: RefCell::new(Inner {
                coroutines: LinkedHashMap::new(),
                ids: crate::idpool::IdPool::new(),
                interrupt: Event::new()?,
                tick_count: 0,
                running: false,
            }),
        })
    }

    /// Creates a new coroutine in state `New`. It does not run until
    /// [`CoroutineMachine::start`] is called.
    pub fn spawn<F>(&self, options: SpawnOptions, body: F) -> Result<CoroutineId>
    where
        F: FnOnce(&CoroutineRef) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = CoroutineId(inner.ids.allocate());
        let coroutine = Coroutine::new(id, options, Box::new(body))?;
        debug!("coroutine {} created", id);
        inner.coroutines.insert(id, Box::new(coroutine));
        Ok(id)
    }

    /// Transitions a coroutine from `New` to `Ready`.
    pub fn start(&self, id: CoroutineId) -> Result<()> {
        let inner = self.inner.borrow();
        let co = inner
            .coroutines
            .get(&id)
            .ok_or(Error::UnknownCoroutine(id.0))?;
        if co.state.get() == State::New {
            co.state.set(State::Ready);
        }
        Ok(())
    }

    pub fn is_alive(&self, id: CoroutineId) -> bool {
        let inner = self.inner.borrow();
        inner
            .coroutines
            .get(&id)
            .map(|co| co.state.get() != State::Dead)
            .unwrap_or(false)
    }

    /// The coroutine's name, defaulting to `co-<id>` if none was set.
    pub fn name(&self, id: CoroutineId) -> Option<String> {
        let inner = self.inner.borrow();
        inner
            .coroutines
            .get(&id)
            .map(|co| co.name.borrow().clone().unwrap_or_else(|| format!("co-{}", id)))
    }

    pub fn set_name(&self, id: CoroutineId, name: String) {
        let inner = self.inner.borrow();
        if let Some(co) = inner.coroutines.get(&id) {
            *co.name.borrow_mut() = Some(name);
        }
    }

    pub fn with_user_data<T: 'static, R>(&self, id: CoroutineId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let inner = self.inner.borrow();
        let co = inner.coroutines.get(&id)?;
        let data = co.user_data.borrow();
        data.as_ref().and_then(|b| b.downcast_ref::<T>()).map(f)
    }

    pub fn set_user_data<T: 'static>(&self, id: CoroutineId, value: T) {
        let inner = self.inner.borrow();
        if let Some(co) = inner.coroutines.get(&id) {
            *co.user_data.borrow_mut() = Some(Box::new(value));
        }
    }

    pub fn trigger_event(&self, id: CoroutineId) {
        let inner = self.inner.borrow();
        if let Some(co) = inner.coroutines.get(&id) {
            let _ = co.self_wake.trigger();
        }
    }

    pub fn clear_event(&self, id: CoroutineId) {
        let inner = self.inner.borrow();
        if let Some(co) = inner.coroutines.get(&id) {
            let _ = co.self_wake.clear();
        }
    }

    pub(crate) fn take_body(
        &self,
        id: CoroutineId,
    ) -> Option<Box<dyn FnOnce(&CoroutineRef)>> {
        let inner = self.inner.borrow();
        inner.coroutines.get(&id).and_then(|co| co.body.borrow_mut().take())
    }

    // --- Suspension primitives, invoked by `CoroutineRef` from inside a
    // running coroutine's task function. Each mutates its own state, then
    // switches back to the scheduler's resume point. ---

    pub(crate) fn wait(&self, id: CoroutineId, fd: RawFd, interest: Interest) {
        {
            let inner = self.inner.borrow();
            let co = inner.coroutines.get(&id).expect("wait: unknown coroutine");
            co.state.set(State::Waiting);
            co.wait.set(Some(WaitDescriptor { fd, interest }));
            co.last_tick.set(inner.tick_count);
        }
        switch_out(0);
        let inner = self.inner.borrow();
        if let Some(co) = inner.coroutines.get(&id) {
            co.wait.set(None);
        }
    }

    pub(crate) fn yield_now(&self, id: CoroutineId) {
        let inner = self.inner.borrow();
        let co = inner.coroutines.get(&id).expect("yield_now: unknown coroutine");
        co.state.set(State::Yielded);
        co.last_tick.set(inner.tick_count);
        let _ = co.self_wake.trigger();
        drop(inner);
        switch_out(0);
    }

    pub(crate) fn yield_value<T: Copy + 'static>(&self, id: CoroutineId, value: T) -> Result<()> {
        let mut mismatch = None;
        {
            let inner = self.inner.borrow();
            let co = inner.coroutines.get(&id).expect("yield_value: unknown coroutine");
            if let Some(rendezvous) = co.rendezvous.borrow().as_ref() {
                if rendezvous.slot.len == std::mem::size_of::<T>() {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            &value as *const T as *const u8,
                            rendezvous.slot.ptr,
                            rendezvous.slot.len,
                        );
                        *rendezvous.slot.delivered = true;
                    }
                } else {
                    mismatch = Some(Error::PayloadMismatch {
                        expected: rendezvous.slot.len,
                        found: std::mem::size_of::<T>(),
                    });
                }
                if let Some(caller) = inner.coroutines.get(&rendezvous.caller) {
                    let _ = caller.self_wake.trigger();
                }
            }
            co.state.set(State::Yielded);
            co.last_tick.set(inner.tick_count);
        }
        switch_out(0);
        match mismatch {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rendezvous with `callee`: starts it if new, otherwise wakes it, then
    /// suspends the caller until the callee yields a value or terminates.
    pub(crate) fn call<T: Copy + 'static>(
        &self,
        caller: CoroutineId,
        callee: CoroutineId,
    ) -> Result<Option<T>> {
        let mut storage: MaybeUninit<T> = MaybeUninit::uninit();
        let mut delivered = false;
        let mut poison: Option<String> = None;
        let slot = ResultSlot {
            ptr: storage.as_mut_ptr() as *mut u8,
            len: std::mem::size_of::<T>(),
            delivered: &mut delivered as *mut bool,
        };

        {
            let inner = self.inner.borrow();
            let callee_co = match inner.coroutines.get(&callee) {
                Some(co) if co.state.get() != State::Dead => co,
                _ => return Err(Error::NotAlive(callee.0)),
            };
            *callee_co.rendezvous.borrow_mut() = Some(Rendezvous {
                caller,
                slot,
                poison: &mut poison as *mut Option<String>,
            });
            if callee_co.state.get() == State::New {
                callee_co.state.set(State::Ready);
            } else {
                let _ = callee_co.self_wake.trigger();
            }
            let caller_co = inner.coroutines.get(&caller).expect("call: unknown caller");
            caller_co.state.set(State::Yielded);
            caller_co.last_tick.set(inner.tick_count);
        }
        switch_out(0);

        let inner = self.inner.borrow();
        if let Some(callee_co) = inner.coroutines.get(&callee) {
            *callee_co.rendezvous.borrow_mut() = None;
        }
        drop(inner);

        if let Some(message) = poison {
            return Err(Error::Poisoned(callee.0, message));
        }
        if delivered {
            Ok(Some(unsafe { storage.assume_init() }))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn exit(&self, id: CoroutineId) -> ! {
        self.finish(id, None);
        loop {
            switch_out(0);
        }
    }

    /// Runs once a coroutine's task function has returned (normally or via
    /// `Exit`) or panicked: wakes anyone waiting on it, marks it `Dead`.
    /// Does not remove it from the live set — that happens only once
    /// `resume_one` has safely switched away from its stack.
    fn finish(&self, id: CoroutineId, panic: Option<Box<dyn Any + Send>>) {
        let inner = self.inner.borrow();
        let co = inner.coroutines.get(&id).expect("finish: unknown coroutine");
        let message = panic.map(|payload| {
            let message = panic_message(&*payload);
            warn!("coroutine {} panicked: {}", id, message);
            *co.poisoned.borrow_mut() = Some(message.clone());
            message
        });
        if let Some(rendezvous) = co.rendezvous.borrow().as_ref() {
            if let Some(message) = &message {
                // SAFETY: `poison` points at a local still on the caller's
                // suspended stack frame; the caller only resumes, and reads
                // it, after this coroutine has fully switched out.
                unsafe { *rendezvous.poison = Some(message.clone()) };
            }
            if let Some(caller) = inner.coroutines.get(&rendezvous.caller) {
                let _ = caller.self_wake.trigger();
            }
        }
        co.state.set(State::Dead);
        trace!("coroutine {} finished", id);
    }

    fn resume_one(&self, id: CoroutineId) {
        let (ctx, needs_bootstrap) = {
            let inner = self.inner.borrow();
            let co = inner.coroutines.get(&id).expect("resume_one: unknown coroutine");
            co.state.set(State::Running);
            match co.context.take() {
                Some(ctx) => (ctx, false),
                None => (context::Context::new(&co.stack, trampoline), true),
            }
        };

        let data_in = if needs_bootstrap {
            let bootstrap = Box::new(Bootstrap {
                machine: self as *const CoroutineMachine,
                id,
            });
            Box::into_raw(bootstrap) as usize
        } else {
            0
        };

        let transfer = unsafe { ctx.resume(data_in) };

        let mut inner = self.inner.borrow_mut();
        let dead = match inner.coroutines.get(&id) {
            Some(co) => {
                if co.state.get() != State::Dead {
                    co.context.set(Some(transfer.context));
                }
                co.state.get() == State::Dead
            }
            None => false,
        };
        if dead {
            if let Some(co) = inner.coroutines.remove(&id) {
                inner.ids.release(id.0);
                drop(co);
            }
        }
    }

    /// Builds the poll set for one tick and selects the least-recently-run
    /// runnable coroutine, per the staleness fairness rule.
    fn get_runnable(&self) -> Result<Option<CoroutineId>> {
        let inner_ref = &self.inner;
        let (mut poll, blocked) = {
            let inner = inner_ref.borrow();
            let mut poll = PollSet::with_capacity(inner.coroutines.len() + 1);
            poll.push(inner.interrupt.fd(), Interest::READABLE);

            let mut blocked = Vec::with_capacity(inner.coroutines.len());
            for (id, co) in inner.coroutines.iter() {
                match co.state.get() {
                    State::New | State::Running | State::Dead => continue,
                    State::Ready | State::Yielded => {
                        poll.push(co.self_wake.fd(), Interest::READABLE);
                        blocked.push(*id);
                    }
                    State::Waiting => {
                        let w = co.wait.get().expect("Waiting coroutine with no wait descriptor");
                        poll.push(w.fd, w.interest);
                        blocked.push(*id);
                    }
                }
                if co.state.get() == State::Ready {
                    let _ = co.self_wake.trigger();
                }
            }
            (poll, blocked)
        };

        let ready_count = poll.wait(None)?;
        {
            let mut inner = inner_ref.borrow_mut();
            inner.tick_count += 1;
        }

        if ready_count == 0 {
            return Ok(None);
        }

        if poll.revents(0).contains(Interest::READABLE) {
            let inner = inner_ref.borrow();
            let _ = inner.interrupt.clear();
            if !inner.running {
                return Ok(None);
            }
        }

        let inner = inner_ref.borrow();
        let tick_count = inner.tick_count;
        let mut runnable: Vec<CoroutineId> = Vec::new();
        for (i, id) in blocked.iter().enumerate() {
            if poll.revents(i + 1).is_empty() {
                continue;
            }
            runnable.push(*id);
        }
        if runnable.is_empty() {
            return Ok(None);
        }

        runnable.sort_by(|a, b| {
            let sa = inner.coroutines.get(a).map(|c| c.staleness(tick_count)).unwrap_or(0);
            let sb = inner.coroutines.get(b).map(|c| c.staleness(tick_count)).unwrap_or(0);
            sb.cmp(&sa)
        });
        let chosen = runnable[0];
        if let Some(co) = inner.coroutines.get(&chosen) {
            let _ = co.self_wake.clear();
        }
        Ok(Some(chosen))
    }

    /// Runs coroutines until the live set is empty or `stop` is called.
    pub fn run(&self) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.running {
                return Err(Error::AlreadyRunning);
            }
            inner.running = true;
        }

        loop {
            if self.inner.borrow().coroutines.is_empty() {
                break;
            }
            match self.get_runnable()? {
                Some(id) => self.resume_one(id),
                None => {
                    if !self.inner.borrow().running {
                        break;
                    }
                }
            }
        }

        self.inner.borrow_mut().running = false;
        Ok(())
    }

    /// Ends the run loop after the current coroutine suspends.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.running = false;
        inner.interrupt.trigger()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().coroutines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc;

    #[test]
    fn run_returns_immediately_with_no_coroutines() {
        let m = CoroutineMachine::new().unwrap();
        m.run().unwrap();
    }

    #[test]
    fn a_single_yielding_coroutine_terminates() {
        let m = CoroutineMachine::new().unwrap();
        let count = Rc::new(StdRefCell::new(0));
        let count2 = count.clone();
        let id = m
            .spawn(SpawnOptions::default(), move |c| {
                for _ in 0..5 {
                    *count2.borrow_mut() += 1;
                    c.yield_now();
                }
            })
            .unwrap();
        m.start(id).unwrap();
        m.run().unwrap();
        assert_eq!(*count.borrow(), 5);
        assert!(!m.is_alive(id));
    }

    #[test]
    fn at_most_one_coroutine_runs_at_a_time() {
        let m = CoroutineMachine::new().unwrap();
        let active = Rc::new(StdRefCell::new(0));
        let max_active = Rc::new(StdRefCell::new(0));
        for _ in 0..3 {
            let active = active.clone();
            let max_active = max_active.clone();
            let id = m
                .spawn(SpawnOptions::default(), move |c| {
                    for _ in 0..10 {
                        *active.borrow_mut() += 1;
                        if *active.borrow() > *max_active.borrow() {
                            *max_active.borrow_mut() = *active.borrow();
                        }
                        c.yield_now();
                        *active.borrow_mut() -= 1;
                    }
                })
                .unwrap();
            m.start(id).unwrap();
        }
        m.run().unwrap();
        assert_eq!(*max_active.borrow(), 1);
    }

    #[test]
    fn fairness_distributes_ticks_within_one() {
        let m = CoroutineMachine::new().unwrap();
        let counts: Vec<Rc<StdRefCell<u32>>> =
            (0..3).map(|_| Rc::new(StdRefCell::new(0))).collect();
        for counter in &counts {
            let counter = counter.clone();
            let id = m
                .spawn(SpawnOptions::default(), move |c| {
                    for _ in 0..300 {
                        *counter.borrow_mut() += 1;
                        c.yield_now();
                    }
                })
                .unwrap();
            m.start(id).unwrap();
        }
        m.run().unwrap();
        let values: Vec<u32> = counts.iter().map(|c| *c.borrow()).collect();
        let min = *values.iter().min().unwrap();
        let max = *values.iter().max().unwrap();
        assert!(max - min <= 1, "counts spread too far apart: {:?}", values);
    }

    #[test]
    fn rendezvous_delivers_values_in_order() {
        let m = CoroutineMachine::new().unwrap();
        let generator = m
            .spawn(SpawnOptions::default(), |c| {
                for v in 1..=4i32 {
                    c.yield_value(v).unwrap();
                }
            })
            .unwrap();

        let results = Rc::new(StdRefCell::new(Vec::new()));
        let results2 = results.clone();
        let consumer = m
            .spawn(SpawnOptions::default(), move |c| {
                for _ in 0..4 {
                    if let Some(v) = c.call::<i32>(generator).unwrap() {
                        results2.borrow_mut().push(v);
                    }
                }
                let fifth = c.call::<i32>(generator);
                results2.borrow_mut().push(fifth.unwrap().unwrap_or(-1));
            })
            .unwrap();
        m.start(consumer).unwrap();
        m.run().unwrap();
        assert_eq!(*results.borrow(), vec![1, 2, 3, 4, -1]);
        assert!(!m.is_alive(generator));
    }

    #[test]
    fn a_waiting_coroutine_never_runs_if_its_fd_never_becomes_ready() {
        let m = CoroutineMachine::new().unwrap();
        let mut pipe_fds = [0 as RawFd; 2];
        unsafe {
            libc::pipe(pipe_fds.as_mut_ptr());
        }

        let ready_ticks = Rc::new(StdRefCell::new(0));
        let ready_ticks2 = ready_ticks.clone();
        let ready = m
            .spawn(SpawnOptions::default(), move |c| {
                for _ in 0..20 {
                    *ready_ticks2.borrow_mut() += 1;
                    c.yield_now();
                }
                c.stop();
            })
            .unwrap();
        m.start(ready).unwrap();

        let waiter_ran = Rc::new(StdRefCell::new(false));
        let waiter_ran2 = waiter_ran.clone();
        let read_fd = pipe_fds[0];
        let waiter = m
            .spawn(SpawnOptions::default(), move |c| {
                c.wait(read_fd, Interest::READABLE);
                *waiter_ran2.borrow_mut() = true;
            })
            .unwrap();
        m.start(waiter).unwrap();

        m.run().unwrap();
        assert_eq!(*ready_ticks.borrow(), 20);
        assert!(!*waiter_ran.borrow());
        assert!(m.is_alive(waiter));
        unsafe {
            libc::close(pipe_fds[0]);
            libc::close(pipe_fds[1]);
        }
    }
}
