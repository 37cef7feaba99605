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

//! `coromachine` is a cooperative, single-threaded, stackful coroutine
//! runtime. Coroutines are ordinary functions running on their own private
//! stack; they suspend themselves by calling one of the five primitives on
//! [`CoroutineRef`] (`wait`, `yield_now`, `yield_value`, `call`, `exit`), and
//! the [`CoroutineMachine`] resumes exactly one of them per tick, chosen by
//! a single `poll(2)` over every blocked coroutine's readiness descriptor.
//!
//! There is no preemption, no work-stealing, and nothing runs in parallel:
//! at most one coroutine executes at any instant. Fairness is driven by
//! staleness (ticks since a coroutine last ran), not randomness or priority.
//!
//! ```no_run
//! use coromachine::{CoroutineMachine, SpawnOptions};
//!
//! let machine = CoroutineMachine::new().unwrap();
//! let id = machine
//!     .spawn(SpawnOptions::default(), |c| {
//!         for i in 0..3 {
//!             println!("tick {}", i);
//!             c.yield_now();
//!         }
//!     })
//!     .unwrap();
//! machine.start(id).unwrap();
//! machine.run().unwrap();
//! ```

mod coroutine;
mod error;
mod event;
mod idpool;
mod machine;
mod poll;
mod stack;

pub use coroutine::{CoroutineId, CoroutineRef, SpawnOptions, State};
pub use error::{Error, Result};
pub use event::Interest;
pub use machine::CoroutineMachine;
pub use stack::DEFAULT_STACK_SIZE;
