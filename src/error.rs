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

use thiserror::Error;

/// Errors produced by the coroutine machine and its coroutines.
#[derive(Error, Debug)]
pub enum Error {
    /// A wait/poll-related OS call failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The referenced coroutine id is not present in the machine.
    #[error("unknown coroutine id {0}")]
    UnknownCoroutine(u64),

    /// `Call` targeted a coroutine that is not alive.
    #[error("coroutine {0} is not alive")]
    NotAlive(u64),

    /// A typed rendezvous read a different size/type than was stored.
    #[error("rendezvous payload type mismatch: expected {expected} bytes, found {found}")]
    PayloadMismatch { expected: usize, found: usize },

    /// `run` was called while the machine was already running.
    #[error("machine is already running")]
    AlreadyRunning,

    /// A `Call`'s callee panicked instead of returning normally.
    #[error("coroutine {0} panicked: {1}")]
    Poisoned(u64, String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Lightweight payload carried by a panic caught at a coroutine boundary.
///
/// `std::panic::catch_unwind`'s payload is `Box<dyn Any + Send>`, which
/// does not implement `Display`; this extracts a printable message from the
/// common payload shapes (`&str`, `String`) and falls back to a generic
/// description otherwise.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "coroutine panicked with a non-string payload".to_string()
    }
}
