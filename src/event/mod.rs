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

//! Self-wake event descriptors.
//!
//! A coroutine that is `Ready` or `Yielded` (rather than blocked on a real fd)
//! still needs a descriptor to hand to `poll(2)` so the scheduler's readiness
//! wait and "this coroutine wants to run" are the same mechanism. On Linux
//! that's an `eventfd`; everywhere else (macOS, the BSDs) it's a `kqueue`
//! with a user-triggered filter. Both give us a raw fd that reads ready the
//! instant something calls `trigger`, and can be `clear`ed back to idle.

use std::io;
use std::os::unix::io::RawFd;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux::EventFd as PlatformEvent;

#[cfg(not(target_os = "linux"))]
mod bsd;
#[cfg(not(target_os = "linux"))]
use bsd::KqueueEvent as PlatformEvent;

bitflags::bitflags! {
    /// The readiness conditions a waiting coroutine cares about, mirrored
    /// from `POLLIN`/`POLLOUT`/`POLLHUP`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Interest: u16 {
        const READABLE = 0x001;
        const WRITABLE = 0x004;
        const HANGUP   = 0x010;
    }
}

impl Interest {
    pub fn to_poll_events(self) -> libc::c_short {
        let mut bits: libc::c_short = 0;
        if self.contains(Interest::READABLE) {
            bits |= libc::POLLIN;
        }
        if self.contains(Interest::WRITABLE) {
            bits |= libc::POLLOUT;
        }
        bits
    }

    pub fn from_poll_revents(revents: libc::c_short) -> Interest {
        let mut out = Interest::empty();
        if revents & libc::POLLIN != 0 {
            out |= Interest::READABLE;
        }
        if revents & libc::POLLOUT != 0 {
            out |= Interest::WRITABLE;
        }
        if revents & libc::POLLHUP != 0 {
            out |= Interest::HANGUP;
        }
        out
    }
}

/// A self-wake descriptor: something that can sit in a `poll(2)` set and be
/// triggered/cleared by the scheduler itself rather than by external I/O.
pub struct Event {
    inner: PlatformEvent,
}

impl Event {
    pub fn new() -> io::Result<Event> {
        Ok(Event {
            inner: PlatformEvent::new()?,
        })
    }

    /// The descriptor to place in the poll set, waiting for readability.
    pub fn fd(&self) -> RawFd {
        self.inner.fd()
    }

    /// Marks this event as ready; the next poll tick will see it readable.
    pub fn trigger(&self) -> io::Result<()> {
        self.inner.trigger()
    }

    /// Consumes the pending trigger so the descriptor goes back to idle.
    pub fn clear(&self) -> io::Result<()> {
        self.inner.clear()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event").field("fd", &self.fd()).finish()
    }
}
