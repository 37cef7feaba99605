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

//! `kqueue`-backed self-wake descriptor, ported from `coroutine.c`'s
//! `EVFILT_USER`/`NOTE_TRIGGER` use on Apple and BSD targets.

use std::io;
use std::os::unix::io::RawFd;

const USER_IDENT: libc::uintptr_t = 1;

pub struct KqueueEvent {
    kq: RawFd,
}

impl KqueueEvent {
    pub fn new() -> io::Result<KqueueEvent> {
        let kq = unsafe { libc::kqueue() };
        if kq == -1 {
            return Err(io::Error::last_os_error());
        }
        let event = KqueueEvent { kq };
        event.register()?;
        Ok(event)
    }

    fn register(&self) -> io::Result<()> {
        let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
        kev.ident = USER_IDENT;
        kev.filter = libc::EVFILT_USER;
        kev.flags = libc::EV_ADD | libc::EV_CLEAR;
        let rc = unsafe { libc::kevent(self.kq, &kev, 1, std::ptr::null_mut(), 0, std::ptr::null()) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn fd(&self) -> RawFd {
        self.kq
    }

    pub fn trigger(&self) -> io::Result<()> {
        let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
        kev.ident = USER_IDENT;
        kev.filter = libc::EVFILT_USER;
        kev.fflags = libc::NOTE_TRIGGER;
        let rc = unsafe { libc::kevent(self.kq, &kev, 1, std::ptr::null_mut(), 0, std::ptr::null()) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn clear(&self) -> io::Result<()> {
        // EV_CLEAR only resets the user event once it has actually been
        // retrieved via kevent(2); the scheduler observes this fd through
        // poll(2), which never dequeues it. Drain it here with a zero-
        // timeout retrieve so a triggered event doesn't stay readable
        // forever.
        let mut out: libc::kevent = unsafe { std::mem::zeroed() };
        let timeout = libc::timespec { tv_sec: 0, tv_nsec: 0 };
        let rc = unsafe { libc::kevent(self.kq, std::ptr::null(), 0, &mut out, 1, &timeout) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for KqueueEvent {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}
