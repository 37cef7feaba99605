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

//! Thin wrapper around `poll(2)`, rebuilt fresh every scheduler tick.
//!
//! One `pollfd` per coroutine the tick considers runnable-or-blocked: a
//! coroutine with a real wait fd gets its requested `Interest`; a coroutine
//! that is merely `Ready`/`Yielded` contributes its self-wake `Event` fd
//! with `POLLIN`.

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::event::Interest;

pub struct PollSet {
    fds: Vec<libc::pollfd>,
}

impl PollSet {
    pub fn with_capacity(cap: usize) -> PollSet {
        PollSet {
            fds: Vec::with_capacity(cap),
        }
    }

    pub fn push(&mut self, fd: RawFd, interest: Interest) {
        self.fds.push(libc::pollfd {
            fd,
            events: interest.to_poll_events(),
            revents: 0,
        });
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Blocks until at least one descriptor is ready, or `timeout` elapses
    /// (`None` waits indefinitely). Returns the number of ready descriptors.
    pub fn wait(&mut self, timeout: Option<Duration>) -> std::io::Result<usize> {
        let timeout_ms = match timeout {
            Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(rc as usize)
    }

    /// Readiness events observed at `index` during the last `wait`.
    pub fn revents(&self, index: usize) -> Interest {
        Interest::from_poll_revents(self.fds[index].revents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn times_out_with_no_ready_descriptors() {
        let mut pipe_fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(pipe_fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        let mut set = PollSet::with_capacity(1);
        set.push(pipe_fds[0], Interest::READABLE);
        let ready = set.wait(Some(Duration::from_millis(10))).unwrap();
        assert_eq!(ready, 0);
        unsafe {
            libc::close(pipe_fds[0]);
            libc::close(pipe_fds[1]);
        }
    }

    #[test]
    fn reports_readable_once_data_is_written() {
        let mut pipe_fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(pipe_fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        unsafe {
            libc::write(pipe_fds[1], b"x".as_ptr() as *const _, 1);
        }
        let mut set = PollSet::with_capacity(1);
        set.push(pipe_fds[0], Interest::READABLE);
        let ready = set.wait(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(ready, 1);
        assert!(set.revents(0).contains(Interest::READABLE));
        unsafe {
            libc::close(pipe_fds[0]);
            libc::close(pipe_fds[1]);
        }
    }
}
