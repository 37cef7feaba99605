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

//! Generator/Consumer rendezvous demo, paced by a timer descriptor between
//! calls. Ported from `coroutines/main.c`'s `Generator`/`Co1` pair; the
//! timer itself is not a core primitive (see `Non-goals`), so each platform
//! grows its own small timer-fd helper here, the same way the original
//! reaches for `kqueue`'s `EVFILT_TIMER` directly in demo code.

use std::os::unix::io::RawFd;
use std::time::Duration;

use coromachine::{CoroutineMachine, Interest, SpawnOptions};

#[cfg(target_os = "linux")]
fn make_timer(interval: Duration) -> RawFd {
    let fd = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_NONBLOCK) };
    assert!(fd >= 0, "timerfd_create failed");
    let spec = libc::itimerspec {
        it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
        it_value: libc::timespec {
            tv_sec: interval.as_secs() as libc::time_t,
            tv_nsec: interval.subsec_nanos() as libc::c_long,
        },
    };
    let rc = unsafe { libc::timerfd_settime(fd, 0, &spec, std::ptr::null_mut()) };
    assert_eq!(rc, 0, "timerfd_settime failed");
    fd
}

#[cfg(target_os = "linux")]
fn drain_timer(fd: RawFd) {
    let mut buf = [0u8; 8];
    unsafe {
        libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
    }
}

#[cfg(not(target_os = "linux"))]
fn make_timer(interval: Duration) -> RawFd {
    let kq = unsafe { libc::kqueue() };
    assert!(kq >= 0, "kqueue failed");
    let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
    kev.ident = 1;
    kev.filter = libc::EVFILT_TIMER;
    kev.flags = libc::EV_ADD | libc::EV_ONESHOT;
    kev.data = interval.as_millis() as libc::intptr_t;
    let rc = unsafe { libc::kevent(kq, &kev, 1, std::ptr::null_mut(), 0, std::ptr::null()) };
    assert_eq!(rc, 0, "kevent timer registration failed");
    kq
}

#[cfg(not(target_os = "linux"))]
fn drain_timer(_fd: RawFd) {}

fn wait_one_tick(c: &coromachine::CoroutineRef, interval: Duration) {
    let fd = make_timer(interval);
    c.wait(fd, Interest::READABLE);
    drain_timer(fd);
    unsafe {
        libc::close(fd);
    }
}

fn main() {
    env_logger::init();
    let machine = CoroutineMachine::new().expect("failed to create coroutine machine");

    let generator = machine
        .spawn(SpawnOptions::default(), |c| {
            for v in 1..=4i32 {
                c.yield_value(v).expect("consumer calls with a matching type");
            }
        })
        .expect("failed to spawn generator");

    let consumer = machine
        .spawn(SpawnOptions::default(), move |c| {
            for i in 0..4 {
                if let Some(value) = c.call::<i32>(generator).expect("generator is alive") {
                    println!("Value: {}", value);
                }
                if i < 3 {
                    wait_one_tick(c, Duration::from_millis(100));
                }
            }
        })
        .expect("failed to spawn consumer");

    machine.start(consumer).unwrap();
    machine.run().expect("coroutine machine run loop failed");
}
