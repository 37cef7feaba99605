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

//! A Machine with only coroutines blocked on idle descriptors returns from
//! `run` within bounded time once `stop` is requested by a coroutine that
//! is otherwise just counting its own yields.

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use coromachine::{CoroutineMachine, Interest, SpawnOptions};

#[test]
fn stop_unblocks_a_run_loop_with_an_idle_waiter() {
    let machine = CoroutineMachine::new().unwrap();

    // A pipe whose read end is never written to: this coroutine blocks
    // forever unless `stop` ends the loop around it.
    let mut fds = [0 as RawFd; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let idle_read_fd = fds[0];

    let idle = machine
        .spawn(SpawnOptions::default(), move |c| {
            c.wait(idle_read_fd, Interest::READABLE);
        })
        .unwrap();
    machine.start(idle).unwrap();

    let driver = machine
        .spawn(SpawnOptions::default(), |c| {
            for _ in 0..5 {
                c.yield_now();
            }
            c.stop();
        })
        .unwrap();
    machine.start(driver).unwrap();

    let start = Instant::now();
    machine.run().unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(5),
        "run() took too long to return after stop(): {:?}",
        elapsed
    );
    assert!(machine.is_alive(idle));

    unsafe {
        libc::close(fds[0]);
        libc::close(fds[1]);
    }
}
