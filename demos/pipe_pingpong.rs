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

//! Writer/Reader pipe producer-consumer demo.
//!
//! The Writer coroutine writes twenty lines to the write end of a pipe,
//! yielding between each write; the Reader coroutine reads until EOF.

use std::os::unix::io::RawFd;

use coromachine::{CoroutineMachine, Interest, SpawnOptions};

fn make_pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe() failed: {}", std::io::Error::last_os_error());
    for fd in fds {
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
    (fds[0], fds[1])
}

fn main() {
    env_logger::init();
    let machine = CoroutineMachine::new().expect("failed to create coroutine machine");
    let (read_fd, write_fd) = make_pipe();

    let writer = machine
        .spawn(SpawnOptions::default(), move |c| {
            for i in 0..20 {
                let line = format!("FOO {}\n", i);
                let mut offset = 0;
                let bytes = line.as_bytes();
                while offset < bytes.len() {
                    c.wait(write_fd, Interest::WRITABLE);
                    let n = unsafe {
                        libc::write(
                            write_fd,
                            bytes[offset..].as_ptr() as *const libc::c_void,
                            bytes.len() - offset,
                        )
                    };
                    if n <= 0 {
                        break;
                    }
                    offset += n as usize;
                }
                c.yield_now();
            }
            unsafe {
                libc::close(write_fd);
            }
        })
        .expect("failed to spawn writer");

    let reader = machine
        .spawn(SpawnOptions::default(), move |c| {
            let mut buf = [0u8; 256];
            let mut pending = Vec::new();
            loop {
                c.wait(read_fd, Interest::READABLE);
                let n = unsafe {
                    libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                };
                if n <= 0 {
                    break;
                }
                pending.extend_from_slice(&buf[..n as usize]);
                while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                    let line = String::from_utf8_lossy(&pending[..pos]).to_string();
                    println!("Received: {}", line);
                    pending.drain(..=pos);
                }
            }
            println!("EOF");
            unsafe {
                libc::close(read_fd);
            }
        })
        .expect("failed to spawn reader");

    machine.start(writer).unwrap();
    machine.start(reader).unwrap();
    machine.run().expect("coroutine machine run loop failed");
}
