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

//! Single-threaded file-serving HTTP/1.1 listener, ported from
//! `http/main.c`'s `Listener`/`Server` coroutines: one Listener coroutine
//! accepts connections, spawning one Server coroutine per client. Every
//! connection is served GET-only, 404s on a missing file and 400s on
//! anything that isn't GET, and the single thread never blocks on a slow
//! client because every read/write goes through `wait`.

use std::collections::HashMap;
use std::io::Read as _;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use clap::Parser;
use coromachine::{CoroutineMachine, Interest, SpawnOptions};

#[derive(Parser, Debug)]
#[command(about = "single-threaded coroutine HTTP file server")]
struct Args {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory to serve files from.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

fn set_nonblocking(fd: RawFd) {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    unsafe {
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

fn listen(port: u16) -> RawFd {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    assert!(fd >= 0, "socket() failed");
    let one: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from(Ipv4Addr::UNSPECIFIED).to_be(),
        },
        sin_zero: [0; 8],
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        sin_len: 0,
    };
    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    assert_eq!(rc, 0, "bind() failed: {}", std::io::Error::last_os_error());
    let rc = unsafe { libc::listen(fd, 128) };
    assert_eq!(rc, 0, "listen() failed");
    set_nonblocking(fd);
    fd
}

/// Reads the MIME-style header block (`header: value`) up to the blank
/// line, returning the request line plus the parsed headers.
fn read_request(c: &coromachine::CoroutineRef, fd: RawFd) -> Option<(String, HashMap<String, String>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        if let Some(pos) = find_header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..pos]).to_string();
            let mut lines = head.split("\r\n");
            let request_line = lines.next()?.to_string();
            let mut headers = HashMap::new();
            for line in lines {
                if let Some((k, v)) = line.split_once(':') {
                    headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
                }
            }
            return Some((request_line, headers));
        }
        c.wait(fd, Interest::READABLE);
        let n = unsafe {
            libc::read(fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len())
        };
        if n <= 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n as usize]);
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn send_all(c: &coromachine::CoroutineRef, fd: RawFd, data: &[u8]) {
    let mut offset = 0;
    while offset < data.len() {
        c.wait(fd, Interest::WRITABLE);
        let n = unsafe {
            libc::write(
                fd,
                data[offset..].as_ptr() as *const libc::c_void,
                data.len() - offset,
            )
        };
        if n <= 0 {
            break;
        }
        offset += n as usize;
    }
}

fn serve_connection(c: &coromachine::CoroutineRef, fd: RawFd, root: &Path) {
    let response = match read_request(c, fd) {
        Some((request_line, _headers)) => {
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or("");
            let path = parts.next().unwrap_or("/");
            if method != "GET" {
                b"HTTP/1.1 400 Bad Request\r\nContent-length: 0\r\n\r\n".to_vec()
            } else {
                let relative = path.trim_start_matches('/');
                let file_path = root.join(if relative.is_empty() { "index.html" } else { relative });
                match std::fs::File::open(&file_path) {
                    Ok(mut file) => {
                        let mut body = Vec::new();
                        let _ = file.read_to_end(&mut body);
                        let mut resp = format!(
                            "HTTP/1.1 200 OK\r\nContent-length: {}\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        resp.extend_from_slice(&body);
                        resp
                    }
                    Err(_) => b"HTTP/1.1 404 Not Found\r\nContent-length: 0\r\n\r\n".to_vec(),
                }
            }
        }
        None => return,
    };
    send_all(c, fd, &response);
    unsafe {
        libc::close(fd);
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let machine = CoroutineMachine::new().expect("failed to create coroutine machine");
    let listen_fd = listen(args.port);
    let root = args.root.clone();

    let listener = machine
        .spawn(SpawnOptions::default(), move |c| loop {
            c.wait(listen_fd, Interest::READABLE);
            loop {
                let client_fd = unsafe {
                    libc::accept(listen_fd, std::ptr::null_mut(), std::ptr::null_mut())
                };
                if client_fd < 0 {
                    break;
                }
                set_nonblocking(client_fd);
                let root = root.clone();
                let child = c
                    .spawn(SpawnOptions::default(), move |c| {
                        serve_connection(c, client_fd, &root)
                    })
                    .expect("failed to spawn server coroutine");
                c.start(child).expect("failed to start server coroutine");
            }
        })
        .expect("failed to spawn listener");

    machine.start(listener).unwrap();
    machine.run().expect("coroutine machine run loop failed");
}
