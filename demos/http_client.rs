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

//! Parallel HTTP/1.1 client, ported from `client/main.c`: `-j <jobs> <host>
//! <path>` spawns one coroutine per job, each opening its own connection,
//! sending a bare `GET` request and streaming the response body to stdout.
//! All jobs progress concurrently on the single thread.

use std::collections::HashMap;
use std::ffi::CString;
use std::io::Write;
use std::mem;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;

use clap::Parser;
use coromachine::{CoroutineMachine, Interest, SpawnOptions};

#[derive(Parser, Debug, Clone)]
#[command(about = "parallel coroutine HTTP client")]
struct Args {
    /// Number of concurrent request jobs.
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    jobs: usize,

    host: String,
    path: String,
}

fn resolve(host: &str) -> Ipv4Addr {
    let c_host = CString::new(host).expect("host contains a NUL byte");
    let hostent = unsafe { libc::gethostbyname(c_host.as_ptr()) };
    assert!(!hostent.is_null(), "unknown host {}", host);
    let addr_list = unsafe { (*hostent).h_addr_list };
    let first = unsafe { *addr_list };
    assert!(!first.is_null(), "host {} resolved to no addresses", host);
    let octets = unsafe { std::slice::from_raw_parts(first as *const u8, 4) };
    Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])
}

fn connect_nonblocking(addr: Ipv4Addr) -> RawFd {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    assert!(fd >= 0, "socket() failed");
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    unsafe {
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
    let sockaddr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: 80u16.to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from(addr).to_be(),
        },
        sin_zero: [0; 8],
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        sin_len: 0,
    };
    unsafe {
        libc::connect(
            fd,
            &sockaddr as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        );
    }
    fd
}

fn read_more(c: &coromachine::CoroutineRef, fd: RawFd, buf: &mut Vec<u8>) -> bool {
    c.wait(fd, Interest::READABLE);
    let mut chunk = [0u8; 4096];
    let n = unsafe { libc::read(fd, chunk.as_mut_ptr() as *mut libc::c_void, chunk.len()) };
    if n <= 0 {
        return false;
    }
    buf.extend_from_slice(&chunk[..n as usize]);
    true
}

/// Splits off and parses the header block, returning the headers plus
/// whatever body bytes arrived along with them in the same reads.
fn read_headers(
    c: &coromachine::CoroutineRef,
    fd: RawFd,
) -> Option<(HashMap<String, String>, Vec<u8>)> {
    let mut buf = Vec::new();
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_string();
            let mut headers = HashMap::new();
            for line in head.split("\r\n").skip(1) {
                if let Some((k, v)) = line.split_once(':') {
                    headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
                }
            }
            let body_start = pos + 4;
            return Some((headers, buf[body_start..].to_vec()));
        }
        if !read_more(c, fd, &mut buf) {
            return None;
        }
    }
}

/// Streams the rest of a chunked-encoded body to `out`, consuming chunk
/// framing as it goes; `leftover` holds bytes already read past the headers.
fn stream_chunked(c: &coromachine::CoroutineRef, fd: RawFd, mut leftover: Vec<u8>, out: &mut impl Write) {
    loop {
        let line_end = loop {
            if let Some(pos) = leftover.windows(2).position(|w| w == b"\r\n") {
                break pos;
            }
            if !read_more(c, fd, &mut leftover) {
                return;
            }
        };
        let size_line = String::from_utf8_lossy(&leftover[..line_end]).to_string();
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        leftover.drain(..line_end + 2);
        if size == 0 {
            return;
        }
        while leftover.len() < size + 2 {
            if !read_more(c, fd, &mut leftover) {
                return;
            }
        }
        let _ = out.write_all(&leftover[..size]);
        leftover.drain(..size + 2);
    }
}

fn stream_content_length(
    c: &coromachine::CoroutineRef,
    fd: RawFd,
    mut leftover: Vec<u8>,
    remaining: usize,
    out: &mut impl Write,
) {
    let _ = out.write_all(&leftover[..leftover.len().min(remaining)]);
    let mut received = leftover.len().min(remaining);
    leftover.clear();
    while received < remaining {
        let mut chunk = Vec::new();
        if !read_more(c, fd, &mut chunk) {
            return;
        }
        let take = chunk.len().min(remaining - received);
        let _ = out.write_all(&chunk[..take]);
        received += take;
    }
}

fn run_job(c: &coromachine::CoroutineRef, job: usize, host: &str, path: &str, addr: Ipv4Addr) {
    let fd = connect_nonblocking(addr);
    c.wait(fd, Interest::WRITABLE);

    let request = format!("GET {} HTTP/1.1\r\nHost: {}\r\n\r\n", path, host);
    let bytes = request.into_bytes();
    let mut offset = 0;
    while offset < bytes.len() {
        c.wait(fd, Interest::WRITABLE);
        let n = unsafe {
            libc::write(
                fd,
                bytes[offset..].as_ptr() as *const libc::c_void,
                bytes.len() - offset,
            )
        };
        if n <= 0 {
            eprintln!("job {}: write failed", job);
            unsafe {
                libc::close(fd);
            }
            return;
        }
        offset += n as usize;
    }

    let Some((headers, leftover)) = read_headers(c, fd) else {
        eprintln!("job {}: connection closed before headers arrived", job);
        unsafe {
            libc::close(fd);
        }
        return;
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if headers
        .get("transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
    {
        stream_chunked(c, fd, leftover, &mut out);
    } else if let Some(len) = headers.get("content-length").and_then(|v| v.parse::<usize>().ok()) {
        stream_content_length(c, fd, leftover, len, &mut out);
    } else {
        let _ = out.write_all(&leftover);
        loop {
            let mut chunk = Vec::new();
            if !read_more(c, fd, &mut chunk) {
                break;
            }
            let _ = out.write_all(&chunk);
        }
    }
    println!("job {}: done", job);
    unsafe {
        libc::close(fd);
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let machine = CoroutineMachine::new().expect("failed to create coroutine machine");
    let addr = resolve(&args.host);

    for job in 0..args.jobs {
        let host = args.host.clone();
        let path = args.path.clone();
        let id = machine
            .spawn(SpawnOptions::default(), move |c| {
                run_job(c, job, &host, &path, addr)
            })
            .expect("failed to spawn client job");
        machine.start(id).unwrap();
    }

    machine.run().expect("coroutine machine run loop failed");
}
