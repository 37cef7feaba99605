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

//! Coroutine stack allocation.
//!
//! Backed by `context::stack::ProtectedFixedSizeStack`, which puts a guard
//! page at the end of the mapping so a stack overflow segfaults instead of
//! silently corrupting whatever memory follows it.

use context::stack::{ProtectedFixedSizeStack, Stack as ContextStack};

/// Default stack size for a coroutine that does not request its own.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024;

pub struct Stack {
    inner: ProtectedFixedSizeStack,
}

impl Stack {
    pub fn new(size: usize) -> Stack {
        Stack {
            inner: ProtectedFixedSizeStack::new(size)
                .expect("failed to allocate coroutine stack"),
        }
    }

    pub fn top(&self) -> *mut std::ffi::c_void {
        self.inner.top()
    }

    pub fn bottom(&self) -> *mut std::ffi::c_void {
        self.inner.bottom()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

unsafe impl ContextStack for Stack {
    fn top(&self) -> *mut std::ffi::c_void {
        self.inner.top()
    }

    fn bottom(&self) -> *mut std::ffi::c_void {
        self.inner.bottom()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack").field("len", &self.len()).finish()
    }
}
