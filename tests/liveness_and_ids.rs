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

use coromachine::{CoroutineMachine, SpawnOptions};

#[test]
fn is_alive_reflects_termination() {
    let machine = CoroutineMachine::new().unwrap();
    let id = machine
        .spawn(SpawnOptions::default(), |c| {
            c.yield_now();
        })
        .unwrap();
    assert!(machine.is_alive(id));
    machine.start(id).unwrap();
    machine.run().unwrap();
    assert!(!machine.is_alive(id));
}

/// A terminated coroutine's id is recycled by the next `spawn`, exactly as
/// the identifier-allocation bitset is documented to behave.
#[test]
fn terminated_ids_are_recycled() {
    let machine = CoroutineMachine::new().unwrap();
    let first = machine
        .spawn(SpawnOptions::default(), |_c| {})
        .unwrap();
    machine.start(first).unwrap();
    machine.run().unwrap();
    assert!(!machine.is_alive(first));

    let second = machine
        .spawn(SpawnOptions::default(), |c| {
            c.yield_now();
        })
        .unwrap();
    assert_eq!(second, first);
    machine.start(second).unwrap();
    machine.run().unwrap();
}
