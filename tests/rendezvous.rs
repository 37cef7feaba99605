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

//! A Generator that yields 1..4 delivers exactly those values, in order, to
//! a Consumer that calls it four times; a fifth call observes it as dead.

use std::cell::RefCell;
use std::rc::Rc;

use coromachine::{CoroutineMachine, Error, SpawnOptions};

#[test]
fn generator_yields_four_values_then_is_not_alive() {
    let machine = CoroutineMachine::new().unwrap();

    let generator = machine
        .spawn(SpawnOptions::default(), |c| {
            for v in 1..=4i32 {
                c.yield_value(v).unwrap();
            }
        })
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    let generator_for_consumer = generator;
    let consumer = machine
        .spawn(SpawnOptions::default(), move |c| {
            for _ in 0..4 {
                let v = c.call::<i32>(generator_for_consumer).unwrap();
                seen2.borrow_mut().push(v);
            }
            let fifth = c.call::<i32>(generator_for_consumer).unwrap();
            assert!(fifth.is_none());
            assert!(!c.is_alive(generator_for_consumer));
        })
        .unwrap();

    machine.start(consumer).unwrap();
    machine.run().unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![Some(1), Some(2), Some(3), Some(4)]
    );
}

/// A `yield_value` with no pending `call` simply drops the value instead of
/// signaling anyone; the generator still responds correctly to a `call`
/// that arrives afterward, and the call that resumes it past its last
/// suspension point observes ordinary termination.
#[test]
fn a_value_yielded_with_no_waiting_caller_is_dropped_not_lost_forever() {
    let machine = CoroutineMachine::new().unwrap();
    let generator = machine
        .spawn(SpawnOptions::default(), |c| {
            c.yield_value(1i32).unwrap();
        })
        .unwrap();
    machine.start(generator).unwrap();

    let consumer = machine
        .spawn(SpawnOptions::default(), move |c| {
            let v = c.call::<i32>(generator).unwrap();
            assert!(v.is_none());
            assert!(!c.is_alive(generator));
        })
        .unwrap();
    machine.start(consumer).unwrap();

    machine.run().unwrap();
}

/// `call`ing a coroutine that is already dead errs with `NotAlive` rather
/// than silently returning `None`.
#[test]
fn call_on_an_already_dead_coroutine_errs_not_alive() {
    let machine = CoroutineMachine::new().unwrap();
    let done = machine.spawn(SpawnOptions::default(), |_c| {}).unwrap();
    machine.start(done).unwrap();

    let caller = machine
        .spawn(SpawnOptions::default(), move |c| {
            // Yield once so `done` gets a chance to run to completion first.
            c.yield_now();
            match c.call::<i32>(done) {
                Err(Error::NotAlive(id)) => assert_eq!(id, done.value()),
                other => panic!("expected NotAlive, got {:?}", other),
            }
        })
        .unwrap();
    machine.start(caller).unwrap();

    machine.run().unwrap();
}

/// A `yield_value::<T>` whose `T` doesn't match the caller's `call::<U>`
/// size errs with `PayloadMismatch` instead of silently dropping the value.
#[test]
fn yield_value_size_mismatch_errs_payload_mismatch() {
    let machine = CoroutineMachine::new().unwrap();
    let mismatched = Rc::new(RefCell::new(false));
    let mismatched2 = mismatched.clone();
    let generator = machine
        .spawn(SpawnOptions::default(), move |c| {
            match c.yield_value(1u64) {
                Err(Error::PayloadMismatch { expected, found }) => {
                    assert_eq!(expected, std::mem::size_of::<i32>());
                    assert_eq!(found, std::mem::size_of::<u64>());
                    *mismatched2.borrow_mut() = true;
                }
                other => panic!("expected PayloadMismatch, got {:?}", other),
            }
        })
        .unwrap();

    let consumer = machine
        .spawn(SpawnOptions::default(), move |c| {
            let v = c.call::<i32>(generator).unwrap();
            assert!(v.is_none());
        })
        .unwrap();
    machine.start(consumer).unwrap();

    machine.run().unwrap();
    assert!(*mismatched.borrow());
}

/// `call`ing a coroutine that panics before it ever yields surfaces the
/// panic message through `Error::Poisoned` rather than reporting it as an
/// ordinary `None` termination.
#[test]
fn call_on_a_panicking_callee_errs_poisoned() {
    let machine = CoroutineMachine::new().unwrap();
    let boom = machine
        .spawn(SpawnOptions::default(), |_c| {
            panic!("boom");
        })
        .unwrap();

    let caller = machine
        .spawn(SpawnOptions::default(), move |c| {
            match c.call::<i32>(boom) {
                Err(Error::Poisoned(id, message)) => {
                    assert_eq!(id, boom.value());
                    assert!(message.contains("boom"));
                }
                other => panic!("expected Poisoned, got {:?}", other),
            }
        })
        .unwrap();
    machine.start(caller).unwrap();

    machine.run().unwrap();
}
