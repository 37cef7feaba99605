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

use criterion::{criterion_group, criterion_main, Criterion};
use coromachine::{CoroutineMachine, SpawnOptions};

/// Cost of spawning a coroutine and running it to completion without it
/// ever suspending: allocates a stack, builds a `Context`, switches in and
/// back out exactly once.
fn spawn_and_run(c: &mut Criterion) {
    c.bench_function("spawn_and_run_to_completion", |b| {
        b.iter(|| {
            let machine = CoroutineMachine::new().unwrap();
            let id = machine.spawn(SpawnOptions::default(), |_c| {}).unwrap();
            machine.start(id).unwrap();
            machine.run().unwrap();
        })
    });
}

/// Cost of a single `yield_now` round trip: two coroutines ping-ponging
/// control back and forth a fixed number of times, isolating the
/// steady-state context-switch path from spawn/teardown overhead.
fn yield_round_trip(c: &mut Criterion) {
    const ROUNDS: usize = 10_000;

    c.bench_function("yield_round_trip_10k", |b| {
        b.iter(|| {
            let machine = CoroutineMachine::new().unwrap();
            let a = machine
                .spawn(SpawnOptions::default(), |c| {
                    for _ in 0..ROUNDS {
                        c.yield_now();
                    }
                })
                .unwrap();
            let b = machine
                .spawn(SpawnOptions::default(), |c| {
                    for _ in 0..ROUNDS {
                        c.yield_now();
                    }
                })
                .unwrap();
            machine.start(a).unwrap();
            machine.start(b).unwrap();
            machine.run().unwrap();
        })
    });
}

/// Cost of a typed `Call`/`YieldValue` rendezvous: a generator produces one
/// value per call, exercising the payload-copy path in addition to the
/// bare context switch.
fn call_rendezvous(c: &mut Criterion) {
    const ROUNDS: usize = 10_000;

    c.bench_function("call_rendezvous_10k", |b| {
        b.iter(|| {
            let machine = CoroutineMachine::new().unwrap();
            let generator = machine
                .spawn(SpawnOptions::default(), |c| loop {
                    c.yield_value(1u64).unwrap();
                })
                .unwrap();

            let consumer = machine
                .spawn(SpawnOptions::default(), move |c| {
                    for _ in 0..ROUNDS {
                        let _ = c.call::<u64>(generator).unwrap();
                    }
                    c.stop();
                })
                .unwrap();

            machine.start(consumer).unwrap();
            machine.run().unwrap();
        })
    });
}

criterion_group!(benches, spawn_and_run, yield_round_trip, call_rendezvous);
criterion_main!(benches);
