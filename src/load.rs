use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// Checking the stop flag once per burst keeps the flag read off the hot path.
const BURST: u32 = 4096;
// The accumulator is rewound periodically so the value never grows without
// bound across a long session.
const RESET_EVERY_BURSTS: u64 = 1024;
const SEED: u64 = 0x9e3779b97f4a7c15;

pub struct LoadGenerator {
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl LoadGenerator {
    pub fn new() -> Self {
        Self {
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        self.stop_flag.store(false, Ordering::Relaxed);
        let stop = Arc::clone(&self.stop_flag);
        self.worker = Some(thread::spawn(move || busy_loop(stop)));
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    // Safe to call any number of times, including before start.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Default for LoadGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LoadGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn busy_loop(stop: Arc<AtomicBool>) {
    let mut x = SEED;
    let mut bursts: u64 = 0;
    while !stop.load(Ordering::Relaxed) {
        for _ in 0..BURST {
            x = x
                .wrapping_mul(1664525)
                .wrapping_add(1013904223)
                .rotate_left(5);
        }
        bursts += 1;
        if bursts % RESET_EVERY_BURSTS == 0 {
            x = SEED;
        }
    }
    std::hint::black_box(x);
}
