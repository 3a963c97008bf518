//! Stop signal shared by one transform run
//!
//! `Transformer::cancellation_token` hands out clones. Source readers look at
//! the signal before sending each batch, the node pass before merging one, and
//! the export pass and sink writers before each batch they forward. A run that
//! sees it ends `Cancelled`; sinks keep whatever they were already given.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    stop: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every stage holding a clone to stop at its next batch boundary
    pub fn cancel(&self) {
        if !self.stop.swap(true, Ordering::Relaxed) {
            tracing::info!("transform cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_run_is_not_cancelled() {
        assert!(!CancellationToken::default().is_cancelled());
    }

    #[test]
    fn cancelling_twice_is_harmless() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn reader_threads_see_a_cancel_from_the_caller() {
        let caller = CancellationToken::new();
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let token = caller.clone();
                std::thread::spawn(move || {
                    let mut batches = 0usize;
                    while !token.is_cancelled() {
                        batches += 1;
                        std::thread::yield_now();
                    }
                    batches
                })
            })
            .collect();

        caller.cancel();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
