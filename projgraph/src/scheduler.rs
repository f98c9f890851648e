// Copyright (c) The projgraph Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component M: the products scheduler (spec §4.M).
//!
//! Grounded on `original_source/src/lib/corelib/loader/productshandler.cpp`/`productsresolver.cpp`'s
//! queue-with-deferral loop. The requeue-with-a-shrinking-tag termination argument mirrors the
//! "insert, process, requeue with updated state, repeat until stable" pattern `guppy`'s
//! `graph::select_core` uses for its own worklist-style graph queries.

use std::collections::VecDeque;

/// A cooperative cancellation flag observed between products (spec §5, "Cancellation &
/// timeouts").
#[derive(Clone, Default)]
pub struct CancellationToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    /// Builds a fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// True if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// One entry in the scheduler's work queue: a product identifier plus the queue size observed
/// when it was (re-)inserted (spec §4.M: "a FIFO of `(product, queueSizeWhenInserted)`").
#[derive(Clone, Debug)]
struct QueueEntry<P> {
    product: P,
    queue_size_when_inserted: i64,
}

/// Outcome of resolving one product for one scheduler step.
pub enum ProductOutcome {
    /// The product finished (successfully or with a recorded delayed error).
    Finished,
    /// The product cannot proceed yet; requeue it.
    Pending,
}

/// Drives the product work queue with the forward-progress deferral policy (spec §4.M).
pub struct ProductsScheduler<P> {
    queue: VecDeque<QueueEntry<P>>,
    cancellation: CancellationToken,
}

impl<P: Clone> ProductsScheduler<P> {
    /// Builds a scheduler with every product enqueued at `-1` (spec §4.M: "Initially every
    /// product is enqueued with `-1`").
    pub fn new(products: impl IntoIterator<Item = P>, cancellation: CancellationToken) -> Self {
        Self {
            queue: products
                .into_iter()
                .map(|product| QueueEntry {
                    product,
                    queue_size_when_inserted: -1,
                })
                .collect(),
            cancellation,
        }
    }

    /// Runs the queue to completion, invoking `resolve_one(product, allow_deferral) ->
    /// ProductOutcome` per product until empty, then `on_drained()` once. Returns early with
    /// `Err` on cancellation (spec §4.M, step 5).
    pub fn run(
        &mut self,
        mut resolve_one: impl FnMut(&P, bool) -> crate::Result<ProductOutcome>,
        mut on_drained: impl FnMut(),
    ) -> crate::Result<()> {
        while let Some(entry) = self.queue.pop_front() {
            if self.cancellation.is_cancelled() {
                return Err(crate::Error::Cancelled);
            }
            let queue_len_before = self.queue.len() as i64;
            let allow_deferral = queue_len_before < entry.queue_size_when_inserted
                || entry.queue_size_when_inserted < 0;
            match resolve_one(&entry.product, allow_deferral)? {
                ProductOutcome::Finished => {}
                ProductOutcome::Pending => {
                    self.queue.push_back(QueueEntry {
                        product: entry.product,
                        queue_size_when_inserted: self.queue.len() as i64,
                    });
                }
            }
        }
        on_drained();
        Ok(())
    }

    /// The cancellation token this scheduler polls; callers can hand clones to long-running
    /// external capabilities (probes, module providers) so they can also observe cancellation.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_progress_eventually_forces_non_deferral() {
        // Two mutually-pending products: the first `allow_deferral` calls may defer, but once the
        // queue length stabilizes the next attempt must run non-deferral and therefore either
        // succeeds or produces a definite error rather than looping forever (spec §8, "Scheduler
        // termination").
        let mut scheduler = ProductsScheduler::new(vec!["a", "b"], CancellationToken::new());
        let mut attempts: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
        let mut deferral_flags = Vec::new();
        let result = scheduler.run(
            |p, allow_deferral| {
                *attempts.entry(*p).or_insert(0) += 1;
                deferral_flags.push(allow_deferral);
                if allow_deferral && attempts[p] < 3 {
                    Ok(ProductOutcome::Pending)
                } else {
                    Ok(ProductOutcome::Finished)
                }
            },
            || {},
        );
        assert!(result.is_ok());
        assert!(deferral_flags.contains(&false), "must eventually run non-deferral");
    }

    #[test]
    fn cancellation_aborts_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let mut scheduler = ProductsScheduler::new(vec!["a"], token);
        let result = scheduler.run(|_, _| Ok(ProductOutcome::Finished), || {});
        assert!(matches!(result, Err(crate::Error::Cancelled)));
    }
}
