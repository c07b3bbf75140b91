//! Proof-of-work nonce search.
//!
//! The target is "at least `difficulty` leading zero characters in the hex
//! form of the header hash". The search runs nonces upward from 0 and can
//! be split across workers; it always settles on the smallest satisfying
//! nonce, so the sealed block does not depend on the worker count.

use crate::block::BlockHeader;
use crate::hash::{Hash, HEX_LEN};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// How many attempts a worker makes between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Errors that end a mining attempt without a sealed block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("mining cancelled")]
    Cancelled,

    #[error("mining timed out after {attempts} attempts")]
    TimedOut { attempts: u64 },

    #[error("no nonce below {max_nonce} satisfies difficulty {difficulty}")]
    BudgetExhausted { max_nonce: u64, difficulty: u32 },

    #[error("difficulty {0} exceeds the {HEX_LEN} hex digits of a hash")]
    InvalidDifficulty(u32),
}

/// Cancellation and bounds for a mining attempt.
///
/// Clones share the cancellation flag, so a clone handed to a signal
/// handler or another thread can stop a search in progress.
#[derive(Debug, Clone, Default)]
pub struct MiningControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    max_nonce: Option<u64>,
}

impl MiningControl {
    /// Unbounded search that only stops on [`MiningControl::cancel`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up once `timeout` has elapsed from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Only try nonces below `max_nonce`.
    pub fn with_max_nonce(mut self, max_nonce: u64) -> Self {
        self.max_nonce = Some(max_nonce);
        self
    }

    /// Request that every search using this control stops.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// A successful search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    pub nonce: u64,
    pub hash: Hash,
    /// Hashes computed across all workers.
    pub attempts: u64,
}

enum Outcome {
    Found { nonce: u64, hash: Hash },
    Superseded,
    Cancelled,
    TimedOut,
    Exhausted,
}

/// Nonce searcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Miner {
    workers: usize,
}

impl Default for Miner {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

impl Miner {
    /// A miner partitioning the nonce space across `workers` threads.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Search for the smallest nonce whose header hash meets the header's
    /// difficulty. The header's own nonce is ignored.
    pub fn search(
        &self,
        header: &BlockHeader,
        control: &MiningControl,
    ) -> Result<Seal, MiningError> {
        if header.difficulty as usize > HEX_LEN {
            return Err(MiningError::InvalidDifficulty(header.difficulty));
        }

        let best = AtomicU64::new(u64::MAX);
        let attempts = AtomicU64::new(0);
        let stride = self.workers as u64;

        let outcomes: Vec<Outcome> = if self.workers == 1 {
            vec![search_lane(header.clone(), 0, 1, control, &best, &attempts)]
        } else {
            thread::scope(|s| {
                let handles: Vec<_> = (0..stride)
                    .map(|lane| {
                        let header = header.clone();
                        let best = &best;
                        let attempts = &attempts;
                        s.spawn(move || search_lane(header, lane, stride, control, best, attempts))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or(Outcome::Cancelled))
                    .collect()
            })
        };

        let attempts = attempts.load(Ordering::SeqCst);
        let winner = best.load(Ordering::SeqCst);
        let mut found = None;
        let mut timed_out = false;
        let mut cancelled = false;
        for outcome in outcomes {
            match outcome {
                Outcome::Found { nonce, hash } if nonce == winner => found = Some(hash),
                Outcome::Found { .. } | Outcome::Superseded | Outcome::Exhausted => {}
                Outcome::Cancelled => cancelled = true,
                Outcome::TimedOut => timed_out = true,
            }
        }

        if let Some(hash) = found {
            debug!(nonce = winner, attempts, difficulty = header.difficulty, "nonce found");
            return Ok(Seal {
                nonce: winner,
                hash,
                attempts,
            });
        }
        if cancelled {
            return Err(MiningError::Cancelled);
        }
        if timed_out {
            return Err(MiningError::TimedOut { attempts });
        }
        Err(MiningError::BudgetExhausted {
            max_nonce: control.max_nonce.unwrap_or(u64::MAX),
            difficulty: header.difficulty,
        })
    }
}

/// Try nonces `start, start + stride, ...` until one satisfies the target
/// or a smaller winner is already known.
fn search_lane(
    mut header: BlockHeader,
    start: u64,
    stride: u64,
    control: &MiningControl,
    best: &AtomicU64,
    attempts: &AtomicU64,
) -> Outcome {
    let limit = control.max_nonce.unwrap_or(u64::MAX);
    let mut nonce = start;
    let mut tried: u64 = 0;

    let outcome = loop {
        if nonce >= best.load(Ordering::Relaxed) {
            break Outcome::Superseded;
        }
        if nonce >= limit {
            break Outcome::Exhausted;
        }
        if control.is_cancelled() {
            break Outcome::Cancelled;
        }
        if tried % DEADLINE_CHECK_INTERVAL == 0 && control.deadline_passed() {
            break Outcome::TimedOut;
        }

        header.nonce = nonce;
        let hash = header.hash();
        tried += 1;
        if hash.meets_difficulty(header.difficulty) {
            best.fetch_min(nonce, Ordering::SeqCst);
            break Outcome::Found { nonce, hash };
        }

        nonce = match nonce.checked_add(stride) {
            Some(next) => next,
            None => break Outcome::Exhausted,
        };
    };

    attempts.fetch_add(tried, Ordering::Relaxed);
    outcome
}
