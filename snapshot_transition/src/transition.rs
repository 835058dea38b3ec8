use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use code_trie::commitment::{merkleize_with, CommitmentBackend};
use ethereum_types::H256;
use hashbrown::HashSet;
use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    account::code_hash_from_slim_rlp,
    config::TransitionConfig,
    error::{TransitionError, TransitionResult},
    index::CodeRootIndex,
    source::{AccountIterator, CodeSource},
};

/// Counters of a finished transition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransitionStats {
    /// Account records read.
    pub accounts: usize,
    /// Distinct code bodies merkleized.
    pub merkleized: usize,
    /// Accounts whose code had already been merkleized.
    pub duplicates: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl TransitionStats {
    fn log(&self) {
        info!(
            accounts = self.accounts,
            merkleized = self.merkleized,
            duplicates = self.duplicates,
            elapsed = ?self.elapsed,
            "Code trie transition finished"
        );
    }
}

/// Time spent merkleizing one code body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MerkleizationTiming {
    /// Hash of the code.
    pub code_hash: H256,
    /// Length of the code in bytes.
    pub code_len: usize,
    /// Time spent chunking and committing the code.
    pub elapsed: Duration,
}

/// A root computed by a worker.
#[derive(Debug)]
struct CodeRoot {
    code_hash: H256,
    root: H256,
    /// Whether this worker computed the root, as opposed to finding it in the
    /// index.
    fresh: bool,
}

fn merkleize_code<S: CodeSource + ?Sized>(
    code_source: &S,
    code_hash: H256,
    chunk_size: usize,
    backend: CommitmentBackend,
) -> TransitionResult<H256> {
    let code = code_source
        .code(&code_hash)
        .map_err(|source| TransitionError::CodeSource { code_hash, source })?;

    Ok(merkleize_with(&code, chunk_size, backend)?)
}

/// Merkleizes the code of every account on the calling thread, recording
/// each distinct code root in `index`.
///
/// Code already present in `index` is counted as a duplicate and not fetched
/// again. The counters are logged even if the transition fails.
pub fn transition<S, A>(
    code_source: &S,
    accounts: &mut A,
    config: &TransitionConfig,
    index: &CodeRootIndex,
) -> TransitionResult<TransitionStats>
where
    S: CodeSource + ?Sized,
    A: AccountIterator + ?Sized,
{
    config.validate()?;

    let start = Instant::now();
    let mut stats = TransitionStats::default();
    let res = run_sequential(code_source, accounts, config, index, &mut stats);

    stats.elapsed = start.elapsed();
    stats.log();

    res.map(|_| stats)
}

fn run_sequential<S, A>(
    code_source: &S,
    accounts: &mut A,
    config: &TransitionConfig,
    index: &CodeRootIndex,
    stats: &mut TransitionStats,
) -> TransitionResult<()>
where
    S: CodeSource + ?Sized,
    A: AccountIterator + ?Sized,
{
    while accounts.next() {
        stats.accounts += 1;

        let Some(code_hash) = code_hash_from_slim_rlp(accounts.account_record())? else {
            continue;
        };

        let (root, fresh) = index.get_or_compute(code_hash, || {
            merkleize_code(code_source, code_hash, config.chunk_size, config.backend)
        })?;

        match fresh {
            true => {
                debug!("code {code_hash:x} -> root {root:x}");
                stats.merkleized += 1;
            }
            false => stats.duplicates += 1,
        }
    }

    Ok(())
}

/// Merkleizes the code of every account with a pool of
/// [`num_workers`](TransitionConfig::num_workers) blocking workers, recording
/// each distinct code root in `index`.
///
/// A producer task walks `accounts` and queues code hashes on a queue of
/// [`queue_capacity`](TransitionConfig::queue_capacity) entries, waiting
/// while it is full. Workers resolve hashes through `index` and report
/// their roots in completion order. On the first error, the producer and the
/// workers are told to stop; the error is returned once every task has
/// finished.
pub async fn transition_concurrent<S, A>(
    code_source: Arc<S>,
    accounts: A,
    config: &TransitionConfig,
    index: Arc<CodeRootIndex>,
) -> TransitionResult<TransitionStats>
where
    S: CodeSource + ?Sized + 'static,
    A: AccountIterator + 'static,
{
    config.validate()?;

    let start = Instant::now();
    let (job_tx, job_rx) = mpsc::channel::<H256>(config.queue_capacity);
    let (result_tx, mut result_rx) =
        mpsc::channel::<TransitionResult<CodeRoot>>(config.queue_capacity);
    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);

    let producer = tokio::task::spawn_blocking({
        let stop_tx = stop_tx.clone();
        move || produce(accounts, job_tx, &stop_tx)
    });

    let job_rx = Arc::new(Mutex::new(job_rx));
    let mut workers = JoinSet::new();
    for _ in 0..config.num_workers {
        let worker = Worker {
            jobs: job_rx.clone(),
            results: result_tx.clone(),
            stop: stop_rx.clone(),
            code_source: code_source.clone(),
            index: index.clone(),
            chunk_size: config.chunk_size,
            backend: config.backend,
        };
        workers.spawn_blocking(move || worker.run());
    }
    // Only the workers hold senders now, so the result queue closes once
    // they are all done.
    drop(result_tx);
    drop(job_rx);

    let mut stats = TransitionStats::default();
    let mut first_error = None;

    loop {
        tokio::select! {
            Some(result) = result_rx.recv() => match result {
                Ok(CodeRoot { code_hash, root, fresh }) => match fresh {
                    true => {
                        debug!("code {code_hash:x} -> root {root:x}");
                        stats.merkleized += 1;
                    }
                    false => stats.duplicates += 1,
                },
                Err(e) => {
                    warn!("Stopping transition: {e}");
                    stop_tx.send_replace(true);
                    first_error.get_or_insert(e);
                }
            },
            Some(joined) = workers.join_next() => {
                if let Err(e) = joined {
                    warn!("Transition worker failed: {e}");
                    stop_tx.send_replace(true);
                    first_error.get_or_insert(e.into());
                }
            },
            else => break,
        }
    }

    match producer.await {
        Ok((accounts, res)) => {
            stats.accounts = accounts;
            if let Err(e) = res {
                first_error.get_or_insert(e);
            }
        }
        Err(e) => {
            first_error.get_or_insert(e.into());
        }
    }

    stats.elapsed = start.elapsed();
    stats.log();

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

/// Queues the code hash of every account with code. Returns the number of
/// accounts read, which includes a record that failed to decode.
fn produce<A: AccountIterator>(
    mut accounts: A,
    jobs: mpsc::Sender<H256>,
    stop: &watch::Sender<bool>,
) -> (usize, TransitionResult<()>) {
    let mut num_accounts = 0;

    while !*stop.borrow() && accounts.next() {
        num_accounts += 1;

        let code_hash = match code_hash_from_slim_rlp(accounts.account_record()) {
            Ok(Some(code_hash)) => code_hash,
            Ok(None) => continue,
            Err(e) => {
                stop.send_replace(true);
                return (num_accounts, Err(e));
            }
        };

        // The workers are gone, which only happens after a stop.
        if jobs.blocking_send(code_hash).is_err() {
            break;
        }
    }

    (num_accounts, Ok(()))
}

struct Worker<S: ?Sized> {
    jobs: Arc<Mutex<mpsc::Receiver<H256>>>,
    results: mpsc::Sender<TransitionResult<CodeRoot>>,
    stop: watch::Receiver<bool>,
    code_source: Arc<S>,
    index: Arc<CodeRootIndex>,
    chunk_size: usize,
    backend: CommitmentBackend,
}

impl<S: CodeSource + ?Sized> Worker<S> {
    fn run(self) {
        while !*self.stop.borrow() {
            // Only idle workers wait on the lock; it is released before the
            // job runs.
            let Some(code_hash) = self.jobs.lock().blocking_recv() else {
                break;
            };

            let result = self
                .index
                .get_or_compute(code_hash, || {
                    merkleize_code(&*self.code_source, code_hash, self.chunk_size, self.backend)
                })
                .map(|(root, fresh)| CodeRoot {
                    code_hash,
                    root,
                    fresh,
                });

            if self.results.blocking_send(result).is_err() {
                break;
            }
        }
    }
}

/// Times the merkleization of every distinct code body referenced by
/// `accounts`, slowest first.
pub fn bench_merkleization_overhead<S, A>(
    code_source: &S,
    accounts: &mut A,
    config: &TransitionConfig,
) -> TransitionResult<Vec<MerkleizationTiming>>
where
    S: CodeSource + ?Sized,
    A: AccountIterator + ?Sized,
{
    config.validate()?;

    let mut seen = HashSet::new();
    let mut timings = Vec::new();

    while accounts.next() {
        let Some(code_hash) = code_hash_from_slim_rlp(accounts.account_record())? else {
            continue;
        };
        if !seen.insert(code_hash) {
            continue;
        }

        let code = code_source
            .code(&code_hash)
            .map_err(|source| TransitionError::CodeSource { code_hash, source })?;

        let start = Instant::now();
        merkleize_with(&code, config.chunk_size, config.backend)?;
        timings.push(MerkleizationTiming {
            code_hash,
            code_len: code.len(),
            elapsed: start.elapsed(),
        });
    }

    timings.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));

    let total: Duration = timings.iter().map(|t| t.elapsed).sum();
    info!(
        codes = timings.len(),
        total = ?total,
        slowest = ?timings.first().map(|t| t.elapsed),
        "Merkleization overhead measured"
    );

    Ok(timings)
}
