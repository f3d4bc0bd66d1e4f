//! Master/worker distribution of independent jobs over the ranks of a
//! communicator.
//!
//! Rank [`ROOT`] runs the master, which holds a stack of pending jobs and a
//! stack of free workers, alongside a worker of its own; every other rank runs
//! only a worker. A worker waits for either a `Work` message carrying a job
//! index or a `Finish` message; after executing a job it reports back to the
//! master with `Pending`. Once every job has been reported done, the master
//! sends `Finish` to each worker exactly once.
//!
//! Jobs are handed out in the order they are supplied; which rank executes a
//! job is not deterministic. After the loop the table of job owners is shared
//! with every rank, so that results can be broadcast from their owner.

use log::{ debug, info };
use thiserror::Error;

pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

pub use local::LocalComm;

/// Rank running the master.
pub const ROOT: usize = 0;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Returned when the other end of a channel has hung up.
    #[error("rank {0} disconnected")]
    Disconnected(usize),

    /// Returned when a message arrives that the protocol does not allow.
    #[error("unexpected {tag:?} message from rank {rank}")]
    Unexpected { tag: Tag, rank: usize },

    /// Returned when a rank index is out of range.
    #[error("no rank {0} in a world of {1}")]
    NoSuchRank(usize, usize),

    /// Returned when the master finishes with a job nobody reported.
    #[error("job {0} was never reported done")]
    Unowned(usize),

    #[error("transport error: {0}")]
    Transport(String),
}
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Message tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Worker → master: the job in the payload is done.
    Pending,
    /// Master → worker: execute the job in the payload.
    Work,
    /// Master → worker: no more jobs.
    Finish,
    /// Collective data transfer.
    Broadcast,
}

impl Tag {
    pub fn code(self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Work => 1,
            Self::Finish => 2,
            Self::Broadcast => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Work),
            2 => Some(Self::Finish),
            3 => Some(Self::Broadcast),
            _ => None,
        }
    }
}

/// A received control message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub payload: u64,
}

/// Point-to-point and collective operations needed by the dispatcher and by
/// the distributed two-particle calculation.
pub trait Communicator {
    /// Index of the calling rank.
    fn rank(&self) -> usize;

    /// Number of ranks.
    fn size(&self) -> usize;

    fn is_root(&self) -> bool { self.rank() == ROOT }

    /// Send a control message.
    fn send(&self, dest: usize, tag: Tag, payload: u64) -> DispatchResult<()>;

    /// Return a control message with one of `tags` if one has arrived.
    fn try_receive_any(&self, tags: &[Tag]) -> DispatchResult<Option<Envelope>>;

    /// Block until a control message with one of `tags` arrives.
    fn receive_any(&self, tags: &[Tag]) -> DispatchResult<Envelope>;

    /// Replace `data` on every rank with its contents on `root`.
    fn broadcast(&self, root: usize, data: &mut Vec<f64>) -> DispatchResult<()>;

    /// Block until every rank has reached the barrier.
    fn barrier(&self) -> DispatchResult<()>;
}

/// State of a worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Pending,
    Work(usize),
    Finish,
}

/// Worker half of the protocol.
#[derive(Clone, Debug)]
pub struct Worker {
    state: WorkerState,
    executed: Vec<usize>,
    finish_received: usize,
}

impl Default for Worker {
    fn default() -> Self { Self::new() }
}

impl Worker {
    pub fn new() -> Self {
        Self { state: WorkerState::Pending, executed: Vec::new(), finish_received: 0 }
    }

    pub fn state(&self) -> WorkerState { self.state }

    pub fn is_finished(&self) -> bool { self.state == WorkerState::Finish }

    fn accept(&mut self, env: Envelope) -> DispatchResult<()> {
        match (self.state, env.tag) {
            (WorkerState::Pending, Tag::Work) => {
                self.state = WorkerState::Work(env.payload as usize);
            },
            (WorkerState::Pending, Tag::Finish) => {
                self.finish_received += 1;
                self.state = WorkerState::Finish;
            },
            (_, tag) => {
                return Err(DispatchError::Unexpected { tag, rank: env.source });
            },
        }
        Ok(())
    }

    /// Run the current job, if any, and report it to the master.
    fn execute<C, F, E>(&mut self, comm: &C, job: &mut F) -> Result<(), E>
    where
        C: Communicator + ?Sized,
        F: FnMut(usize) -> Result<(), E>,
        E: From<DispatchError>,
    {
        if let WorkerState::Work(j) = self.state {
            debug!("rank {}: job {}", comm.rank(), j);
            job(j)?;
            self.executed.push(j);
            comm.send(ROOT, Tag::Pending, j as u64)?;
            self.state = WorkerState::Pending;
        }
        Ok(())
    }
}

/// Master half of the protocol.
#[derive(Clone, Debug)]
pub struct Master {
    jobs: Vec<usize>,
    free: Vec<usize>,
    busy: usize,
    finished: Vec<bool>,
    owners: Vec<Option<usize>>,
    finish_sent: usize,
    pending_received: usize,
}

impl Master {
    /// Prepare to hand out jobs `0..num_jobs` in ascending order to
    /// `num_workers` ranks.
    pub fn new(num_workers: usize, num_jobs: usize) -> Self {
        Self {
            jobs: (0..num_jobs).rev().collect(),
            free: (0..num_workers).rev().collect(),
            busy: 0,
            finished: vec![false; num_workers],
            owners: vec![None; num_jobs],
            finish_sent: 0,
            pending_received: 0,
        }
    }

    /// Send a job to every free worker while both are available.
    pub fn order<C>(&mut self, comm: &C) -> DispatchResult<()>
    where C: Communicator + ?Sized
    {
        while !self.jobs.is_empty() && !self.free.is_empty() {
            if let (Some(j), Some(w)) = (self.jobs.pop(), self.free.pop()) {
                comm.send(w, Tag::Work, j as u64)?;
                self.busy += 1;
            }
        }
        Ok(())
    }

    /// Free every worker that has reported a finished job.
    pub fn check_workers<C>(&mut self, comm: &C) -> DispatchResult<bool>
    where C: Communicator + ?Sized
    {
        let mut progress = false;
        while let Some(env) = comm.try_receive_any(&[Tag::Pending])? {
            let j = env.payload as usize;
            match self.owners.get_mut(j) {
                Some(owner) if owner.is_none() => {
                    *owner = Some(env.source);
                },
                _ => {
                    return Err(DispatchError::Unexpected {
                        tag: env.tag, rank: env.source });
                },
            }
            self.free.push(env.source);
            self.busy -= 1;
            self.pending_received += 1;
            progress = true;
        }
        Ok(progress)
    }

    /// `true` once every job has been handed out and reported done.
    pub fn is_done(&self) -> bool { self.jobs.is_empty() && self.busy == 0 }

    /// Send `Finish` to every worker that has not received it yet.
    pub fn finish<C>(&mut self, comm: &C) -> DispatchResult<()>
    where C: Communicator + ?Sized
    {
        for (w, done) in self.finished.iter_mut().enumerate() {
            if *done { continue; }
            comm.send(w, Tag::Finish, 0)?;
            *done = true;
            self.finish_sent += 1;
        }
        Ok(())
    }

    pub fn all_finished(&self) -> bool { self.finished.iter().all(|f| *f) }
}

/// Record of a completed dispatch, as seen from one rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobLedger {
    /// Rank that executed each job; identical on every rank.
    pub owners: Vec<usize>,
    /// Jobs executed by this rank, in execution order.
    pub executed: Vec<usize>,
    /// Number of `Finish` messages this rank's worker received.
    pub finish_received: usize,
    /// Number of `Finish` messages sent by the master; zero off the root.
    pub finish_sent: usize,
    /// Number of `Pending` reports received by the master; zero off the root.
    pub pending_received: usize,
}

impl JobLedger {
    /// Return `true` if this rank executed job `j`.
    pub fn owns(&self, j: usize, rank: usize) -> bool {
        self.owners.get(j).is_some_and(|r| *r == rank)
    }
}

/// Execute jobs `0..num_jobs` across all ranks of `comm`.
///
/// Every rank must call this collectively with the same `num_jobs`; `job` is
/// called once per job, on the rank the job was assigned to.
pub fn dispatch<C, F, E>(comm: &C, num_jobs: usize, mut job: F)
    -> Result<JobLedger, E>
where
    C: Communicator + ?Sized,
    F: FnMut(usize) -> Result<(), E>,
    E: From<DispatchError>,
{
    let mut worker = Worker::new();
    let mut finish_sent: usize = 0;
    let mut pending_received: usize = 0;
    let mut owners: Vec<f64>;
    if comm.is_root() {
        info!("dispatching {} jobs over {} ranks", num_jobs, comm.size());
        let mut master = Master::new(comm.size(), num_jobs);
        loop {
            master.order(comm)?;
            let mut progress = false;
            if !worker.is_finished() {
                if let Some(env)
                    = comm.try_receive_any(&[Tag::Work, Tag::Finish])?
                {
                    worker.accept(env)?;
                    worker.execute(comm, &mut job)?;
                    progress = true;
                }
            }
            progress |= master.check_workers(comm)?;
            if master.is_done() { master.finish(comm)?; }
            if master.all_finished() && worker.is_finished() { break; }
            if !progress { std::thread::yield_now(); }
        }
        finish_sent = master.finish_sent;
        pending_received = master.pending_received;
        owners = master.owners.iter().enumerate()
            .map(|(j, r)| r.map(|r| r as f64).ok_or(DispatchError::Unowned(j)))
            .collect::<DispatchResult<Vec<f64>>>()?;
    } else {
        while !worker.is_finished() {
            let env = comm.receive_any(&[Tag::Work, Tag::Finish])?;
            worker.accept(env)?;
            worker.execute(comm, &mut job)?;
        }
        owners = Vec::new();
    }
    comm.broadcast(ROOT, &mut owners)?;
    comm.barrier()?;
    debug!("rank {}: executed {} jobs", comm.rank(), worker.executed.len());
    Ok(JobLedger {
        owners: owners.into_iter().map(|r| r as usize).collect(),
        executed: worker.executed,
        finish_received: worker.finish_received,
        finish_sent,
        pending_received,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{ Arc, Mutex };

    #[test]
    fn single_rank_runs_in_order() {
        let comm = LocalComm::world(1).pop().unwrap();
        let mut seen: Vec<usize> = Vec::new();
        let ledger: JobLedger
            = dispatch(&comm, 5, |j| -> DispatchResult<()> {
                seen.push(j);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(ledger.owners, vec![0; 5]);
        assert_eq!(ledger.finish_sent, 1);
        assert_eq!(ledger.finish_received, 1);
        assert_eq!(ledger.pending_received, 5);
    }

    #[test]
    fn no_jobs() {
        let comms = LocalComm::world(3);
        let handles: Vec<_>
            = comms.into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    dispatch(&comm, 0, |_| -> DispatchResult<()> { Ok(()) })
                })
            })
            .collect();
        let ledgers: Vec<JobLedger>
            = handles.into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert_eq!(ledgers[0].finish_sent, 3);
        assert!(ledgers.iter().all(|l| l.finish_received == 1));
        assert!(ledgers.iter().all(|l| l.executed.is_empty()));
    }

    #[test]
    fn job_errors_propagate() {
        let comm = LocalComm::world(1).pop().unwrap();
        #[derive(Debug)]
        enum Failure { Job, Dispatch }
        impl From<DispatchError> for Failure {
            fn from(_: DispatchError) -> Self { Self::Dispatch }
        }
        let log = Arc::new(Mutex::new(Vec::new()));
        let res = dispatch(&comm, 3, |j| {
            log.lock().unwrap().push(j);
            if j == 1 { Err(Failure::Job) } else { Ok(()) }
        });
        assert!(matches!(res, Err(Failure::Job)));
        assert_eq!(*log.lock().unwrap(), vec![0, 1]);
    }
}
