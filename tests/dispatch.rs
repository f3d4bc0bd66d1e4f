use std::{
    sync::{ Arc, Mutex },
    thread,
    time::Duration,
};
use rand::Rng;
use lehmann_ed::dispatch::{
    self,
    Communicator,
    DispatchResult,
    JobLedger,
    LocalComm,
    ROOT,
};

fn run_world(size: usize, workloads: &[u64]) -> (Vec<JobLedger>, Vec<(usize, usize)>) {
    let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let ledgers: Vec<JobLedger>
        = thread::scope(|s| {
            let handles: Vec<_>
                = LocalComm::world(size).into_iter()
                .map(|comm| {
                    let log = Arc::clone(&log);
                    s.spawn(move || {
                        let rank = comm.rank();
                        dispatch::dispatch(
                            &comm,
                            workloads.len(),
                            |j| -> DispatchResult<()> {
                                thread::sleep(Duration::from_micros(workloads[j]));
                                log.lock().unwrap().push((rank, j));
                                Ok(())
                            },
                        )
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
    let log = log.lock().unwrap().clone();
    (ledgers, log)
}

#[test]
fn every_job_runs_exactly_once() {
    let mut rng = rand::thread_rng();
    for size in [2, 3, 4] {
        let workloads: Vec<u64> = (0..15).map(|_| rng.gen_range(0..2000)).collect();
        let (ledgers, log) = run_world(size, &workloads);
        assert_eq!(ledgers.len(), size);

        let mut jobs: Vec<usize> = log.iter().map(|(_, j)| *j).collect();
        jobs.sort_unstable();
        assert_eq!(jobs, (0..15).collect::<Vec<usize>>());

        let root = &ledgers[ROOT];
        assert_eq!(root.finish_sent, size);
        assert_eq!(root.pending_received, 15);
        assert_eq!(
            ledgers.iter().map(|l| l.executed.len()).sum::<usize>(),
            root.pending_received,
        );
        for (rank, ledger) in ledgers.iter().enumerate() {
            assert_eq!(ledger.finish_received, 1);
            assert_eq!(ledger.owners, root.owners);
            if rank != ROOT {
                assert_eq!(ledger.finish_sent, 0);
                assert_eq!(ledger.pending_received, 0);
            }
            for j in ledger.executed.iter() {
                assert!(ledger.owns(*j, rank));
                assert!(log.contains(&(rank, *j)));
            }
        }
    }
}

#[test]
fn more_ranks_than_jobs() {
    let (ledgers, log) = run_world(4, &[10, 10]);
    assert_eq!(log.len(), 2);
    assert_eq!(ledgers[ROOT].finish_sent, 4);
    assert!(ledgers.iter().all(|l| l.finish_received == 1));
}
