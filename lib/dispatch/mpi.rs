//! Communicator backed by an MPI world.
//!
//! Control messages go out as non-blocking sends. Each request and its
//! payload are held until the send completes, which is checked on every
//! receive and forced at barriers and on drop.

use std::cell::RefCell;
use mpi::{
    environment::Universe,
    request::{ Request, StaticScope },
    topology::SimpleCommunicator,
    traits::{
        Communicator as MpiCommunicator,
        CommunicatorCollectives,
        Destination,
        Root,
        Source,
    },
};
use super::{ Communicator, DispatchError, DispatchResult, Envelope, Tag };

/// An in-flight send and the heap cell holding its payload.
struct Outgoing {
    request: Request<'static, u64, StaticScope>,
    payload: *mut u64,
}

impl Outgoing {
    fn post(world: &SimpleCommunicator, dest: usize, tag: Tag, payload: u64)
        -> Self
    {
        let payload: *mut u64 = Box::into_raw(Box::new(payload));
        // SAFETY: the cell is freed only in `release`, after the request
        // that reads it has completed.
        let buf: &'static u64 = unsafe { &*payload };
        let request = world.process_at_rank(dest as i32)
            .immediate_send_with_tag(StaticScope, buf, tag.code());
        Self { request, payload }
    }

    /// Return `None` if the send has completed, freeing its payload.
    fn test(self) -> Option<Self> {
        let Self { request, payload } = self;
        match request.test() {
            Ok(_) => {
                Self::release(payload);
                None
            },
            Err(request) => Some(Self { request, payload }),
        }
    }

    fn wait(self) {
        let Self { request, payload } = self;
        request.wait();
        Self::release(payload);
    }

    fn release(payload: *mut u64) {
        // SAFETY: `payload` came from `Box::into_raw` in `post` and its only
        // reader, the completed request, is gone.
        drop(unsafe { Box::from_raw(payload) });
    }
}

/// The MPI world communicator. MPI is finalized when this is dropped.
pub struct MpiComm {
    outgoing: RefCell<Vec<Outgoing>>,
    world: SimpleCommunicator,
    _universe: Universe,
}

impl MpiComm {
    /// Initialize MPI and wrap its world communicator.
    pub fn init() -> DispatchResult<Self> {
        let universe = mpi::initialize()
            .ok_or_else(|| DispatchError::Transport(
                "MPI was already initialized".to_string()))?;
        let world = universe.world();
        Ok(Self { outgoing: RefCell::new(Vec::new()), world, _universe: universe })
    }

    /// Number of sends not yet known to have completed.
    pub fn in_flight(&self) -> usize { self.outgoing.borrow().len() }

    fn reap(&self) {
        let mut outgoing = self.outgoing.borrow_mut();
        let still: Vec<Outgoing>
            = outgoing.drain(..).filter_map(Outgoing::test).collect();
        *outgoing = still;
    }

    fn complete_all(&self) {
        self.outgoing.borrow_mut().drain(..).for_each(Outgoing::wait);
    }

    fn probe(&self, tags: &[Tag]) -> Option<Envelope> {
        tags.iter().find_map(|tag| {
            self.world.any_process()
                .immediate_matched_probe_with_tag(tag.code())
                .map(|(msg, _)| {
                    let (payload, status) = msg.matched_receive::<u64>();
                    Envelope {
                        source: status.source_rank() as usize,
                        tag: *tag,
                        payload,
                    }
                })
        })
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize { self.world.rank() as usize }

    fn size(&self) -> usize { self.world.size() as usize }

    fn send(&self, dest: usize, tag: Tag, payload: u64) -> DispatchResult<()> {
        if dest >= self.size() {
            return Err(DispatchError::NoSuchRank(dest, self.size()));
        }
        let out = Outgoing::post(&self.world, dest, tag, payload);
        self.outgoing.borrow_mut().push(out);
        Ok(())
    }

    fn try_receive_any(&self, tags: &[Tag]) -> DispatchResult<Option<Envelope>> {
        self.reap();
        Ok(self.probe(tags))
    }

    fn receive_any(&self, tags: &[Tag]) -> DispatchResult<Envelope> {
        loop {
            self.reap();
            if let Some(env) = self.probe(tags) { return Ok(env); }
            std::thread::yield_now();
        }
    }

    fn broadcast(&self, root: usize, data: &mut Vec<f64>) -> DispatchResult<()> {
        if root >= self.size() {
            return Err(DispatchError::NoSuchRank(root, self.size()));
        }
        let root_process = self.world.process_at_rank(root as i32);
        let mut len = data.len() as u64;
        root_process.broadcast_into(&mut len);
        data.resize(len as usize, 0.0);
        root_process.broadcast_into(&mut data[..]);
        Ok(())
    }

    fn barrier(&self) -> DispatchResult<()> {
        self.complete_all();
        self.world.barrier();
        Ok(())
    }
}

impl Drop for MpiComm {
    fn drop(&mut self) { self.complete_all(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_sends_do_not_block() {
        let comm = MpiComm::init().unwrap();
        let me = comm.rank();
        for j in 0..64 {
            comm.send(me, Tag::Work, j).unwrap();
        }
        comm.send(me, Tag::Finish, 0).unwrap();
        for j in 0..64 {
            let env = comm.receive_any(&[Tag::Work]).unwrap();
            assert_eq!(env, Envelope { source: me, tag: Tag::Work, payload: j });
        }
        let env = comm.receive_any(&[Tag::Finish]).unwrap();
        assert_eq!(env.tag, Tag::Finish);
        comm.barrier().unwrap();
        assert_eq!(comm.in_flight(), 0);
    }
}
