//! In-process communicator: each rank is a handle to one end of a set of
//! channels, usually moved onto its own thread.

use std::{
    cell::RefCell,
    collections::VecDeque,
    sync::{ Arc, Barrier },
};
use crossbeam_channel::{ self as channel, Receiver, Sender, TryRecvError };
use super::{ Communicator, DispatchError, DispatchResult, Envelope, Tag };

#[derive(Clone, Debug)]
enum Message {
    Control(Envelope),
    Data { source: usize, data: Vec<f64> },
}

/// One rank of an in-process world.
///
/// Messages from any one sender arrive in the order they were sent; messages
/// not matching the current receive are held back until asked for.
#[derive(Debug)]
pub struct LocalComm {
    rank: usize,
    senders: Vec<Sender<Message>>,
    receiver: Receiver<Message>,
    stash: RefCell<VecDeque<Message>>,
    barrier: Arc<Barrier>,
}

impl LocalComm {
    /// Create all ranks of a world of `size` ranks, in rank order.
    ///
    /// *Panics* if `size` is zero.
    pub fn world(size: usize) -> Vec<Self> {
        assert!(size > 0, "a world needs at least one rank");
        let (senders, receivers): (Vec<Sender<Message>>, Vec<Receiver<Message>>)
            = (0..size).map(|_| channel::unbounded()).unzip();
        let barrier = Arc::new(Barrier::new(size));
        receivers.into_iter().enumerate()
            .map(|(rank, receiver)| Self {
                rank,
                senders: senders.clone(),
                receiver,
                stash: RefCell::new(VecDeque::new()),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }

    fn post(&self, dest: usize, msg: Message) -> DispatchResult<()> {
        self.senders.get(dest)
            .ok_or(DispatchError::NoSuchRank(dest, self.senders.len()))?
            .send(msg)
            .map_err(|_| DispatchError::Disconnected(dest))
    }

    fn take_stashed<P>(&self, pred: P) -> Option<Message>
    where P: Fn(&Message) -> bool
    {
        let mut stash = self.stash.borrow_mut();
        let k = stash.iter().position(pred)?;
        stash.remove(k)
    }

    fn next(&self, block: bool) -> DispatchResult<Option<Message>> {
        if block {
            self.receiver.recv()
                .map(Some)
                .map_err(|_| DispatchError::Disconnected(self.rank))
        } else {
            match self.receiver.try_recv() {
                Ok(msg) => Ok(Some(msg)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected)
                    => Err(DispatchError::Disconnected(self.rank)),
            }
        }
    }

    fn receive_where<P>(&self, pred: P, block: bool)
        -> DispatchResult<Option<Message>>
    where P: Fn(&Message) -> bool
    {
        if let Some(msg) = self.take_stashed(&pred) { return Ok(Some(msg)); }
        while let Some(msg) = self.next(block)? {
            if pred(&msg) { return Ok(Some(msg)); }
            self.stash.borrow_mut().push_back(msg);
        }
        Ok(None)
    }
}

fn control_with(tags: &[Tag]) -> impl Fn(&Message) -> bool + '_ {
    move |msg| matches!(msg, Message::Control(env) if tags.contains(&env.tag))
}

fn unwrap_control(msg: Message) -> DispatchResult<Envelope> {
    match msg {
        Message::Control(env) => Ok(env),
        Message::Data { source, .. }
            => Err(DispatchError::Unexpected { tag: Tag::Broadcast, rank: source }),
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize { self.rank }

    fn size(&self) -> usize { self.senders.len() }

    fn send(&self, dest: usize, tag: Tag, payload: u64) -> DispatchResult<()> {
        self.post(dest, Message::Control(Envelope { source: self.rank, tag, payload }))
    }

    fn try_receive_any(&self, tags: &[Tag]) -> DispatchResult<Option<Envelope>> {
        self.receive_where(control_with(tags), false)?
            .map(unwrap_control)
            .transpose()
    }

    fn receive_any(&self, tags: &[Tag]) -> DispatchResult<Envelope> {
        self.receive_where(control_with(tags), true)?
            .ok_or(DispatchError::Disconnected(self.rank))
            .and_then(unwrap_control)
    }

    fn broadcast(&self, root: usize, data: &mut Vec<f64>) -> DispatchResult<()> {
        if root >= self.size() {
            return Err(DispatchError::NoSuchRank(root, self.size()));
        }
        if self.rank == root {
            for dest in (0..self.size()).filter(|r| *r != root) {
                self.post(dest, Message::Data { source: root, data: data.clone() })?;
            }
            return Ok(());
        }
        let from_root = |msg: &Message| {
            matches!(msg, Message::Data { source, .. } if *source == root)
        };
        match self.receive_where(from_root, true)? {
            Some(Message::Data { data: received, .. }) => {
                *data = received;
                Ok(())
            },
            _ => Err(DispatchError::Disconnected(self.rank)),
        }
    }

    fn barrier(&self) -> DispatchResult<()> {
        self.barrier.wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selective_receive() {
        let mut world = LocalComm::world(2);
        let b = world.pop().unwrap();
        let a = world.pop().unwrap();
        a.send(1, Tag::Pending, 7).unwrap();
        a.send(1, Tag::Work, 3).unwrap();
        assert_eq!(b.try_receive_any(&[Tag::Finish]).unwrap(), None);
        let env = b.receive_any(&[Tag::Work]).unwrap();
        assert_eq!(env, Envelope { source: 0, tag: Tag::Work, payload: 3 });
        let env = b.try_receive_any(&[Tag::Pending, Tag::Work]).unwrap().unwrap();
        assert_eq!(env.payload, 7);
        assert!(a.send(2, Tag::Work, 0).is_err());
    }

    #[test]
    fn broadcast_from_root() {
        let handles: Vec<_>
            = LocalComm::world(3).into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let mut data: Vec<f64>
                        = if comm.rank() == 1 { vec![1.5, -2.0] } else { vec![] };
                    comm.broadcast(1, &mut data).unwrap();
                    comm.barrier().unwrap();
                    data
                })
            })
            .collect();
        for h in handles.into_iter() {
            assert_eq!(h.join().unwrap(), vec![1.5, -2.0]);
        }
    }
}
