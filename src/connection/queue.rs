//! Per-connection packet queue

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

use crate::types::{DataPacket, Packet};

/// Samples waiting in a queue, split at the first event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    /// Data samples queued before the first event packet
    pub samples_before_event: usize,
    /// Whether an event packet is queued
    pub event_pending: bool,
    /// Data samples queued in total, across events
    pub total_samples: usize,
}

impl QueueSummary {
    pub fn of<'a>(packets: impl IntoIterator<Item = &'a Packet>) -> Self {
        let mut summary = QueueSummary::default();
        for packet in packets {
            match packet {
                Packet::Event(_) => summary.event_pending = true,
                Packet::Data(data) => {
                    if !summary.event_pending {
                        summary.samples_before_event += data.sample_count;
                    }
                    summary.total_samples += data.sample_count;
                }
            }
        }
        summary
    }
}

/// FIFO of packets between one signal and one reader.
///
/// Safe for any number of producers and one consuming reader. Consumers can block on
/// [`wait_until`](Self::wait_until) instead of polling.
#[derive(Debug, Default)]
pub struct ConnectionQueue {
    packets: Mutex<VecDeque<Packet>>,
    changed: Condvar,
}

impl ConnectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, packet: Packet) {
        let mut packets = self.packets.lock();
        trace!(queued = packets.len(), samples = packet.sample_count(), "enqueue packet");
        packets.push_back(packet);
        self.changed.notify_all();
    }

    pub fn try_dequeue(&self) -> Option<Packet> {
        self.packets.lock().pop_front()
    }

    pub fn peek(&self) -> Option<Packet> {
        self.packets.lock().front().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    /// Data packets queued ahead of the first event.
    pub fn data_before_event(&self) -> Vec<Arc<DataPacket>> {
        self.packets
            .lock()
            .iter()
            .map_while(|packet| match packet {
                Packet::Data(data) => Some(data.clone()),
                Packet::Event(_) => None,
            })
            .collect()
    }

    pub fn summary(&self) -> QueueSummary {
        QueueSummary::of(self.packets.lock().iter())
    }

    /// Block until `ready` holds for the queued packets or `deadline` passes.
    ///
    /// Returns the final value of `ready`.
    pub fn wait_until<F>(&self, deadline: Instant, mut ready: F) -> bool
    where
        F: FnMut(&VecDeque<Packet>) -> bool,
    {
        let mut packets = self.packets.lock();
        loop {
            if ready(&packets) {
                return true;
            }
            if self.changed.wait_until(&mut packets, deadline).timed_out() {
                return ready(&packets);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataDescriptor, DataPacket, EventPacket, SampleType};
    use std::sync::Arc;
    use std::time::Duration;

    fn data(count: usize) -> Packet {
        let descriptor = DataDescriptor::builder(SampleType::Int32).build().unwrap();
        DataPacket::from_samples(descriptor, &vec![0i32; count], None).unwrap().into()
    }

    #[test]
    fn fifo_order() {
        let queue = ConnectionQueue::new();
        queue.enqueue(data(1));
        queue.enqueue(EventPacket::new("X").into());
        assert_eq!(queue.len(), 2);
        assert!(!queue.try_dequeue().unwrap().is_event());
        assert!(queue.try_dequeue().unwrap().is_event());
        assert!(queue.is_empty());
    }

    #[test]
    fn summary_splits_at_first_event() {
        let queue = ConnectionQueue::new();
        queue.enqueue(data(3));
        queue.enqueue(data(2));
        queue.enqueue(EventPacket::new("X").into());
        queue.enqueue(data(7));
        assert_eq!(
            queue.summary(),
            QueueSummary { samples_before_event: 5, event_pending: true, total_samples: 12 }
        );
    }

    #[test]
    fn data_before_event_stops_at_first_event() {
        let queue = ConnectionQueue::new();
        queue.enqueue(data(3));
        queue.enqueue(EventPacket::new("X").into());
        queue.enqueue(data(7));
        let ahead = queue.data_before_event();
        assert_eq!(ahead.len(), 1);
        assert_eq!(ahead[0].sample_count, 3);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn wait_wakes_on_enqueue() {
        let queue = Arc::new(ConnectionQueue::new());
        let producer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.enqueue(data(4));
            })
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        let ready = |p: &VecDeque<Packet>| QueueSummary::of(p.iter()).samples_before_event >= 4;
        assert!(queue.wait_until(deadline, ready));
        producer.join().unwrap();
    }

    #[test]
    fn wait_times_out() {
        let queue = ConnectionQueue::new();
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(!queue.wait_until(deadline, |p| !p.is_empty()));
    }
}
