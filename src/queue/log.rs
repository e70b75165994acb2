// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, VecDeque};

use crate::errors::QueueError;
use crate::event::Event;
use crate::traits::{Ack, Delivery};

/// Stable partition for `key` across processes and restarts (FNV-1a).
pub fn partition_for(key: &str, partitions: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % partitions.max(1) as u64) as usize
}

#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub offset: u64,
    pub partition: usize,
    pub key: String,
    pub attempt: u32,
    pub event: Event,
}

/// In-memory state of a partitioned log.
///
/// A partition with a record in flight is blocked until that record is acked
/// or nacked, which keeps delivery FIFO per partition key.
#[derive(Debug)]
pub(crate) struct PartitionLog {
    ready: Vec<VecDeque<Record>>,
    in_flight: HashMap<usize, Record>,
    next_offset: u64,
    cursor: usize,
}

impl PartitionLog {
    pub fn new(partitions: usize) -> Self {
        Self {
            ready: (0..partitions.max(1)).map(|_| VecDeque::new()).collect(),
            in_flight: HashMap::new(),
            next_offset: 0,
            cursor: 0,
        }
    }

    /// Reserve the next offset and the partition for `key`.
    pub fn assign(&mut self, key: &str) -> Ack {
        let ack = Ack {
            partition: partition_for(key, self.ready.len()),
            offset: self.next_offset,
        };
        self.next_offset += 1;
        ack
    }

    /// Account for a record that is already committed and never redelivered.
    pub fn skip(&mut self, offset: u64) {
        self.next_offset = self.next_offset.max(offset + 1);
    }

    pub fn push(&mut self, record: Record) {
        self.next_offset = self.next_offset.max(record.offset + 1);
        let partition = record.partition.min(self.ready.len() - 1);
        self.ready[partition].push_back(record);
    }

    /// Next deliverable record, rotating across partitions.
    pub fn take(&mut self) -> Option<Delivery> {
        let count = self.ready.len();
        for step in 0..count {
            let partition = (self.cursor + step) % count;
            if self.in_flight.contains_key(&partition) {
                continue;
            }
            if let Some(mut record) = self.ready[partition].pop_front() {
                record.attempt += 1;
                self.cursor = (partition + 1) % count;
                let delivery = Delivery {
                    key: record.key.clone(),
                    partition,
                    offset: record.offset,
                    attempt: record.attempt,
                    event: record.event.clone(),
                };
                self.in_flight.insert(partition, record);
                return Some(delivery);
            }
        }
        None
    }

    pub fn ack(&mut self, queue: &str, delivery: &Delivery) -> Result<(), QueueError> {
        self.settle(queue, delivery).map(|_| ())
    }

    pub fn nack(&mut self, queue: &str, delivery: &Delivery) -> Result<(), QueueError> {
        let record = self.settle(queue, delivery)?;
        self.ready[delivery.partition].push_front(record);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.ready.iter().map(VecDeque::len).sum::<usize>() + self.in_flight.len()
    }

    fn settle(&mut self, queue: &str, delivery: &Delivery) -> Result<Record, QueueError> {
        match self.in_flight.remove(&delivery.partition) {
            Some(record) if record.offset == delivery.offset => Ok(record),
            other => {
                if let Some(record) = other {
                    self.in_flight.insert(delivery.partition, record);
                }
                Err(QueueError::UnknownDelivery {
                    queue: queue.to_string(),
                    offset: delivery.offset,
                })
            }
        }
    }
}
