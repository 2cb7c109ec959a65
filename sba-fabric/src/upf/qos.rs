//! QoS enforcement: token-bucket rate limiting and 5QI priority queueing.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

/// Standardized 5QI → scheduling priority (TS 23.501 table 5.7.4-1, the
/// subset the fabric models). Lower number schedules first; unknown 5QIs
/// queue last.
pub fn priority_for_5qi(fiveqi: u8) -> u8 {
    match fiveqi {
        1 => 20,
        2 => 40,
        3 => 30,
        4 => 50,
        5 => 10,
        6 => 60,
        7 => 70,
        8 => 80,
        9 => 90,
        65 => 7,
        66 => 20,
        67 => 15,
        75 => 25,
        79 => 65,
        80 => 68,
        82 => 19,
        83 => 22,
        84 => 24,
        85 => 21,
        _ => 90,
    }
}

/// Classic token bucket over wall-clock time.
///
/// Holds up to `MBR/8` bytes and refills at `MBR/8` bytes per second; a
/// packet passes iff the bucket holds at least its size in tokens.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn from_mbr_bps(mbr_bps: u64, now: Instant) -> Self {
        let capacity = (mbr_bps / 8) as f64;

        TokenBucket {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity,
            last_refill: now,
        }
    }

    /// Change the rate in place (PFCP session modification); the fill level
    /// is clamped to the new capacity.
    pub fn reconfigure(&mut self, mbr_bps: u64) {
        let capacity = (mbr_bps / 8) as f64;
        self.capacity = capacity;
        self.refill_per_sec = capacity;
        if self.tokens > capacity {
            self.tokens = capacity;
        }
    }

    pub fn try_consume(&mut self, bytes: u64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        let cost = bytes as f64;
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub tunnel_id: String,
    pub size: usize,
}

/// Priority queues drained lowest-priority-number-first.
#[derive(Debug, Default)]
pub struct PriorityQueues {
    // Keyed (priority, tunnel) so iteration order is scheduling order.
    queues: BTreeMap<(u8, String), VecDeque<QueuedPacket>>,
}

impl PriorityQueues {
    // Per-queue bound; the scheduler is bookkeeping, not a real data path.
    const MAX_DEPTH: usize = 256;

    pub fn enqueue(&mut self, priority: u8, packet: QueuedPacket) {
        let queue = self
            .queues
            .entry((priority, packet.tunnel_id.clone()))
            .or_default();

        if queue.len() == Self::MAX_DEPTH {
            queue.pop_front();
        }
        queue.push_back(packet);
    }

    /// Pop the head of the most urgent non-empty queue.
    pub fn drain_next(&mut self) -> Option<QueuedPacket> {
        let key = self
            .queues
            .iter()
            .find(|(_, queue)| !queue.is_empty())
            .map(|(key, _)| key.clone())?;

        let packet = self.queues.get_mut(&key)?.pop_front();
        if self.queues.get(&key).is_some_and(VecDeque::is_empty) {
            self.queues.remove(&key);
        }

        packet
    }

    pub fn depth(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use super::*;

    #[test]
    fn bucket_admits_at_most_mbr_over_one_second() {
        let start = Instant::now();
        // 1 Mbit/s → 125 000 bytes of budget per second.
        let mut bucket = TokenBucket::from_mbr_bps(1_000_000, start);

        let mut accepted_bytes = 0u64;
        for i in 0..2_000u64 {
            // 2 000 packets of 1 000 bytes spread over one second.
            let now = start + Duration::from_micros(i * 500);
            if bucket.try_consume(1_000, now) {
                accepted_bytes += 1_000;
            }
        }

        // Initial burst (125 000) plus one second of refill, one packet slack.
        assert!(accepted_bytes <= 250_000 + 1_000, "accepted {accepted_bytes}");
        assert!(accepted_bytes >= 125_000);
    }

    #[test]
    fn bucket_refills_with_time() {
        let start = Instant::now();
        let mut bucket = TokenBucket::from_mbr_bps(8_000, start); // 1 000 bytes/s

        assert!(bucket.try_consume(1_000, start));
        assert!(!bucket.try_consume(1, start));

        let later = start + Duration::from_millis(500);
        assert!(bucket.try_consume(500, later));
        assert!(!bucket.try_consume(1, later));
    }

    #[test]
    fn unknown_5qi_maps_to_lowest_priority() {
        assert_eq!(priority_for_5qi(5), 10);
        assert_eq!(priority_for_5qi(9), 90);
        assert_eq!(priority_for_5qi(200), 90);
    }

    #[test]
    fn queues_drain_lowest_priority_number_first() {
        let mut queues = PriorityQueues::default();

        queues.enqueue(
            90,
            QueuedPacket {
                tunnel_id: "t1".to_owned(),
                size: 100,
            },
        );
        queues.enqueue(
            10,
            QueuedPacket {
                tunnel_id: "t2".to_owned(),
                size: 40,
            },
        );

        assert_eq!(queues.drain_next().unwrap().tunnel_id, "t2");
        assert_eq!(queues.drain_next().unwrap().tunnel_id, "t1");
        assert!(queues.drain_next().is_none());
    }
}
