//! Priority scheduler for the transmit radio
//!
//! Three bounded FIFOs, drained in strict priority order behind a single
//! pacing gate shared by every class. Background traffic may starve under
//! sustained normal load.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use log::{debug, warn};

use splitlink_core::{packet, RadioAddress, RoutingTable, TrafficClass};

use crate::stats::{QueueDepths, SchedulerStats};
use crate::{wire, RadioConfig, RadioError};

/// A frame ready for `AT+SEND`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub dest: RadioAddress,
    pub wire: String,
    pub original_len: usize,
    pub class: TrafficClass,
}

pub struct RadioScheduler {
    config: RadioConfig,
    routes: RoutingTable,
    urgent: VecDeque<QueueEntry>,
    normal: VecDeque<QueueEntry>,
    background: VecDeque<QueueEntry>,
    stats: SchedulerStats,
}

impl RadioScheduler {
    pub fn new(config: RadioConfig, routes: RoutingTable) -> Self {
        Self {
            urgent: VecDeque::with_capacity(config.urgent_capacity),
            normal: VecDeque::with_capacity(config.normal_capacity),
            background: VecDeque::with_capacity(config.background_capacity),
            config,
            routes,
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Classify `frame` and queue it for transmission.
    ///
    /// A full urgent queue borrows a slot from the normal queue by evicting
    /// its oldest entry. Full normal and background queues drop the incoming
    /// frame.
    pub fn enqueue(&mut self, frame: &[u8]) -> Result<TrafficClass, RadioError> {
        let limit = self.config.raw_limit();
        if frame.len() > limit {
            self.stats.dropped_oversize += 1;
            warn!("DROP oversize {} > {}", frame.len(), limit);
            return Err(RadioError::OversizeFrame { len: frame.len(), limit });
        }

        let dest = self.routes.resolve(frame);
        let wire = wire::encode(&self.config.wire_prefix, frame);
        if wire.len() > self.config.max_ascii {
            self.stats.dropped_oversize += 1;
            warn!("DROP ascii too long {} > {}", wire.len(), self.config.max_ascii);
            return Err(RadioError::OversizeWireText {
                len: wire.len(),
                max: self.config.max_ascii,
            });
        }

        let class = packet::classify(frame);
        let entry = QueueEntry {
            dest,
            wire,
            original_len: frame.len(),
            class,
        };

        let admitted = match class {
            TrafficClass::Urgent => self.push_urgent(entry),
            TrafficClass::Normal => {
                let capacity = self.normal_capacity();
                push_bounded(&mut self.normal, capacity, entry)
            }
            TrafficClass::Background => {
                push_bounded(&mut self.background, self.config.background_capacity, entry)
            }
        };

        if !admitted {
            self.stats.dropped_full += 1;
            warn!("DROP {} full len={}", class, frame.len());
            return Err(RadioError::QueueFull { class });
        }

        self.stats.frames_queued += 1;
        debug!("ENQ {} len={} dest={}", class, frame.len(), dest);
        Ok(class)
    }

    /// Pop the next entry if the pacing gate is open.
    pub fn drain_one(
        &mut self,
        now: Instant,
        min_interval: Duration,
        last_send: Option<Instant>,
    ) -> Option<QueueEntry> {
        if let Some(last) = last_send {
            if now.saturating_duration_since(last) < min_interval {
                return None;
            }
        }

        let entry = self
            .urgent
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.background.pop_front());
        if entry.is_none() {
            self.stats.idle_cycles += 1;
        }
        entry
    }

    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            urgent: self.urgent.len(),
            normal: self.normal.len(),
            background: self.background.len(),
        }
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    fn push_urgent(&mut self, entry: QueueEntry) -> bool {
        if self.urgent.len() < self.config.urgent_capacity {
            self.urgent.push_back(entry);
            return true;
        }
        match self.normal.pop_front() {
            Some(evicted) => {
                self.stats.evicted += 1;
                warn!(
                    "urgent queue full, evicted normal entry len={} dest={}",
                    evicted.original_len, evicted.dest
                );
                self.urgent.push_back(entry);
                true
            }
            None => false,
        }
    }

    /// Urgent entries held beyond their own capacity occupy normal slots.
    fn normal_capacity(&self) -> usize {
        let borrowed = self.urgent.len().saturating_sub(self.config.urgent_capacity);
        self.config.normal_capacity.saturating_sub(borrowed)
    }
}

fn push_bounded(queue: &mut VecDeque<QueueEntry>, capacity: usize, entry: QueueEntry) -> bool {
    if queue.len() >= capacity {
        return false;
    }
    queue.push_back(entry);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4(protocol: u8, dst: u8, payload: &[u8]) -> Vec<u8> {
        let total = 20 + payload.len();
        let mut p = vec![0x45, 0x00];
        p.extend_from_slice(&(total as u16).to_be_bytes());
        p.extend_from_slice(&[0x00, 0x01, 0x40, 0x00, 64, protocol, 0x00, 0x00]);
        p.extend_from_slice(&[10, 10, 10, 1, 10, 10, 10, dst]);
        p.extend_from_slice(payload);
        p
    }

    fn tcp(flags: u8, data: &[u8]) -> Vec<u8> {
        let mut t = vec![0x30, 0x39, 0x00, 0x50, 0, 0, 0, 1, 0, 0, 0, 1, 5 << 4, flags];
        t.extend_from_slice(&[0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]);
        t.extend_from_slice(data);
        t
    }

    fn ack() -> Vec<u8> {
        ipv4(6, 2, &tcp(0x10, &[]))
    }

    fn data(tag: u8) -> Vec<u8> {
        ipv4(6, 2, &tcp(0x18, &[tag; 8]))
    }

    fn ping() -> Vec<u8> {
        ipv4(1, 2, &[8, 0, 0, 0, 0, 1, 0, 1])
    }

    fn scheduler() -> RadioScheduler {
        let routes = RoutingTable::new(1).with_route("10.10.10.3".parse().unwrap(), 3);
        RadioScheduler::new(RadioConfig::default(), routes)
    }

    fn small_scheduler() -> RadioScheduler {
        let config = RadioConfig {
            urgent_capacity: 2,
            normal_capacity: 2,
            background_capacity: 1,
            ..Default::default()
        };
        RadioScheduler::new(config, RoutingTable::new(1))
    }

    fn drain_all(s: &mut RadioScheduler) -> Vec<QueueEntry> {
        std::iter::from_fn(|| s.drain_one(Instant::now(), Duration::ZERO, None)).collect()
    }

    #[test]
    fn test_priority_order() {
        let mut s = scheduler();
        let interval = Duration::from_millis(1300);
        assert_eq!(s.enqueue(&ping()).unwrap(), TrafficClass::Background);
        assert_eq!(s.enqueue(&data(1)).unwrap(), TrafficClass::Normal);
        assert_eq!(s.enqueue(&ack()).unwrap(), TrafficClass::Urgent);

        let t0 = Instant::now();
        let first = s.drain_one(t0, interval, None).unwrap();
        let t1 = t0 + interval;
        let second = s.drain_one(t1, interval, Some(t0)).unwrap();
        let t2 = t1 + interval;
        let third = s.drain_one(t2, interval, Some(t1)).unwrap();

        assert_eq!(first.class, TrafficClass::Urgent);
        assert_eq!(second.class, TrafficClass::Normal);
        assert_eq!(third.class, TrafficClass::Background);
        assert!(s.drain_one(t2 + interval, interval, Some(t2)).is_none());
        assert_eq!(s.stats().idle_cycles, 1);
    }

    #[test]
    fn test_pacing_gate() {
        let mut s = scheduler();
        let interval = Duration::from_millis(1300);
        s.enqueue(&data(1)).unwrap();
        s.enqueue(&data(2)).unwrap();

        let t0 = Instant::now();
        assert!(s.drain_one(t0, interval, None).is_some());
        assert!(s.drain_one(t0 + Duration::from_millis(500), interval, Some(t0)).is_none());
        assert_eq!(s.depths().normal, 1);
        // a closed gate is not an idle cycle
        assert_eq!(s.stats().idle_cycles, 0);
        assert!(s.drain_one(t0 + interval, interval, Some(t0)).is_some());
    }

    #[test]
    fn test_fifo_within_class() {
        let mut s = scheduler();
        for tag in 0..5 {
            s.enqueue(&data(tag)).unwrap();
        }
        let expected: Vec<String> = (0..5).map(|t| wire::encode("B:", &data(t))).collect();
        let got: Vec<String> = drain_all(&mut s).into_iter().map(|e| e.wire).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_urgent_overflow_evicts_oldest_normal() {
        let mut s = small_scheduler();
        s.enqueue(&data(1)).unwrap();
        s.enqueue(&data(2)).unwrap();
        s.enqueue(&ack()).unwrap();
        s.enqueue(&ack()).unwrap();

        assert_eq!(s.enqueue(&ack()).unwrap(), TrafficClass::Urgent);
        assert_eq!(s.stats().evicted, 1);
        assert_eq!(
            s.depths(),
            QueueDepths { urgent: 3, normal: 1, background: 0 }
        );

        let drained = drain_all(&mut s);
        assert_eq!(drained.len(), 4);
        assert_eq!(drained[3].wire, wire::encode("B:", &data(2)));
    }

    #[test]
    fn test_borrowed_slot_shrinks_normal() {
        let mut s = small_scheduler();
        s.enqueue(&data(1)).unwrap();
        s.enqueue(&ack()).unwrap();
        s.enqueue(&ack()).unwrap();
        s.enqueue(&ack()).unwrap();

        // one normal slot is lent to urgent traffic
        assert_eq!(s.depths().normal, 0);
        s.enqueue(&data(2)).unwrap();
        assert_eq!(
            s.enqueue(&data(3)),
            Err(RadioError::QueueFull { class: TrafficClass::Normal })
        );
    }

    #[test]
    fn test_urgent_overflow_without_normal_drops_incoming() {
        let mut s = small_scheduler();
        s.enqueue(&ack()).unwrap();
        s.enqueue(&ack()).unwrap();
        assert_eq!(
            s.enqueue(&ack()),
            Err(RadioError::QueueFull { class: TrafficClass::Urgent })
        );
        assert_eq!(s.depths().urgent, 2);
        assert_eq!(s.stats().dropped_full, 1);
    }

    #[test]
    fn test_normal_overflow_keeps_contents() {
        let mut s = small_scheduler();
        s.enqueue(&data(1)).unwrap();
        s.enqueue(&data(2)).unwrap();
        assert_eq!(
            s.enqueue(&data(3)),
            Err(RadioError::QueueFull { class: TrafficClass::Normal })
        );

        let got: Vec<String> = drain_all(&mut s).into_iter().map(|e| e.wire).collect();
        assert_eq!(got, vec![wire::encode("B:", &data(1)), wire::encode("B:", &data(2))]);
    }

    #[test]
    fn test_background_overflow_drops_incoming() {
        let mut s = small_scheduler();
        s.enqueue(&ping()).unwrap();
        assert!(s.enqueue(&ping()).is_err());
        assert_eq!(s.depths().background, 1);
    }

    #[test]
    fn test_oversize_rejected() {
        let mut s = scheduler();
        let limit = s.config().raw_limit();
        let frame = vec![0u8; limit + 1];
        assert_eq!(
            s.enqueue(&frame),
            Err(RadioError::OversizeFrame { len: limit + 1, limit })
        );
        assert_eq!(s.depths().total(), 0);
        assert_eq!(s.stats().dropped_oversize, 1);

        assert!(s.enqueue(&vec![0u8; limit]).is_ok());
    }

    #[test]
    fn test_wire_text_limit() {
        let config = RadioConfig {
            max_ascii: 220,
            host_mtu: 200,
            ..Default::default()
        };
        let mut s = RadioScheduler::new(config, RoutingTable::new(1));
        // 163 bytes passes the raw limit but encodes to 222 chars
        assert_eq!(
            s.enqueue(&vec![0u8; 163]),
            Err(RadioError::OversizeWireText { len: 222, max: 220 })
        );
    }

    #[test]
    fn test_destination_routing() {
        let mut s = scheduler();
        s.enqueue(&ipv4(17, 3, &[0; 8])).unwrap();
        s.enqueue(&ipv4(17, 7, &[0; 8])).unwrap();
        let dests: Vec<RadioAddress> = drain_all(&mut s).into_iter().map(|e| e.dest).collect();
        assert_eq!(dests, vec![3, 1]);
    }
}
