//! RTP dejitter buffer (spec §3 "Dejitter", §4.5).
//!
//! Ported bit-for-bit from `libs/yrtp/dejitter.cpp`'s `RTPDejitter`: an
//! ordered queue of packets each carrying a computed delivery time, a
//! smoothed samples-per-microsecond estimate that starts reacting fast
//! (`fastRate` counts down 10 packets using a `(7*old+new)>>3` blend) then
//! settles into a slower `(31*old+new)>>5` blend, and a `timerTick` that
//! delivers at most one packet per call while dropping anything that fell
//! too far behind.

use std::collections::VecDeque;

/// Clamped construction bounds, straight from the original constructor.
const MAX_DELAY_CEILING_US: u64 = 1_000_000;
const MAX_DELAY_FLOOR_US: u64 = 50_000;
const MIN_DELAY_FLOOR_US: u64 = 5_000;
const MIN_DELAY_MARGIN_US: u64 = 30_000;

const RATE_CEILING: i64 = 150_000;
const RATE_FLOOR: i64 = 20_000;
const DEFAULT_RATE: i64 = 125_000;
const INITIAL_FAST_RATE: u32 = 10;

#[derive(Clone, Debug)]
pub struct Packet {
    pub marker: bool,
    pub payload: u8,
    pub timestamp: u32,
    pub data: Vec<u8>,
}

struct Delayed {
    scheduled: u64,
    packet: Packet,
}

/// Smooths out network jitter by holding packets until a computed delivery
/// time, reordering late arrivals within the buffer, and dropping packets
/// that are too old or too far in the future to usefully deliver.
pub struct Dejitter {
    min_delay: u64,
    max_delay: u64,
    head_stamp: u32,
    tail_stamp: u32,
    head_time: u64,
    samp_rate: i64,
    fast_rate: u32,
    packets: VecDeque<Delayed>,
}

/// Outcome of a `receive` call, matching the original's boolean return but
/// spelled out for callers that want to log or count each case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Enqueued,
    Duplicate,
    DroppedStale,
    DroppedTooLate,
}

impl ReceiveOutcome {
    pub fn accepted(self) -> bool {
        !matches!(self, ReceiveOutcome::DroppedStale | ReceiveOutcome::DroppedTooLate)
    }
}

impl Dejitter {
    pub fn new(min_delay_us: u64, max_delay_us: u64) -> Self {
        let mut max_delay = max_delay_us.min(MAX_DELAY_CEILING_US).max(MAX_DELAY_FLOOR_US);
        let mut min_delay = min_delay_us.max(MIN_DELAY_FLOOR_US);
        if min_delay > max_delay.saturating_sub(MIN_DELAY_MARGIN_US) {
            min_delay = max_delay.saturating_sub(MIN_DELAY_MARGIN_US);
        }
        if max_delay < min_delay {
            max_delay = min_delay;
        }
        Self {
            min_delay,
            max_delay,
            head_stamp: 0,
            tail_stamp: 0,
            head_time: 0,
            samp_rate: DEFAULT_RATE,
            fast_rate: INITIAL_FAST_RATE,
            packets: VecDeque::new(),
        }
    }

    pub fn clear(&mut self) {
        self.packets.clear();
        self.head_stamp = 0;
        self.tail_stamp = 0;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Accepts or rejects an incoming RTP packet, scheduling its delivery
    /// time against the smoothed sample rate estimate. `now` is
    /// microseconds on the same clock as [`pbx_core::time::now_us`].
    pub fn receive(&mut self, marker: bool, payload: u8, timestamp: u32, data: Vec<u8>, now: u64) -> ReceiveOutcome {
        let when: u64;
        let mut insert = false;

        if self.head_stamp != 0 {
            let d_ts = timestamp.wrapping_sub(self.head_stamp) as i32;
            if d_ts == 0 {
                return ReceiveOutcome::Duplicate;
            }
            if d_ts < 0 {
                return ReceiveOutcome::DroppedStale;
            }
            let elapsed = now.saturating_sub(self.head_time);
            let mut rate = 1000i64 * elapsed as i64 / d_ts as i64;
            if rate > 0 {
                if self.fast_rate > 0 {
                    self.fast_rate -= 1;
                    rate = (7 * self.samp_rate + rate) >> 3;
                } else {
                    rate = (31 * self.samp_rate + rate) >> 5;
                }
                rate = rate.clamp(RATE_FLOOR, RATE_CEILING);
                self.samp_rate = rate;
            } else {
                rate = self.samp_rate;
            }
            when = if rate > 0 {
                self.head_time + (d_ts as u64 * rate as u64 / 1000) + self.min_delay
            } else {
                now + self.min_delay
            };
            if self.tail_stamp != 0 {
                if timestamp == self.tail_stamp {
                    return ReceiveOutcome::Duplicate;
                }
                if (timestamp.wrapping_sub(self.tail_stamp) as i32) < 0 {
                    insert = true;
                } else if when > now + self.max_delay {
                    return ReceiveOutcome::DroppedTooLate;
                }
            }
        } else {
            if self.tail_stamp != 0 && (timestamp.wrapping_sub(self.tail_stamp) as i32) < 0 {
                return ReceiveOutcome::DroppedStale;
            }
            when = now + self.min_delay;
        }

        if insert {
            let mut idx = None;
            for (i, entry) in self.packets.iter().enumerate() {
                if entry.packet.timestamp == timestamp {
                    return ReceiveOutcome::Duplicate;
                }
                if (entry.packet.timestamp.wrapping_sub(timestamp) as i32) > 0 && entry.scheduled > when {
                    idx = Some(i);
                    break;
                }
            }
            if let Some(i) = idx {
                self.packets.insert(i, Delayed { scheduled: when, packet: Packet { marker, payload, timestamp, data } });
                return ReceiveOutcome::Enqueued;
            }
        }

        self.tail_stamp = timestamp;
        self.packets.push_back(Delayed { scheduled: when, packet: Packet { marker, payload, timestamp, data } });
        ReceiveOutcome::Enqueued
    }

    /// Delivers at most one due packet and drops any packets that fell too
    /// far behind schedule. Returns the delivered packet, if any, and how
    /// many stale packets were dropped in the same call.
    pub fn timer_tick(&mut self, now: u64) -> (Option<Packet>, u32) {
        let Some(front) = self.packets.front() else {
            self.tail_stamp = 0;
            if self.head_stamp != 0 && self.head_time + self.max_delay < now {
                self.head_stamp = 0;
            }
            return (None, 0);
        };
        if front.scheduled > now {
            return (None, 0);
        }
        let delivered = self.packets.pop_front().unwrap();
        self.head_stamp = delivered.packet.timestamp;
        self.head_time = delivered.scheduled;

        let mut dropped = 0u32;
        while let Some(next) = self.packets.front() {
            let delayed = now as i64 - next.scheduled as i64;
            if delayed <= 0 || delayed <= self.min_delay as i64 {
                break;
            }
            self.packets.pop_front();
            dropped += 1;
        }
        (Some(delivered.packet), dropped)
    }
}
