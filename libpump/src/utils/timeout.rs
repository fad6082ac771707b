// libpump-rs/libpump/src/utils/timeout.rs

//! Timeout arithmetic for radio exchanges and the clock used by sessions.
//!
//! A send/listen exchange is given one end-to-end deadline, computed before
//! the first transmission and never recomputed while retries are running.

use chrono::{DateTime, Utc};

/// Radio data rate of the bridge in bits per second.
pub const RADIO_BITS_PER_SECOND: f64 = 16_384.0;

/// Minimum gap the bridge inserts between repeated packets.
pub const MIN_MS_BETWEEN_PACKETS: u32 = 12;

/// Latency budget for the host <-> bridge link on top of the air time.
pub const BRIDGE_LATENCY_MS: u64 = 1500;

/// Air time in milliseconds for one 4b6b-coded packet of `frame_len` bytes.
pub fn packet_air_time_ms(frame_len: usize) -> f64 {
    (frame_len * 8) as f64 * 6.0 / 4.0 / RADIO_BITS_PER_SECOND * 1000.0
}

/// Total deadline for a send/listen exchange.
///
/// `(retry + 1) * (repeat * (air time + gap) + listen window) + bridge latency`
pub fn send_and_listen_timeout_ms(
    frame_len: usize,
    listen_timeout_ms: u32,
    repeat_count: u8,
    ms_between_packets: u32,
    retry_count: u8,
) -> u64 {
    let repeats = f64::from(repeat_count.max(1));
    let gap = f64::from(ms_between_packets.max(MIN_MS_BETWEEN_PACKETS));
    let send_time = repeats * (packet_air_time_ms(frame_len) + gap);
    let per_attempt = send_time + f64::from(listen_timeout_ms);
    let attempts = f64::from(retry_count) + 1.0;
    (attempts * per_attempt).ceil() as u64 + BRIDGE_LATENCY_MS
}

/// Source of wall-clock time for session logic.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_time_scales_with_length() {
        // 8 bytes -> 96 coded bits -> ~5.86 ms at 16 kbps
        let t = packet_air_time_ms(8);
        assert!((t - 5.859375).abs() < 1e-9);
        assert!(packet_air_time_ms(71) > packet_air_time_ms(8));
    }

    #[test]
    fn single_exchange_deadline() {
        // one attempt: 1 * (5.86 + 12) + 180, plus latency
        let t = send_and_listen_timeout_ms(8, 180, 0, 0, 0);
        assert_eq!(t, 198 + BRIDGE_LATENCY_MS);
    }

    #[test]
    fn retries_multiply_the_window() {
        let once = send_and_listen_timeout_ms(8, 180, 1, 0, 0) - BRIDGE_LATENCY_MS;
        let four = send_and_listen_timeout_ms(8, 180, 1, 0, 3) - BRIDGE_LATENCY_MS;
        assert!(four >= once * 4 - 1 && four <= once * 4);
    }

    #[test]
    fn system_clock_moves_forward() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
