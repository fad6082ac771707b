// libpump-rs/libpump/src/omnipod/nonce.rs

//! Pod nonce sequence.
//!
//! Every command that changes delivery carries a 32-bit nonce. Pod and host
//! derive the same sequence from the pod's lot and tid, so the host must
//! advance exactly once per accepted command. When the pod rejects a nonce it
//! returns a sync word from which both sides re-seed.

use crate::protocol::pod_crc16_table_entry;

const TABLE_LEN: usize = 21;
const LOT_SALT: u32 = 0x5554_3DC3;
const TID_SALT: u32 = 0xAAAA_E44E;

/// Deterministic nonce generator seeded from the pod's lot and tid.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NonceState {
    table: Vec<u32>,
    idx: u8,
}

impl NonceState {
    /// Nonce table for a pod, unseeded.
    pub fn new(lot: u32, tid: u32) -> Self {
        Self::with_seed(lot, tid, 0)
    }

    /// Seeded variant used after a resync.
    pub fn with_seed(lot: u32, tid: u32, seed: u8) -> Self {
        let mut table = vec![0u32; TABLE_LEN];
        table[0] = (lot & 0xffff)
            .wrapping_add(LOT_SALT)
            .wrapping_add(lot >> 16)
            .wrapping_add(u32::from(seed));
        table[1] = (tid & 0xffff)
            .wrapping_add(TID_SALT)
            .wrapping_add(tid >> 16);
        let mut state = Self { table, idx: 0 };
        for i in 0..16 {
            state.table[2 + i] = state.generate_entry();
        }
        state.idx = (state.table[0].wrapping_add(state.table[1]) & 0x0f) as u8;
        state
    }

    fn generate_entry(&mut self) -> u32 {
        self.table[0] = (self.table[0] >> 16).wrapping_add((self.table[0] & 0xffff).wrapping_mul(0x5D7F));
        self.table[1] = (self.table[1] >> 16).wrapping_add((self.table[1] & 0xffff).wrapping_mul(0x8CA0));
        self.table[1].wrapping_add(self.table[0] << 16)
    }

    /// The nonce the next authenticated command must carry.
    pub fn current(&self) -> u32 {
        self.table[2 + usize::from(self.idx)]
    }

    /// Step past the current nonce once the pod accepted it.
    pub fn advance(&mut self) {
        let nonce = self.current();
        self.table[2 + usize::from(self.idx)] = self.generate_entry();
        self.idx = (nonce & 0x0f) as u8;
    }

    /// Re-seed after the pod answered `sent_nonce` with a bad-nonce error.
    ///
    /// `message_sequence` is the sequence number of the rejected message.
    pub fn resync(lot: u32, tid: u32, sync_word: u16, sent_nonce: u32, message_sequence: u8) -> Self {
        let sum = (sent_nonce & 0xffff)
            .wrapping_add(u32::from(pod_crc16_table_entry(message_sequence)))
            .wrapping_add(lot & 0xffff)
            .wrapping_add(tid & 0xffff);
        let seed = ((sum & 0xffff) as u16) ^ sync_word;
        log::warn!(
            "resyncing nonce: sync word {:#06x}, seed {:#04x}",
            sync_word,
            seed & 0xff
        );
        Self::with_seed(lot, tid, (seed & 0xff) as u8)
    }
}
