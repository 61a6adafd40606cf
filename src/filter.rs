//! Candidate filter — probabilistic membership over normalized surface forms.
//!
//! A bloom filter answering "definitely absent" vs "possibly present" for
//! normalized entity text, used to prune candidate search before any
//! store lookup. A positive answer may be a false positive (including for
//! an entity whose storage write has not committed yet); the store lookup
//! that follows remains the source of truth. A negative answer is exact
//! for every surface form already inserted.
//!
//! Additions-only: there is no removal, so a grown filter never produces
//! false negatives for committed entities. Concurrent reads during
//! concurrent inserts are safe via RwLock on the bit array.

use std::sync::RwLock;

use crate::model::OrgId;

/// Concurrent bloom filter over (org, normalized text) pairs.
pub struct CandidateFilter {
    bits: RwLock<Vec<u64>>,
    /// Number of bits (m), fixed at construction
    bit_count: u64,
    /// Number of hash probes per key (k)
    hash_count: u32,
}

impl CandidateFilter {
    /// Size the filter for an expected number of entries at a target
    /// false-positive rate, using the standard m/k formulas.
    pub fn with_capacity(expected_items: usize, fp_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.5);
        let ln2 = std::f64::consts::LN_2;

        let m = ((-n * p.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let k = ((m as f64 / n) * ln2).round().clamp(1.0, 16.0) as u32;

        Self {
            bits: RwLock::new(vec![0u64; m.div_ceil(64) as usize]),
            bit_count: m,
            hash_count: k,
        }
    }

    /// Register a normalized surface form for a tenant.
    pub fn insert(&self, org: &OrgId, normalized: &str) {
        let mut bits = self.bits.write().unwrap();
        for bit in self.probe_bits(org, normalized) {
            bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    /// False means no entity with this normalized text was ever inserted;
    /// true means "possibly present" and the store must be consulted.
    pub fn maybe_contains(&self, org: &OrgId, normalized: &str) -> bool {
        let bits = self.bits.read().unwrap();
        self.probe_bits(org, normalized)
            .into_iter()
            .all(|bit| bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    /// Derive k probe positions from a single blake3 digest of the keyed
    /// input, consumed eight bytes at a time (blake3 output is extendable,
    /// so k probes never exhaust it).
    fn probe_bits(&self, org: &OrgId, normalized: &str) -> Vec<u64> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(org.as_str().as_bytes());
        hasher.update(&[0]); // tenant/text separator
        hasher.update(normalized.as_bytes());

        let mut reader = hasher.finalize_xof();
        let mut buf = [0u8; 8];
        (0..self.hash_count)
            .map(|_| {
                reader.fill(&mut buf);
                u64::from_le_bytes(buf) % self.bit_count
            })
            .collect()
    }
}
