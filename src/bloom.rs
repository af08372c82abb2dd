//! Compact membership filter over the identifiers a dump references.
//!
//! Stored per reference-index row so the pager can reject candidate dumps
//! without paying a bundle round-trip. Answers "does this dump reference
//! identifier X?" with no false negatives and bounded false positives; a
//! filter that cannot be decoded fails open, since pruning is an
//! optimization and must never drop a true positive.

use crate::model::PackageReference;

const FILTER_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 1 + 8;

/// Bits per expected entry, sized for roughly a 1% false-positive rate at
/// the default probe count.
const BITS_PER_ENTRY: usize = 10;
const DEFAULT_PROBES: u8 = 7;
const MIN_BITS: u64 = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    probes: u8,
    bit_count: u64,
    bits: Vec<u8>,
}

impl Filter {
    /// Build a filter sized for the given identifiers.
    pub fn create<I, S>(identifiers: I) -> Filter
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identifiers: Vec<S> = identifiers.into_iter().collect();
        let bit_count = ((identifiers.len() * BITS_PER_ENTRY) as u64).max(MIN_BITS);
        let mut filter = Filter {
            probes: DEFAULT_PROBES,
            bit_count,
            bits: vec![0u8; bit_count.div_ceil(8) as usize],
        };
        for identifier in &identifiers {
            filter.insert(identifier.as_ref());
        }
        filter
    }

    fn insert(&mut self, identifier: &str) {
        for position in probe_positions(identifier, self.probes, self.bit_count) {
            self.bits[(position / 8) as usize] |= 1 << (position % 8);
        }
    }

    /// True when the identifier may be present; false only when it is
    /// definitely absent.
    pub fn may_contain(&self, identifier: &str) -> bool {
        probe_positions(identifier, self.probes, self.bit_count)
            .into_iter()
            .all(|position| self.bits[(position / 8) as usize] & (1 << (position % 8)) != 0)
    }

    /// Wire layout: version byte, probe count, little-endian bit count,
    /// then the bit array.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.bits.len());
        bytes.push(FILTER_VERSION);
        bytes.push(self.probes);
        bytes.extend_from_slice(&self.bit_count.to_le_bytes());
        bytes.extend_from_slice(&self.bits);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Filter> {
        if bytes.len() < HEADER_LEN || bytes[0] != FILTER_VERSION {
            return None;
        }
        let probes = bytes[1];
        let bit_count = u64::from_le_bytes(bytes[2..10].try_into().ok()?);
        if probes == 0 || bit_count == 0 {
            return None;
        }
        let bits = bytes[HEADER_LEN..].to_vec();
        if (bits.len() as u64) < bit_count.div_ceil(8) {
            return None;
        }
        Some(Filter {
            probes,
            bit_count,
            bits,
        })
    }
}

/// Probe positions by double hashing: two independent 64-bit halves of one
/// blake3 digest drive the whole probe family.
fn probe_positions(identifier: &str, probes: u8, bit_count: u64) -> Vec<u64> {
    let digest = blake3::hash(identifier.as_bytes());
    let bytes = digest.as_bytes();
    let h1 = u64::from_le_bytes(bytes[0..8].try_into().unwrap_or_default());
    let h2 = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or_default()) | 1;

    (0..probes as u64)
        .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_count)
        .collect()
}

/// Keep the prefix of `refs` whose filter may contain `identifier`, at most
/// `take` rows. Returns the accepted rows and how many rows were examined;
/// rejected rows count toward the scan so the batch window always advances.
pub fn apply_bloom_filter(
    refs: Vec<PackageReference>,
    identifier: &str,
    take: usize,
) -> (Vec<PackageReference>, usize) {
    let mut accepted = Vec::new();
    let mut scanned = 0usize;

    for reference in refs {
        scanned += 1;
        let keep = if reference.filter.is_empty() {
            true
        } else {
            match Filter::from_bytes(&reference.filter) {
                Some(filter) => filter.may_contain(identifier),
                None => {
                    eprintln!(
                        "lsifq: Warning: undecodable reference filter for dump {}, keeping candidate",
                        reference.dump_id
                    );
                    true
                }
            }
        };
        if keep {
            accepted.push(reference);
            if accepted.len() >= take {
                break;
            }
        }
    }

    (accepted, scanned)
}
