//! Key orders.
//!
//! Index keys and element keys are fixed-length byte strings compared under a
//! configurable total order. The order also decides which keys are
//! well-formed; the read path uses that to spot damaged partition rows.

use std::cmp::Ordering;

/// URL-safe base64 alphabet, in collation order.
const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Marks bytes outside the alphabet in [`BASE64_RANK`].
const NOT_IN_ALPHABET: u8 = 0xFF;

/// Position of each byte in [`BASE64_ALPHABET`].
const BASE64_RANK: [u8; 256] = {
    let mut rank = [NOT_IN_ALPHABET; 256];
    let mut i = 0;
    while i < BASE64_ALPHABET.len() {
        rank[BASE64_ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    rank
};

/// Total order over fixed-length keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyOrder {
    /// Unsigned lexicographic byte order; every key is well-formed.
    #[default]
    Natural,
    /// Order by position in the URL-safe base64 alphabet; keys must consist
    /// of alphabet characters only.
    Base64,
}

impl KeyOrder {
    /// Compares two keys.
    ///
    /// Under [`KeyOrder::Base64`] bytes outside the alphabet sort after every
    /// alphabet character, by raw value.
    #[must_use]
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Self::Natural => a.cmp(b),
            Self::Base64 => {
                for (x, y) in a.iter().zip(b) {
                    let ord = Self::base64_weight(*x).cmp(&Self::base64_weight(*y));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
        }
    }

    /// Returns whether `key` is a legal key under this order.
    #[must_use]
    pub fn is_well_formed(self, key: &[u8]) -> bool {
        match self {
            Self::Natural => true,
            Self::Base64 => key.iter().all(|b| BASE64_RANK[*b as usize] != NOT_IN_ALPHABET),
        }
    }

    /// Parses the CLI spelling of an order.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "natural" => Some(Self::Natural),
            "base64" => Some(Self::Base64),
            _ => None,
        }
    }

    fn base64_weight(b: u8) -> u16 {
        match BASE64_RANK[b as usize] {
            NOT_IN_ALPHABET => 64 + u16::from(b),
            rank => u16::from(rank),
        }
    }
}
