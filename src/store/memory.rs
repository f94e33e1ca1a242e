//! In-memory bitmap store
//!
//! A lightweight alternative to Redis for testing and single-process use.
//! Values follow Redis string/bit semantics exactly:
//!
//! - bit `n` lives in byte `n / 8`, most significant bit first
//! - SETBIT grows the value with zero bytes as needed
//! - BITOP pads shorter operands with zero bytes; the result is as long as
//!   the longest source, and the destination is deleted when every source is
//!   absent
//!
//! # Warning
//!
//! All data is lost when the store is dropped.

use super::{BitWrite, BitmapStore};
use crate::error::{Error, Result};
use crate::types::{check_identifier, BitOperator, Identifier, MAX_BIT_OFFSET};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Bitmap store backed by a `HashMap`
pub struct InMemoryBitmapStore {
    /// key -> raw string value
    values: RwLock<HashMap<String, Vec<u8>>>,
    /// Number of store round trips served (a batch counts once)
    round_trips: AtomicU64,
    /// When false every command fails with a connection error
    available: AtomicBool,
}

impl InMemoryBitmapStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            round_trips: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Number of round trips served so far
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Simulate the backend going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// True if no keys are stored
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Raw value of a key
    pub fn raw_value(&self, key: &str) -> Option<Vec<u8>> {
        self.values.read().get(key).cloned()
    }

    fn begin(&self) -> Result<()> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(Error::connection("in-memory store is unavailable"));
        }
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for InMemoryBitmapStore {
    fn default() -> Self {
        Self::new()
    }
}

fn byte_and_mask(offset: Identifier) -> (usize, u8) {
    ((offset / 8) as usize, 0x80u8 >> (offset % 8))
}

fn set_bit_in(values: &mut HashMap<String, Vec<u8>>, key: &str, offset: Identifier) -> bool {
    let (index, mask) = byte_and_mask(offset);
    let value = values.entry(key.to_string()).or_default();
    if value.len() <= index {
        value.resize(index + 1, 0);
    }
    let previous = value[index] & mask != 0;
    value[index] |= mask;
    previous
}

#[async_trait]
impl BitmapStore for InMemoryBitmapStore {
    fn store_id(&self) -> &str {
        "in-memory-v1"
    }

    async fn set_bit(&self, key: &str, offset: Identifier) -> Result<bool> {
        check_identifier(offset, MAX_BIT_OFFSET)?;
        self.begin()?;
        Ok(set_bit_in(&mut self.values.write(), key, offset))
    }

    async fn set_bits(&self, writes: &[BitWrite]) -> Result<()> {
        for write in writes {
            check_identifier(write.offset, MAX_BIT_OFFSET)?;
        }
        self.begin()?;

        let mut values = self.values.write();
        for write in writes {
            set_bit_in(&mut values, &write.key, write.offset);
        }
        Ok(())
    }

    async fn get_bit(&self, key: &str, offset: Identifier) -> Result<bool> {
        check_identifier(offset, MAX_BIT_OFFSET)?;
        self.begin()?;

        let (index, mask) = byte_and_mask(offset);
        let values = self.values.read();
        Ok(values
            .get(key)
            .and_then(|value| value.get(index))
            .map(|byte| byte & mask != 0)
            .unwrap_or(false))
    }

    async fn bit_count(&self, key: &str) -> Result<u64> {
        self.begin()?;
        let values = self.values.read();
        Ok(values
            .get(key)
            .map(|value| value.iter().map(|byte| byte.count_ones() as u64).sum())
            .unwrap_or(0))
    }

    async fn bit_op(&self, operator: BitOperator, dest: &str, sources: &[String]) -> Result<u64> {
        if sources.is_empty() {
            return Err(Error::invalid_argument("BITOP needs at least one source key"));
        }
        self.begin()?;

        let mut values = self.values.write();
        let operands: Vec<&[u8]> = sources
            .iter()
            .map(|key| values.get(key).map(Vec::as_slice).unwrap_or(&[]))
            .collect();
        let len = operands.iter().map(|v| v.len()).max().unwrap_or(0);

        let mut result = vec![0u8; len];
        for (i, byte) in result.iter_mut().enumerate() {
            let mut acc = operands[0].get(i).copied().unwrap_or(0);
            for operand in &operands[1..] {
                acc = operator.apply(acc, operand.get(i).copied().unwrap_or(0));
            }
            *byte = acc;
        }

        if result.is_empty() {
            values.remove(dest);
        } else {
            values.insert(dest.to_string(), result);
        }
        Ok(len as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.begin()?;
        Ok(self.values.read().contains_key(key))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.begin()?;
        let mut values = self.values.write();
        Ok(keys.iter().filter(|key| values.remove(*key).is_some()).count() as u64)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.begin()?;
        let values = self.values.read();
        let mut keys: Vec<String> = values
            .keys()
            .filter(|key| glob_match(pattern.as_bytes(), key.as_bytes()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position after the last `*` and the text position it was tried against
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some(b'*') => {
                p += 1;
                backtrack = Some((p, t));
                continue;
            },
            Some(b'?') => {
                p += 1;
                t += 1;
                continue;
            },
            Some(b'\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            },
            Some(c) if c != b'\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            },
            _ => {},
        }

        match backtrack {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                backtrack = Some((star_p, star_t + 1));
            },
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
