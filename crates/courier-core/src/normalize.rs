//! Phone-number normalization.
//!
//! Maps whatever a caller passes as a destination (`"+91 98765-43210"`,
//! `"09876543210"`, an already-canonical address) to the transport's
//! canonical routing form: digits, country-code qualified, with the routing
//! suffix appended. The transformation is deterministic and side-effect
//! free; a bounded memo cache fronts it because the send path hits the same
//! destinations over and over.

use std::collections::HashMap;
use std::collections::VecDeque;

use parking_lot::Mutex;

/// Default memo cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Deterministic destination normalizer with a bounded memo cache.
///
/// Concurrent callers only contend on the cache mutex, which is held for a
/// map lookup/insert — never across the transformation itself.
pub struct PhoneNumberNormalizer {
    default_country_code: String,
    routing_suffix: String,
    capacity: usize,
    cache: Mutex<MemoCache>,
}

/// Insertion-ordered map: overflow evicts the oldest entry.
struct MemoCache {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl PhoneNumberNormalizer {
    /// Create a normalizer with the given default country code (digits
    /// only, e.g. `"91"`) and routing suffix (e.g. `"@c.us"`).
    pub fn new(default_country_code: impl Into<String>, routing_suffix: impl Into<String>) -> Self {
        Self::with_capacity(
            default_country_code,
            routing_suffix,
            DEFAULT_CACHE_CAPACITY,
        )
    }

    /// Create a normalizer with an explicit cache capacity.
    pub fn with_capacity(
        default_country_code: impl Into<String>,
        routing_suffix: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            default_country_code: default_country_code.into(),
            routing_suffix: routing_suffix.into(),
            capacity: capacity.max(1),
            cache: Mutex::new(MemoCache {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Normalize a raw destination to its canonical routing address.
    ///
    /// Idempotent: feeding the output back in yields the same address.
    pub fn normalize(&self, raw: &str) -> String {
        {
            let cache = self.cache.lock();
            if let Some(hit) = cache.entries.get(raw) {
                return hit.clone();
            }
        }

        let normalized = self.normalize_uncached(raw);

        let mut cache = self.cache.lock();
        if !cache.entries.contains_key(raw) {
            if cache.entries.len() >= self.capacity {
                if let Some(oldest) = cache.order.pop_front() {
                    let _ = cache.entries.remove(&oldest);
                }
            }
            let _ = cache.entries.insert(raw.to_string(), normalized.clone());
            cache.order.push_back(raw.to_string());
        }
        normalized
    }

    /// The pure transformation, bypassing the cache.
    fn normalize_uncached(&self, raw: &str) -> String {
        let cleaned: String = raw.chars().filter(char::is_ascii_digit).collect();

        let qualified = if cleaned.starts_with(&self.default_country_code) {
            cleaned
        } else {
            // Local form: drop leading zeros, then qualify.
            format!(
                "{}{}",
                self.default_country_code,
                cleaned.trim_start_matches('0')
            )
        };

        format!("{qualified}{}", self.routing_suffix)
    }

    /// Current number of memoized destinations.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> PhoneNumberNormalizer {
        PhoneNumberNormalizer::new("91", "@c.us")
    }

    #[test]
    fn local_number_gets_country_code() {
        assert_eq!(normalizer().normalize("9876543210"), "919876543210@c.us");
    }

    #[test]
    fn international_form_matches_local_form() {
        let n = normalizer();
        assert_eq!(n.normalize("9876543210"), n.normalize("+919876543210"));
    }

    #[test]
    fn leading_zeros_stripped_before_prefixing() {
        assert_eq!(normalizer().normalize("09876543210"), "919876543210@c.us");
    }

    #[test]
    fn punctuation_and_spaces_ignored() {
        assert_eq!(
            normalizer().normalize("+91 98765-43210"),
            "919876543210@c.us"
        );
    }

    #[test]
    fn idempotent_on_canonical_output() {
        let n = normalizer();
        let once = n.normalize("9876543210");
        assert_eq!(n.normalize(&once), once);
    }

    #[test]
    fn cache_returns_same_value() {
        let n = normalizer();
        let first = n.normalize("9876543210");
        let second = n.normalize("9876543210");
        assert_eq!(first, second);
        assert_eq!(n.cache_len(), 1);
    }

    #[test]
    fn cache_evicts_oldest_at_capacity() {
        let n = PhoneNumberNormalizer::with_capacity("1", "@c.us", 3);
        let _ = n.normalize("5550001");
        let _ = n.normalize("5550002");
        let _ = n.normalize("5550003");
        assert_eq!(n.cache_len(), 3);
        let _ = n.normalize("5550004");
        assert_eq!(n.cache_len(), 3, "overflow evicts instead of growing");
        // The evicted entry re-normalizes to the same canonical value.
        assert_eq!(n.normalize("5550001"), "15550001@c.us");
    }

    #[test]
    fn different_suffix_respected() {
        let n = PhoneNumberNormalizer::new("49", "@relay");
        assert_eq!(n.normalize("0171 2345678"), "491712345678@relay");
    }
}
