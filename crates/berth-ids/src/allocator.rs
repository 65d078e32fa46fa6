//! Identifier allocation.
//!
//! The allocation budget counts the environment prefix, both join
//! separators, and the minimum suffix, so `host_name(allocate(category))`
//! is always strictly shorter than the provider limit. Three cases:
//!
//! 1. No room even for the minimum suffix: truncate the category past the
//!    deficit (plus a safety margin) and attach the minimum suffix.
//! 2. Room for less than a full minimum suffix of slack: shave the
//!    category by the shortfall and attach the minimum suffix.
//! 3. Plenty of room: attach a suffix as long as the slack allows, capped
//!    at the maximum suffix length.

use rand::Rng;

/// Provider limit on a host identifier (DNS-label-derived).
const HOST_NAME_LIMIT: usize = 63;
/// Shortest random suffix still considered collision-resistant in practice.
const MIN_SUFFIX_LEN: usize = 4;
/// Longest suffix worth attaching.
const MAX_SUFFIX_LEN: usize = 8;
/// Safety margin taken off the budget in the cramped cases.
const EXTRA_BUFFER_LEN: usize = 2;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Derives database ids from tenant categories and maps them onto host
/// names under a fixed environment prefix.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    prefix: String,
}

impl IdAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Allocate a database id for a tenant category.
    ///
    /// Always returns a value; the only randomness is the suffix.
    pub fn allocate(&self, category: &str) -> String {
        let name = category.replace('-', "_");
        self.affix_unique_suffix(&name)
    }

    /// The provider-facing host name for a database or instance id:
    /// underscores become hyphens under the environment prefix.
    pub fn host_name(&self, id: &str) -> String {
        format!("{}-{}", self.prefix, id.replace('_', "-"))
    }

    /// Invert `host_name`: strip the environment prefix and separator and
    /// restore the underscore form.
    pub fn instance_id(&self, host_name: &str) -> String {
        host_name
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(host_name)
            .replace('-', "_")
    }

    fn affix_unique_suffix(&self, name: &str) -> String {
        // Slack left once the prefix, both separators, and the minimum
        // suffix are spoken for.
        let spoken_for = self.prefix.len() + 1 + name.len() + 1 + MIN_SUFFIX_LEN;
        let available = HOST_NAME_LIMIT as i64 - spoken_for as i64;

        if available < 0 {
            let cut = available.unsigned_abs() as usize + EXTRA_BUFFER_LEN;
            let kept = truncate_bytes(name, name.len().saturating_sub(cut));
            format!("{kept}_{}", random_suffix(MIN_SUFFIX_LEN))
        } else if available as usize <= MIN_SUFFIX_LEN {
            let cut = MIN_SUFFIX_LEN - available as usize;
            let kept = truncate_bytes(name, name.len().saturating_sub(cut));
            format!("{kept}_{}", random_suffix(MIN_SUFFIX_LEN))
        } else {
            let len = (available as usize - EXTRA_BUFFER_LEN).min(MAX_SUFFIX_LEN);
            format!("{name}_{}", random_suffix(len))
        }
    }
}

/// Truncate to at most `max_bytes`, backing up to a char boundary.
fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}
