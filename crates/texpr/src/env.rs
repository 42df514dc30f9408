//! Environment-driven defaults, parsed once per process.

use std::env;
use std::num::NonZeroUsize;
use std::sync::OnceLock;

static TEXPR_SYNC: OnceLock<bool> = OnceLock::new();
static TEXPR_PLAN_CACHE_CAPACITY: OnceLock<Option<NonZeroUsize>> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_capacity(value: &str) -> Option<NonZeroUsize> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unbounded") {
        return None;
    }
    match trimmed.parse::<usize>() {
        Ok(capacity) => NonZeroUsize::new(capacity),
        Err(_) => {
            tracing::warn!(value = trimmed, "ignoring malformed TEXPR_PLAN_CACHE_CAPACITY");
            None
        }
    }
}

/// `TEXPR_SYNC`: synchronize the stream after every assignment.
pub(crate) fn sync_after_assign() -> bool {
    *TEXPR_SYNC.get_or_init(|| match env::var("TEXPR_SYNC") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

/// `TEXPR_PLAN_CACHE_CAPACITY`: LRU bound for plan caches built from the environment.
pub(crate) fn plan_cache_capacity() -> Option<NonZeroUsize> {
    *TEXPR_PLAN_CACHE_CAPACITY.get_or_init(|| match env::var("TEXPR_PLAN_CACHE_CAPACITY") {
        Ok(value) => parse_capacity(&value),
        Err(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flags_accept_common_spellings() {
        for value in ["1", "true", " YES ", "on"] {
            assert!(parse_bool(value), "{value}");
        }
        for value in ["0", "false", "off", "nope"] {
            assert!(!parse_bool(value), "{value}");
        }
    }

    #[test]
    fn capacity_zero_or_garbage_means_unbounded() {
        assert_eq!(parse_capacity("32"), NonZeroUsize::new(32));
        assert_eq!(parse_capacity("0"), None);
        assert_eq!(parse_capacity("unbounded"), None);
        assert_eq!(parse_capacity("lots"), None);
    }
}
