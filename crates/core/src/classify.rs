//! Heuristic classification of provider failure causes.
//!
//! Providers report failures as free text (exception messages, subprocess
//! stderr). Some patterns are worth surfacing to the client with a clearer
//! label, most importantly accelerator memory exhaustion.

use serde::Serialize;

/// Broad category of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider ran out of device or host memory.
    ResourceExhausted,
    Other,
}

/// Prefix prepended to user-facing reasons of resource failures.
pub const RESOURCE_REASON_PREFIX: &str = "resource/memory limit";

/// Lowercase substrings that indicate memory exhaustion.
const RESOURCE_PATTERNS: &[&str] = &[
    "out of memory",
    "outofmemory",
    "oom",
    "mps backend out of memory",
    "vkallocatememory",
    "allocation failed",
    "failed to allocate",
];

/// Classify a failure cause by matching known patterns.
pub fn classify_failure(cause: &str) -> FailureKind {
    let lower = cause.to_ascii_lowercase();
    if RESOURCE_PATTERNS.iter().any(|p| contains_word(&lower, p)) {
        FailureKind::ResourceExhausted
    } else {
        FailureKind::Other
    }
}

/// Human-readable reason for a failure, labelled by its kind.
pub fn describe_failure(kind: FailureKind, cause: &str) -> String {
    match kind {
        FailureKind::ResourceExhausted if !cause.starts_with(RESOURCE_REASON_PREFIX) => {
            format!("{RESOURCE_REASON_PREFIX}: {cause}")
        }
        _ => cause.to_string(),
    }
}

/// `oom` must match as a word so that e.g. "room" or "zoom" do not count.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle != "oom" {
        return haystack.contains(needle);
    }
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torch_oom_is_resource() {
        assert_eq!(
            classify_failure("CUDA out of memory. Tried to allocate 2.00 GiB"),
            FailureKind::ResourceExhausted
        );
    }

    #[test]
    fn mps_oom_is_resource() {
        assert_eq!(
            classify_failure("MPS backend out of memory (MPS allocated: 8 GB)"),
            FailureKind::ResourceExhausted
        );
    }

    #[test]
    fn vulkan_allocation_is_resource() {
        assert_eq!(
            classify_failure("vkAllocateMemory failed -2"),
            FailureKind::ResourceExhausted
        );
    }

    #[test]
    fn oom_word_matches() {
        assert_eq!(classify_failure("worker killed: OOM"), FailureKind::ResourceExhausted);
    }

    #[test]
    fn room_does_not_match() {
        assert_eq!(classify_failure("no room for zoom"), FailureKind::Other);
    }

    #[test]
    fn unrelated_error_is_other() {
        assert_eq!(classify_failure("model weights missing"), FailureKind::Other);
    }

    #[test]
    fn describe_prefixes_resource_failures_once() {
        let reason = describe_failure(FailureKind::ResourceExhausted, "out of memory");
        assert_eq!(reason, "resource/memory limit: out of memory");
        assert_eq!(
            describe_failure(FailureKind::ResourceExhausted, &reason),
            reason
        );
    }

    #[test]
    fn describe_leaves_other_failures_untouched() {
        assert_eq!(describe_failure(FailureKind::Other, "boom"), "boom");
    }
}
