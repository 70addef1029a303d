//! Key Builder
//!
//! Canonical cache keys: `Class.member`, `Class_<id>.member` for isolated
//! instances, each optionally followed by `:<hash>`.

use crate::memo::options::{CacheOptions, MemberOptions};
use crate::memo::scope::{CacheTarget, InstanceId};

/// Builds the key for one member call. Pure and deterministic.
///
/// # Arguments
/// * `class_name` - Name of the target's class
/// * `member` - Name of the memoized member
/// * `shared` - Force the shared namespace even for an isolated instance
/// * `instance` - Instance id of an isolated target
/// * `hash` - Argument hash, appended after `:`
pub fn build_key(
    class_name: &str,
    member: &str,
    shared: bool,
    instance: Option<InstanceId>,
    hash: Option<&str>,
) -> String {
    let mut key = match instance {
        Some(id) if !shared => format!("{class_name}_{id}.{member}"),
        _ => format!("{class_name}.{member}"),
    };
    if let Some(hash) = hash {
        key.push(':');
        key.push_str(hash);
    }
    key
}

/// Builds the key for a call of `member` on `target` with `args`.
///
/// # Errors
/// Whatever the member's hash function returns.
pub(crate) fn member_key<T, A, E>(
    target: &T,
    member: &str,
    declared: &MemberOptions<A, E>,
    resolved: &CacheOptions,
    args: &A,
) -> Result<String, E>
where
    T: CacheTarget + ?Sized,
{
    let hash = match &declared.hash_function {
        Some(hash_function) => Some(hash_function(args)?),
        None => None,
    };
    Ok(build_key(
        target.class_name(),
        member,
        resolved.uses_shared_cache(),
        target.instance_id(),
        hash.as_deref(),
    ))
}
