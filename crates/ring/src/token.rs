//! Ownership tokens for rule groups.

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

fn fnv1a(mut hash: u32, bytes: &[u8]) -> u32 {
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

/// Token for a rule group identity `(tenant, namespace, name)`.
///
/// Parts are separated by a NUL byte so `("ab", "c")` and `("a", "bc")`
/// hash differently.
pub fn group_token(tenant: &str, namespace: &str, name: &str) -> u32 {
    let mut h = FNV32_OFFSET;
    h = fnv1a(h, tenant.as_bytes());
    h = fnv1a(h, &[0]);
    h = fnv1a(h, namespace.as_bytes());
    h = fnv1a(h, &[0]);
    fnv1a(h, name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_reference_values() {
        assert_eq!(fnv1a(FNV32_OFFSET, b""), 0x811c_9dc5);
        assert_eq!(fnv1a(FNV32_OFFSET, b"a"), 0xe40c_292c);
        assert_eq!(fnv1a(FNV32_OFFSET, b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn token_is_stable() {
        assert_eq!(group_token("t1", "ns", "g1"), group_token("t1", "ns", "g1"));
    }

    #[test]
    fn token_separates_parts() {
        assert_ne!(group_token("ab", "c", "g"), group_token("a", "bc", "g"));
        assert_ne!(group_token("t1", "ns", "g1"), group_token("t2", "ns", "g1"));
    }
}
