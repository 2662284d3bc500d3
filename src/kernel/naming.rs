//! Collision-free internal names
//!
//! Generated names share a fixed prefix that no user would reasonably write,
//! followed by a decimal counter.

/// Prefix of every generated name
pub const UNIQUE_PREFIX: &str = "__weft_Un1Qu3";

/// Generator for wrapper and temporary names.
///
/// Not thread-safe; the owning interpreter serializes access.
#[derive(Debug, Default)]
pub struct UniqueNamer {
    counter: u64,
}

impl UniqueNamer {
    /// Create a new namer
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name distinct from every name reserved before
    pub fn reserve(&mut self) -> String {
        let name = format!("{}{}", UNIQUE_PREFIX, self.counter);
        self.counter += 1;
        name
    }

    /// Check whether `name` has the shape of a generated name
    pub fn is_generated(name: &str) -> bool {
        match name.strip_prefix(UNIQUE_PREFIX) {
            Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
            None => false,
        }
    }

    /// Number of names reserved so far
    pub fn reserved(&self) -> u64 {
        self.counter
    }
}
