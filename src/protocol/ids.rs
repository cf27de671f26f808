//! Session-scoped id-shortening table (`spec.md` §4.1 "Id shortening").
//!
//! Short ids are a payload-size optimization, not a security boundary
//! (`spec.md` §9): the counter may be freely reused across sessions.

use std::collections::HashMap;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 alphabet is ascii")
}

#[derive(Debug, Clone, Default)]
pub struct IdTable {
    counter: u64,
    full_to_short: HashMap<String, String>,
    short_to_full: HashMap<String, String>,
}

impl IdTable {
    pub fn new() -> Self {
        Self { counter: 1, ..Default::default() }
    }

    /// Returns the short id for `full`, minting one on first sight.
    pub fn to_network_id(&mut self, full: &str) -> String {
        if let Some(short) = self.full_to_short.get(full) {
            return short.clone();
        }
        let short = to_base36(self.counter);
        self.counter += 1;
        self.full_to_short.insert(full.to_string(), short.clone());
        self.short_to_full.insert(short.clone(), full.to_string());
        short
    }

    /// Resolves a short id received from the wire back to its full id.
    pub fn resolve_network_id(&self, short: &str) -> Option<&str> {
        self.short_to_full.get(short).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_full_and_short_ids() {
        let mut table = IdTable::new();
        let short = table.to_network_id("tank-uuid-1");
        assert_eq!(table.resolve_network_id(&short), Some("tank-uuid-1"));
        assert_eq!(table.to_network_id(table.resolve_network_id(&short).unwrap()), short);
    }

    #[test]
    fn same_full_id_returns_same_short_id() {
        let mut table = IdTable::new();
        let a = table.to_network_id("x");
        let b = table.to_network_id("x");
        assert_eq!(a, b);
    }

    #[test]
    fn counter_advances_in_base36() {
        let mut table = IdTable::new();
        let mut last = String::new();
        for i in 0..35 {
            last = table.to_network_id(&format!("id-{i}"));
        }
        assert_eq!(last, "z");
        assert_eq!(table.to_network_id("id-35"), "10");
    }
}
