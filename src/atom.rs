use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

/// An interned name — a lightweight handle that supports O(1) equality
/// comparison instead of byte-by-byte string comparison. Atoms are used
/// as record field names, module dictionary keys, and builtin names.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(u32);

struct AtomTable {
    str_to_id: HashMap<String, Atom>,
    id_to_str: Vec<String>,
}

static GLOBAL_TABLE: OnceLock<RwLock<AtomTable>> = OnceLock::new();

fn global_table() -> &'static RwLock<AtomTable> {
    GLOBAL_TABLE.get_or_init(|| {
        RwLock::new(AtomTable {
            str_to_id: HashMap::new(),
            id_to_str: Vec::new(),
        })
    })
}

impl Atom {
    /// Intern a string and return its `Atom`.  If the string has already
    /// been interned, the existing atom is returned (idempotent).
    pub fn intern(s: &str) -> Atom {
        // Fast path: read lock only.
        {
            let table = global_table().read().unwrap();
            if let Some(&atom) = table.str_to_id.get(s) {
                return atom;
            }
        }
        // Slow path: acquire write lock and insert.
        let mut table = global_table().write().unwrap();
        // Double-check after acquiring write lock.
        if let Some(&atom) = table.str_to_id.get(s) {
            return atom;
        }
        let id = table.id_to_str.len() as u32;
        let atom = Atom(id);
        table.id_to_str.push(s.to_owned());
        table.str_to_id.insert(s.to_owned(), atom);
        atom
    }

    /// Get the original string for this atom.
    pub fn resolve(&self) -> String {
        let table = global_table().read().unwrap();
        table.id_to_str[self.0 as usize].clone()
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = global_table().read().unwrap();
        write!(f, "Atom({}: {:?})", self.0, &table.id_to_str[self.0 as usize])
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = global_table().read().unwrap();
        f.write_str(&table.id_to_str[self.0 as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let a = Atom::intern("hello");
        let b = Atom::intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn different_strings_produce_different_atoms() {
        let a = Atom::intern("foo_test");
        let b = Atom::intern("bar_test");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_roundtrip() {
        let atom = Atom::intern("roundtrip_test");
        assert_eq!(atom.resolve(), "roundtrip_test");
    }

    #[test]
    fn display_shows_string() {
        let atom = Atom::intern("display_test");
        assert_eq!(format!("{}", atom), "display_test");
    }

    #[test]
    fn atom_can_be_hash_key() {
        let mut map = HashMap::new();
        let atom = Atom::intern("hashkey_test");
        map.insert(atom, 42);
        assert_eq!(map.get(&atom), Some(&42));
    }
}
