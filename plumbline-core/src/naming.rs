//! Naming conventions for derived objects: unique indexes and sequences.

use crate::statement::bare_ident;

/// Default identifier length limit of the backend.
pub const DEFAULT_IDENTIFIER_MAX_LENGTH: usize = 63;

/// Derives index and sequence names from table and column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamingStrategy {
    /// Names longer than this are shortened with a CRC32 suffix.
    pub identifier_max_length: usize,
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self {
            identifier_max_length: DEFAULT_IDENTIFIER_MAX_LENGTH,
        }
    }
}

impl NamingStrategy {
    pub fn new(identifier_max_length: usize) -> Self {
        Self {
            identifier_max_length,
        }
    }

    /// Name of the unique index/constraint for `table.column`: `idx_<table>_<column>`.
    ///
    /// Dots in a qualified table name become underscores.
    pub fn index_name(&self, table: &str, column: &str) -> String {
        let name = format!(
            "idx_{}_{}",
            bare_ident(table).replace('.', "_"),
            bare_ident(column)
        );
        self.fit(name)
    }

    /// Name of the sequence backing an auto-increment column: `<table>_<column>_seq`.
    ///
    /// Built from bare names; the schema qualifier is not part of it and the
    /// result is never shortened, so it always matches what the catalog
    /// default reports.
    pub fn sequence_name(&self, table: &str, column: &str) -> String {
        let table = bare_ident(table);
        let table = table.rsplit('.').next().unwrap_or(table);
        format!("{}_{}_seq", bare_ident(table), bare_ident(column))
    }

    fn fit(&self, name: String) -> String {
        if name.len() <= self.identifier_max_length || self.identifier_max_length <= 8 {
            return name;
        }
        let hash = crc32fast::hash(name.as_bytes());
        let mut keep = self.identifier_max_length - 8;
        while !name.is_char_boundary(keep) {
            keep -= 1;
        }
        format!("{}{:08x}", &name[..keep], hash)
    }
}
