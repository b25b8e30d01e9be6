//! Type-alias equivalence and serial type mapping.
//!
//! Catalogs report Oracle spellings (`NUMBER`, `VARCHAR2`) while models are
//! written with PostgreSQL-family spellings (`integer`, `varchar(255)`). A
//! column is left alone when the desired type starts with any alias
//! registered for the reported native type.

/// Static mapping from canonical native type names to accepted spellings.
pub struct TypeAliasTable {
    entries: &'static [(&'static str, &'static [&'static str])],
}

/// The process-wide alias table.
pub static TYPE_ALIASES: TypeAliasTable = TypeAliasTable {
    entries: &[
        // Oracle catalog spellings
        (
            "NUMBER",
            &[
                "number", "numeric", "decimal", "dec", "integer", "int", "int2", "int4", "int8",
                "smallint", "bigint",
            ],
        ),
        (
            "FLOAT",
            &["float", "real", "double precision", "float4", "float8"],
        ),
        ("BINARY_FLOAT", &["binary_float", "real", "float4"]),
        ("BINARY_DOUBLE", &["binary_double", "double precision", "float8"]),
        ("VARCHAR2", &["varchar2", "varchar", "character varying"]),
        ("NVARCHAR2", &["nvarchar2", "varchar", "character varying"]),
        ("CHAR", &["char", "character", "bpchar"]),
        ("NCHAR", &["nchar", "char", "character"]),
        ("CLOB", &["clob", "text"]),
        ("NCLOB", &["nclob", "text"]),
        ("BLOB", &["blob", "bytea"]),
        ("RAW", &["raw", "bytea"]),
        ("DATE", &["date"]),
        ("TIMESTAMP", &["timestamp", "timestamp without time zone"]),
        (
            "TIMESTAMP WITH TIME ZONE",
            &["timestamptz", "timestamp with time zone"],
        ),
        ("BOOLEAN", &["boolean", "bool"]),
        // PostgreSQL-family spellings
        ("int2", &["smallint"]),
        ("int4", &["integer"]),
        ("int8", &["bigint"]),
        ("smallint", &["int2"]),
        ("integer", &["int4"]),
        ("bigint", &["int8"]),
        ("decimal", &["numeric"]),
        ("numeric", &["decimal"]),
        ("timestamptz", &["timestamp with time zone"]),
        ("bool", &["boolean"]),
        ("serial2", &["smallserial"]),
        ("serial4", &["serial"]),
        ("serial8", &["bigserial"]),
        ("varbit", &["bit varying"]),
        ("bit varying", &["varbit"]),
        ("bpchar", &["char", "character"]),
        ("character", &["char"]),
        ("varchar", &["character varying"]),
        ("character varying", &["varchar"]),
        ("float4", &["real"]),
        ("real", &["float4"]),
        ("float8", &["double precision"]),
        ("double precision", &["float8"]),
        ("timetz", &["time with time zone"]),
        ("time with time zone", &["timetz"]),
    ],
};

impl TypeAliasTable {
    /// Aliases registered for `native`.
    ///
    /// The key is matched ASCII case-insensitively; if nothing matches, a
    /// second lookup drops parenthesized precision (`TIMESTAMP(6) WITH TIME
    /// ZONE` -> `TIMESTAMP WITH TIME ZONE`).
    pub fn aliases(&self, native: &str) -> &'static [&'static str] {
        let native = native.trim();
        if let Some(found) = self.lookup(native) {
            return found;
        }
        let stripped = strip_parenthesized(native);
        if stripped != native {
            if let Some(found) = self.lookup(&stripped) {
                return found;
            }
        }
        &[]
    }

    fn lookup(&self, key: &str) -> Option<&'static [&'static str]> {
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, aliases)| *aliases)
    }

    /// Whether a column reported as `native` already satisfies `desired`.
    pub fn equivalent(&self, native: &str, desired: &str) -> bool {
        if native == desired {
            return true;
        }
        let desired = desired.trim().to_ascii_lowercase();
        self.aliases(native)
            .iter()
            .any(|alias| has_type_prefix(&desired, alias))
    }
}

/// `desired` starts with `alias` and the match ends on a word boundary, so
/// `varchar(255)` matches `varchar` but `interval` does not match `int`.
fn has_type_prefix(desired: &str, alias: &str) -> bool {
    match desired.strip_prefix(alias) {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_')),
        None => false,
    }
}

fn strip_parenthesized(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for ch in s.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Convenience wrapper over [`TYPE_ALIASES`].
pub fn types_equivalent(native: &str, desired: &str) -> bool {
    TYPE_ALIASES.equivalent(native, desired)
}

/// Integer type backing a serial pseudo-type, if `logical` is one.
pub fn serial_database_type(logical: &str) -> Option<&'static str> {
    match logical.trim().to_ascii_lowercase().as_str() {
        "smallserial" | "serial2" => Some("smallint"),
        "serial" | "serial4" => Some("integer"),
        "bigserial" | "serial8" => Some("bigint"),
        _ => None,
    }
}

/// Numeric type for the sequence and column of an auto-increment field.
///
/// Serial pseudo-types map to their integer type; anything else is used as
/// written.
pub fn sequence_type(logical: &str) -> String {
    serial_database_type(logical)
        .map(str::to_string)
        .unwrap_or_else(|| logical.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbatim_match() {
        assert!(types_equivalent("varchar(10)", "varchar(10)"));
    }

    #[test]
    fn test_number_aliases() {
        assert!(types_equivalent("NUMBER", "numeric"));
        assert!(types_equivalent("NUMBER", "numeric(10,2)"));
        assert!(types_equivalent("NUMBER", "integer"));
        assert!(types_equivalent("NUMBER", "bigint"));
        assert!(!types_equivalent("NUMBER", "serial"));
        assert!(!types_equivalent("NUMBER", "varchar(20)"));
    }

    #[test]
    fn test_prefix_respects_word_boundary() {
        assert!(types_equivalent("NUMBER", "int"));
        assert!(!types_equivalent("NUMBER", "interval"));
        assert!(types_equivalent("VARCHAR2", "varchar(255)"));
        assert!(!types_equivalent("VARCHAR2", "varchar_ish"));
    }

    #[test]
    fn test_case_insensitive_key_and_desired() {
        assert!(types_equivalent("varchar2", "VARCHAR(40)"));
        assert!(types_equivalent("Clob", "text"));
    }

    #[test]
    fn test_precision_stripped_for_lookup() {
        assert!(types_equivalent("TIMESTAMP(6) WITH TIME ZONE", "timestamptz"));
        assert!(types_equivalent("TIMESTAMP(6)", "timestamp"));
        assert!(!types_equivalent("TIMESTAMP(6)", "timestamptz"));
    }

    #[test]
    fn test_unknown_native_type_has_no_aliases() {
        assert!(TYPE_ALIASES.aliases("XMLTYPE").is_empty());
        assert!(!types_equivalent("XMLTYPE", "xml"));
    }

    #[test]
    fn test_serial_mapping() {
        assert_eq!(serial_database_type("serial"), Some("integer"));
        assert_eq!(serial_database_type("BIGSERIAL"), Some("bigint"));
        assert_eq!(serial_database_type("serial2"), Some("smallint"));
        assert_eq!(serial_database_type("integer"), None);
        assert_eq!(sequence_type("bigserial"), "bigint");
        assert_eq!(sequence_type("number(12)"), "number(12)");
    }
}
