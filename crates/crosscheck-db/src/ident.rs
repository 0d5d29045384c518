//! Identifier quoting for settings-supplied schema and table names.
//!
//! Names cannot be bound as parameters, so they are spliced into the SQL
//! text. Every name is double-quoted with inner quotes doubled, which makes
//! any string a single identifier.

/// Quote one identifier: `my"table` becomes `"my""table"`.
pub fn quote_ident(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len().saturating_add(2));
    quoted.push('"');
    for c in name.chars() {
        if c == '"' {
            quoted.push('"');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// `"schema"."table"`, or just `"table"` when the schema is blank.
pub fn qualified(schema: &str, table: &str) -> String {
    if schema.trim().is_empty() {
        quote_ident(table)
    } else {
        format!("{}.{}", quote_ident(schema), quote_ident(table))
    }
}
