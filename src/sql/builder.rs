//! Statement buffer: SQL text plus structurally tracked, uniquely named parameters.

use serde_json::Value;
use std::collections::HashSet;

/// SQL flavour the statement is rendered for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `$n` placeholders, `ILIKE`, `::type` casts.
    #[default]
    Postgres,
    /// `?` placeholders, plain `LIKE`, no casts (MySQL, SQLite).
    Generic,
}

impl Dialect {
    /// Case-insensitive pattern match keyword.
    pub fn ci_like(self) -> &'static str {
        match self {
            Dialect::Postgres => "ILIKE",
            Dialect::Generic => "LIKE",
        }
    }

    fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", position),
            Dialect::Generic => "?".to_string(),
        }
    }
}

/// Quote identifier (safe for any input: embedded quotes are doubled).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `"alias"."column"`.
pub fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quoted(alias), quoted(column))
}

/// Full qualified table name; schema is optional.
pub fn qualified_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) => format!("{}.{}", quoted(s), quoted(table)),
        None => quoted(table),
    }
}

/// One bound parameter. `name` is unique within its statement.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BoundParam>,
    dialect: Dialect,
    names: HashSet<String>,
}

impl QueryBuf {
    pub fn new(dialect: Dialect) -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
            dialect,
            names: HashSet::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn push_sql(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Bind a value and return its placeholder. Params must be bound in the order
    /// their placeholders appear in the final text (required for `?` placeholders).
    pub fn bind(&mut self, name_hint: &str, value: Value) -> String {
        let name = self.unique_name(name_hint);
        self.names.insert(name.clone());
        self.params.push(BoundParam { name, value });
        self.dialect.placeholder(self.params.len())
    }

    /// Bind with an optional `::type` cast (Postgres only).
    pub fn bind_cast(&mut self, name_hint: &str, value: Value, cast: Option<&str>) -> String {
        let ph = self.bind(name_hint, value);
        match (self.dialect, cast) {
            (Dialect::Postgres, Some(t)) => format!("{}::{}", ph, t),
            _ => ph,
        }
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn values(&self) -> Vec<&Value> {
        self.params.iter().map(|p| &p.value).collect()
    }

    fn unique_name(&self, hint: &str) -> String {
        let mut base: String = hint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        if base.is_empty() {
            base.push('p');
        }
        if !self.names.contains(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !self.names.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}
