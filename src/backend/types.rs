//! Common types for the driver layer

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Kind of a remote namespace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular data object
    File,
    /// Collection (directory)
    Collection,
}

/// File/collection metadata as reported by a driver
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Size in bytes (0 for collections)
    pub size: u64,

    /// Entry kind
    pub kind: EntryKind,

    /// Last modification time, if the driver knows it
    pub modified: Option<SystemTime>,

    /// Unix-style permission bits, if the driver knows them
    pub permissions: Option<u32>,
}

impl Metadata {
    /// Create metadata for a file
    pub fn file(size: u64) -> Self {
        Self {
            size,
            kind: EntryKind::File,
            modified: None,
            permissions: None,
        }
    }

    /// Create metadata for a collection
    pub fn collection() -> Self {
        Self {
            size: 0,
            kind: EntryKind::Collection,
            modified: None,
            permissions: None,
        }
    }

    /// Builder pattern: set modification time
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Builder pattern: set permissions
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_collection(&self) -> bool {
        self.kind == EntryKind::Collection
    }
}

/// Entry returned by a collection listing
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    /// Last path component
    pub name: String,

    /// Absolute remote path
    pub path: String,

    /// Entry metadata
    pub metadata: Metadata,
}

impl DirEntry {
    /// Create a new directory entry
    pub fn new(name: impl Into<String>, path: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            metadata,
        }
    }

    pub fn is_file(&self) -> bool {
        self.metadata.is_file()
    }

    pub fn is_collection(&self) -> bool {
        self.metadata.is_collection()
    }
}

/// User metadata triple attached to a remote path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Avu {
    pub attribute: String,
    pub value: String,
    #[serde(default)]
    pub units: String,
}

impl Avu {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            units: String::new(),
        }
    }

    /// Builder pattern: set units
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }
}

impl fmt::Display for Avu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.units.is_empty() {
            write!(f, "{} = {}", self.attribute, self.value)
        } else {
            write!(f, "{} = {} {}", self.attribute, self.value, self.units)
        }
    }
}

/// Comparison operator of a metadata condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    /// SQL-style pattern with `%` and `_` wildcards
    Like,
    NotLike,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
            Operator::Like => "like",
            Operator::NotLike => "not like",
        }
    }

    /// Apply the operator to `left <op> right`.
    ///
    /// Ordering comparisons are numeric when both sides parse as numbers.
    pub fn compare(&self, left: &str, right: &str) -> bool {
        match self {
            Operator::Like => like_matches(left, right),
            Operator::NotLike => !like_matches(left, right),
            _ => {
                let ordering = match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
                    (Ok(l), Ok(r)) => l.partial_cmp(&r),
                    _ => Some(left.cmp(right)),
                };
                let Some(ordering) = ordering else {
                    return false;
                };
                match self {
                    Operator::Equal => ordering == Ordering::Equal,
                    Operator::NotEqual => ordering != Ordering::Equal,
                    Operator::LessThan => ordering == Ordering::Less,
                    Operator::GreaterThan => ordering == Ordering::Greater,
                    Operator::LessOrEqual => ordering != Ordering::Greater,
                    Operator::GreaterOrEqual => ordering != Ordering::Less,
                    Operator::Like | Operator::NotLike => false,
                }
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Equal),
            "<>" | "!=" => Ok(Operator::NotEqual),
            "<" => Ok(Operator::LessThan),
            ">" => Ok(Operator::GreaterThan),
            "<=" => Ok(Operator::LessOrEqual),
            ">=" => Ok(Operator::GreaterOrEqual),
            "like" => Ok(Operator::Like),
            "not like" => Ok(Operator::NotLike),
            other => Err(format!("unknown metadata operator '{}'", other)),
        }
    }
}

/// `attribute <op> value` condition of a metadata query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCondition {
    pub attribute: String,
    pub operator: Operator,
    pub value: String,
}

impl MetadataCondition {
    pub fn new(attribute: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value: value.into(),
        }
    }

    /// True if `avu` satisfies this condition
    pub fn matches(&self, avu: &Avu) -> bool {
        avu.attribute == self.attribute && self.operator.compare(&avu.value, &self.value)
    }
}

impl fmt::Display for MetadataCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} '{}'",
            self.attribute,
            self.operator,
            self.value.replace('\'', "''")
        )
    }
}

impl FromStr for MetadataCondition {
    type Err = String;

    /// Parse `attribute op value`, e.g. `site = Kaneohe` or `depth >= 10`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const OPERATORS: [&str; 10] = [
            " not like ", " like ", "<>", "!=", "<=", ">=", "==", "=", "<", ">",
        ];

        let lower = s.to_ascii_lowercase();
        for token in OPERATORS {
            if let Some(at) = lower.find(token) {
                let attribute = s[..at].trim();
                let value = s[at + token.len()..].trim().trim_matches('\'');
                if attribute.is_empty() {
                    return Err(format!("missing attribute in condition '{}'", s));
                }
                return Ok(Self::new(attribute, token.trim().parse()?, value));
            }
        }

        Err(format!("no operator found in condition '{}'", s))
    }
}

/// Render conditions as a conjunctive query fragment
pub fn render_query(conditions: &[MetadataCondition]) -> String {
    conditions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Output of a command executed on the remote side
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

fn like_matches(value: &str, pattern: &str) -> bool {
    let mut glob_pattern = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '%' => glob_pattern.push('*'),
            '_' => glob_pattern.push('?'),
            other => glob_pattern.push_str(&glob::Pattern::escape(&other.to_string())),
        }
    }

    match glob::Pattern::new(&glob_pattern) {
        Ok(compiled) => compiled.matches(value),
        Err(_) => value == pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_constructors() {
        let meta = Metadata::file(42).with_permissions(0o644);
        assert!(meta.is_file());
        assert_eq!(meta.size, 42);
        assert_eq!(meta.permissions, Some(0o644));
        assert!(Metadata::collection().is_collection());
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!("=".parse::<Operator>().unwrap(), Operator::Equal);
        assert_eq!("NOT   LIKE".parse::<Operator>().unwrap(), Operator::NotLike);
        assert_eq!("!=".parse::<Operator>().unwrap(), Operator::NotEqual);
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(Operator::GreaterThan.compare("10", "9"));
        assert!(!Operator::GreaterThan.compare("10", "9.5e1"));
        assert!(Operator::LessOrEqual.compare("3.0", "3"));
    }

    #[test]
    fn test_string_comparison() {
        assert!(Operator::LessThan.compare("apple", "banana"));
        assert!(Operator::Equal.compare("Kaneohe", "Kaneohe"));
        assert!(Operator::NotEqual.compare("Kaneohe", "Hilo"));
    }

    #[test]
    fn test_like() {
        assert!(Operator::Like.compare("adcp_2008.bin", "adcp%"));
        assert!(Operator::Like.compare("run_7", "run__"));
        assert!(!Operator::Like.compare("run_77", "run__"));
        assert!(Operator::NotLike.compare("ctd.csv", "adcp%"));
        assert!(Operator::Like.compare("a[1]", "a[1]"));
    }

    #[test]
    fn test_condition_display_quotes_value() {
        let cond = MetadataCondition::new("owner", Operator::Equal, "o'brien");
        assert_eq!(cond.to_string(), "owner = 'o''brien'");
    }

    #[test]
    fn test_condition_parse() {
        let cond: MetadataCondition = "depth >= 10".parse().unwrap();
        assert_eq!(cond.attribute, "depth");
        assert_eq!(cond.operator, Operator::GreaterOrEqual);
        assert_eq!(cond.value, "10");

        let cond: MetadataCondition = "site like 'Kane%'".parse().unwrap();
        assert_eq!(cond.operator, Operator::Like);
        assert_eq!(cond.value, "Kane%");

        let cond: MetadataCondition = "site not like Hilo%".parse().unwrap();
        assert_eq!(cond.operator, Operator::NotLike);

        assert!("= 3".parse::<MetadataCondition>().is_err());
        assert!("depth".parse::<MetadataCondition>().is_err());
    }

    #[test]
    fn test_render_query() {
        let conditions = vec![
            MetadataCondition::new("site", Operator::Equal, "Kaneohe"),
            MetadataCondition::new("depth", Operator::GreaterThan, "5"),
        ];
        assert_eq!(
            render_query(&conditions),
            "site = 'Kaneohe' and depth > '5'"
        );
    }
}
