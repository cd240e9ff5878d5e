/*!
 * gridlink CLI style
 *
 * Tables and themed messages for the command-line front end.
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};
use std::time::SystemTime;

use crate::backend::DirEntry;
use crate::ops::PathMetadata;

// ============================================================================
// THEME COLORS
// ============================================================================

/// Colors for consistent styling
pub struct Theme;

impl Theme {
    pub fn primary<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).cyan()
    }

    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    /// Muted/secondary text (dim)
    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// Status icons
pub struct Icons;

impl Icons {
    pub const SUCCESS: &'static str = "✓";
    pub const ERROR: &'static str = "✗";
    pub const WARNING: &'static str = "⚠";
    pub const ARROW_RIGHT: &'static str = "→";
}

// ============================================================================
// TABLES
// ============================================================================

/// Create a minimal table (no outer borders)
pub fn create_minimal_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Collection listing: kind, permissions, size, modified, name
pub fn listing_table(entries: &[DirEntry]) -> Table {
    let mut table = create_minimal_table();
    table.set_header(vec!["", "Mode", "Size", "Modified", "Name"]);

    for entry in entries {
        let (marker, name) = if entry.is_collection() {
            (
                Cell::new("C").fg(Color::Cyan),
                Cell::new(format!("{}/", entry.name))
                    .fg(Color::Cyan)
                    .add_attribute(Attribute::Bold),
            )
        } else {
            (Cell::new("-"), Cell::new(&entry.name))
        };
        let size = if entry.is_collection() {
            String::new()
        } else {
            format_bytes(entry.metadata.size)
        };

        table.add_row(vec![
            marker,
            Cell::new(format_mode(entry.metadata.permissions)),
            Cell::new(size),
            Cell::new(format_modified(entry.metadata.modified)),
            name,
        ]);
    }

    table
}

/// Metadata triples of several paths, one row per triple
pub fn metadata_table(entries: &[PathMetadata]) -> Table {
    let mut table = create_minimal_table();
    table.set_header(vec!["Path", "Attribute", "Value", "Units"]);

    for entry in entries {
        if entry.avus.is_empty() {
            table.add_row(vec![
                Cell::new(&entry.path),
                Cell::new("(none)").fg(Color::DarkGrey),
                Cell::new(""),
                Cell::new(""),
            ]);
        }
        for avu in &entry.avus {
            table.add_row(vec![
                Cell::new(&entry.path),
                Cell::new(&avu.attribute).fg(Color::Cyan),
                Cell::new(&avu.value),
                Cell::new(&avu.units),
            ]);
        }
    }

    table
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let base = 1024.0_f64;
    let exp = (bytes_f.ln() / base.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f / base.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.2} {}", value, UNITS[exp])
    }
}

/// Octal permission bits, or `-` when the driver does not report them
pub fn format_mode(mode: Option<u32>) -> String {
    match mode {
        Some(mode) => format!("{:04o}", mode & 0o7777),
        None => "-".to_string(),
    }
}

/// Seconds since the epoch, or `-` when unknown
fn format_modified(modified: Option<SystemTime>) -> String {
    modified
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Print a styled error message with optional suggestion
pub fn print_error(message: &str, suggestion: Option<&str>) {
    eprintln!(
        "{} {}",
        Theme::error(format!("{} Error:", Icons::ERROR)),
        message
    );

    if let Some(hint) = suggestion {
        eprintln!(
            "  {} {}",
            Theme::muted(Icons::ARROW_RIGHT),
            Theme::muted(hint)
        );
    }
}

/// Print a styled warning message
pub fn print_warning(message: &str) {
    eprintln!(
        "{} {}",
        Theme::warning(Icons::WARNING.to_string()),
        Theme::warning(message)
    );
}

/// Print a styled success message
pub fn print_success(message: &str) {
    println!(
        "{} {}",
        Theme::success(Icons::SUCCESS.to_string()),
        Theme::success(message)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Avu, Metadata};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_theme_keeps_text() {
        assert!(Theme::primary("grid.example.org:1247")
            .to_string()
            .contains("grid.example.org:1247"));
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(Some(0o100644)), "0644");
        assert_eq!(format_mode(Some(0o755)), "0755");
        assert_eq!(format_mode(None), "-");
    }

    #[test]
    fn test_tables_render_every_entry() {
        let entries = vec![
            DirEntry::new("raw", "/obs/raw", Metadata::collection()),
            DirEntry::new("ctd.csv", "/obs/ctd.csv", Metadata::file(2048)),
        ];
        let rendered = listing_table(&entries).to_string();
        assert!(rendered.contains("raw/"));
        assert!(rendered.contains("ctd.csv"));
        assert!(rendered.contains("2.00 KB"));

        let meta = vec![PathMetadata {
            path: "/obs/ctd.csv".to_string(),
            avus: vec![Avu::new("depth", "12").with_units("m")],
        }];
        let rendered = metadata_table(&meta).to_string();
        assert!(rendered.contains("depth"));
        assert!(rendered.contains("/obs/ctd.csv"));
    }
}
