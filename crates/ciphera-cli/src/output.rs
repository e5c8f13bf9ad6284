//! Output formatting utilities.

use ciphera_ledger::LedgerEntry;

/// Formats an entry as a table row.
pub fn format_entry_row(entry: &LedgerEntry) -> String {
    format!(
        "{:<6} {:<15} {:<32} {}",
        entry.seq,
        entry.event_type,
        truncate(&entry.timestamp.to_rfc3339(), 32),
        truncate(&entry.entry_hash.b64, 44)
    )
}

/// Prints the entry table header.
#[allow(clippy::print_literal)]
pub fn print_entry_header() {
    println!(
        "{:<6} {:<15} {:<32} {}",
        "SEQ", "TYPE", "TIMESTAMP", "ENTRY_HASH"
    );
    println!("{}", "-".repeat(100));
}

/// Shortens `s` to at most `max_len` characters.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
