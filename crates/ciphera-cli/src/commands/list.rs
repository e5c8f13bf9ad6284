//! List command implementation.

use ciphera_canonical::EventType;
use ciphera_ledger::{LedgerFileReader, ReadMode};

use crate::output;

pub fn run(
    ledger: String,
    json: bool,
    event_type: Option<String>,
    max_entries: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let event_type = event_type
        .map(EventType::parse)
        .transpose()
        .map_err(|e| format!("Invalid event type: {}", e))?;

    let mut reader = LedgerFileReader::open(&ledger, ReadMode::Strict)
        .map_err(|e| format!("Failed to open ledger file: {}: {}", ledger, e))?;

    if !json {
        output::print_entry_header();
    }

    let mut shown: u64 = 0;
    while let Some(entry) = reader.read_entry()? {
        if let Some(max) = max_entries {
            if shown >= max {
                break;
            }
        }
        if let Some(wanted) = &event_type {
            if &entry.event_type != wanted {
                continue;
            }
        }

        if json {
            println!("{}", serde_json::to_string(&entry)?);
        } else {
            println!("{}", output::format_entry_row(&entry));
        }
        shown += 1;
    }

    Ok(())
}
