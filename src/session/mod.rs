use anyhow::{Result, bail};
use std::io::BufRead;

use crate::error::{ErrorCode, SightError};
use crate::models::commit::CommitRecord;

/// Maximum line size for replay input: 100 MB.
const MAX_LINE_SIZE: usize = 100 * 1024 * 1024;

/// Whether the replay should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayFlow {
    Continue,
    Stop,
}

/// Feed NDJSON commit records to `handler`, oldest first.
///
/// Blank lines are skipped. The stream is the only input, so an unreadable
/// or malformed line aborts the replay.
pub fn run_replay(
    reader: impl BufRead,
    mut handler: impl FnMut(CommitRecord) -> Result<ReplayFlow>,
) -> Result<()> {
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.len() > MAX_LINE_SIZE {
            bail!(SightError::new(
                ErrorCode::InvalidRequest,
                format!(
                    "Line {line_no} exceeds maximum size ({} bytes > {MAX_LINE_SIZE} bytes)",
                    trimmed.len()
                ),
            ));
        }

        let record = serde_json::from_str::<CommitRecord>(trimmed).map_err(|e| {
            SightError::new(
                ErrorCode::InvalidRequest,
                format!("Invalid commit record on line {line_no}: {e}"),
            )
        })?;

        if handler(record)? == ReplayFlow::Stop {
            break;
        }
    }

    Ok(())
}
