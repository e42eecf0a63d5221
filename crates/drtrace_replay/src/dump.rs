//! Code dump for a tracked block.

use drtrace_log::{BlockCreated, CodeChunk};

/// Format one chunk as `pc: aa bb cc`
#[must_use]
pub fn format_chunk(chunk: &CodeChunk<'_>) -> String {
    let mut line = format!("{:#x}:", chunk.pc);
    for byte in chunk.code {
        line.push_str(&format!(" {:02x}", byte));
    }
    line
}

/// Dump lines for every chunk in the block's code region.
///
/// A truncated or overrunning chunk ends the dump with a warning; the
/// enclosing record has already been validated, so this never fails.
#[must_use]
pub fn code_lines(block: &BlockCreated<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    for chunk in block.chunks() {
        match chunk {
            Ok(chunk) => lines.push(format_chunk(&chunk)),
            Err(err) => {
                tracing::warn!(block = %block.id, error = %err, "code dump stopped");
                break;
            }
        }
    }
    lines
}

/// Log the code dump of `block`
pub fn log_code(block: &BlockCreated<'_>) {
    for line in code_lines(block) {
        tracing::info!(block = %block.id, "{}", line);
    }
}
