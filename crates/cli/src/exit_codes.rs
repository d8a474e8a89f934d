//! CLI Exit Code Registry
//!
//! Single source of truth for `cruce` exit codes. Scripts branch on these, so
//! existing values never change meaning.
//!
//! | Code | Stage    | Description                                         |
//! |------|----------|-----------------------------------------------------|
//! | 0    | -        | Success                                             |
//! | 1    | match    | Findings present and `--strict` was given           |
//! | 2    | -        | Usage error (bad arguments, unusable paths)         |
//! | 3    | load     | Input workbook or rows could not be loaded          |
//! | 4    | load     | Requested sheet does not exist                      |
//! | 5    | write    | Output workbook or report could not be written      |
//! | 6    | config   | Configuration file unreadable or invalid            |

// =============================================================================
// Universal
// =============================================================================

/// Success - run completed, findings (if any) reported.
pub const EXIT_SUCCESS: u8 = 0;

/// Findings - not-found invoices or discrepancies exist and `--strict` was set.
/// Like `diff(1)`, exit 1 means "inputs disagree."
pub const EXIT_FINDINGS: u8 = 1;

/// Usage error - bad arguments, output path equal to input.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Stages
// =============================================================================

/// Workbook missing or unreadable, row limit exceeded, invalid key/folio cells.
pub const EXIT_LOAD: u8 = 3;

/// Sheet not present in the workbook.
pub const EXIT_SHEET_NOT_FOUND: u8 = 4;

/// Output workbook or JSON report could not be written.
pub const EXIT_WRITE: u8 = 5;

/// Config file unreadable, malformed or failing validation.
pub const EXIT_CONFIG: u8 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FINDINGS,
            EXIT_USAGE,
            EXIT_LOAD,
            EXIT_SHEET_NOT_FOUND,
            EXIT_WRITE,
            EXIT_CONFIG,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
