//! Extraction instructions sent alongside each image batch.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::instruction`]; the constant here is
//! used only when no override is provided.

/// Default instruction for reading timesheet screenshots.
///
/// Describes the two regions of a timesheet screen (the date/hours grid and
/// the status side panel) and the exact JSON shape expected back.
pub const DEFAULT_INSTRUCTION: &str = r#"Analyze these timesheet screenshots and extract ALL entries. Look carefully at BOTH the main timesheet table AND the right panel.

IMPORTANT: The submission status is shown in the right panel and may be highlighted in YELLOW. Look for:
- "State" section in right panel
- Status like "Closed", "Open", "Submitted", "Pending", "Approved"
- Yellow highlighting indicates the current status

From the main table, extract:
- Employee name (from a title like "Jane D / 2025-06-07 / Week 23")
- Each date row with hours
- All individual timesheet entries

From the right panel, extract:
- Current submission status (look for yellow highlighting)
- Week information
- Total hours

Return ONLY a JSON array:
[
    {
        "employee_name": "Jane D",
        "date": "06/09/2025",
        "hours": 8.0,
        "submission_status": "Closed",
        "week": "Week 23",
        "total_hours": 40.0
    }
]

CRITICAL RULES:
- Extract ALL individual date entries from the table
- Use the status from the right panel (yellow highlighted area)
- Convert dates to MM/DD/YYYY format
- Include week information if available
- If status is highlighted in yellow, that's the current status
- Common statuses: Closed, Open, Submitted, Pending, Approved"#;

/// Build the instruction for one batch of one file.
///
/// The file name and batch number are prefixed so the model (and anyone
/// reading provider-side logs) can tell batches of the same file apart.
pub fn batch_instruction(file_name: &str, batch_num: usize, body: Option<&str>) -> String {
    format!(
        "File: {} (Batch {})\n\n{}",
        file_name,
        batch_num,
        body.unwrap_or(DEFAULT_INSTRUCTION)
    )
}
