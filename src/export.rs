//! Spreadsheet export: timesheet entries → single-sheet `.xlsx` workbook.
//!
//! The workbook is written directly as SpreadsheetML parts into a zip
//! archive. Only what the download needs is emitted: one worksheet with
//! inline strings, a stylesheet with four cell formats, and column widths.
//!
//! | Style | Used for                                            |
//! |-------|-----------------------------------------------------|
//! | 0     | default                                             |
//! | 1     | header row: bold white text on red, thin border     |
//! | 2     | body cell: thin border                              |
//! | 3     | status cell of a closed row: yellow fill, border    |

use crate::error::ExportError;
use crate::output::TimesheetEntry;
use chrono::{DateTime, Local};
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const SHEET_NAME: &str = "Timesheet Data";

const HEADERS: [&str; 7] = [
    "Employee Name",
    "Date",
    "Hours",
    "Submission Status",
    "Week",
    "Total Hours",
    "Source File",
];
const STATUS_COLUMN: usize = 3;
const MAX_COLUMN_WIDTH: usize = 40;

const STYLE_HEADER: u8 = 1;
const STYLE_BODY: u8 = 2;
const STYLE_CLOSED: u8 = 3;

/// Renders a job result for download.
pub trait SpreadsheetExporter: Send + Sync {
    fn render(&self, entries: &[TimesheetEntry]) -> Result<Vec<u8>, ExportError>;

    fn content_type(&self) -> &'static str;

    /// Download name for a result produced at `at`.
    fn file_name(&self, at: DateTime<Local>) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxExporter;

impl XlsxExporter {
    pub fn new() -> Self {
        Self
    }
}

impl SpreadsheetExporter for XlsxExporter {
    fn render(&self, entries: &[TimesheetEntry]) -> Result<Vec<u8>, ExportError> {
        let rows: Vec<[Cell; 7]> = entries.iter().map(row_cells).collect();
        let closed: Vec<bool> = entries.iter().map(TimesheetEntry::is_closed).collect();

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        for (name, body) in [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", ROOT_RELS.to_string()),
            ("xl/workbook.xml", workbook_xml()),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
            ("xl/styles.xml", STYLES.to_string()),
            ("xl/worksheets/sheet1.xml", sheet_xml(&rows, &closed)),
        ] {
            zip.start_file(name, options)?;
            zip.write_all(body.as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }

    fn content_type(&self) -> &'static str {
        XLSX_CONTENT_TYPE
    }

    fn file_name(&self, at: DateTime<Local>) -> String {
        format!("timesheet_data_{}.xlsx", at.format("%Y%m%d_%H%M%S"))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn display_len(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(n) => n.to_string().len(),
        }
    }
}

fn or_default(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn row_cells(e: &TimesheetEntry) -> [Cell; 7] {
    [
        Cell::Text(or_default(&e.employee_name, "Unknown")),
        Cell::Text(e.date.clone()),
        Cell::Number(e.hours),
        Cell::Text(or_default(&e.submission_status, "pending")),
        Cell::Text(e.week.clone()),
        Cell::Number(e.total_hours),
        Cell::Text(e.source_file.clone()),
    ]
}

/// `min(longest value + 2, 40)` per column, headers included.
fn column_widths(rows: &[[Cell; 7]]) -> [usize; 7] {
    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.display_len());
        }
    }
    widths.map(|w| (w + 2).min(MAX_COLUMN_WIDTH))
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// Drop characters XML 1.0 cannot carry.
fn xml_text(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|&c| c >= ' ' || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    escape(cleaned.as_str()).into_owned()
}

fn write_cell(out: &mut String, reference: &str, cell: &Cell, style: u8) {
    match cell {
        Cell::Text(s) => {
            let _ = write!(
                out,
                r#"<c r="{reference}" s="{style}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                xml_text(s)
            );
        }
        Cell::Number(n) if n.is_finite() => {
            let _ = write!(out, r#"<c r="{reference}" s="{style}"><v>{n}</v></c>"#);
        }
        Cell::Number(_) => {
            let _ = write!(out, r#"<c r="{reference}" s="{style}"/>"#);
        }
    }
}

fn sheet_xml(rows: &[[Cell; 7]], closed: &[bool]) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    );

    out.push_str("<cols>");
    for (i, width) in column_widths(rows).iter().enumerate() {
        let _ = write!(
            out,
            r#"<col min="{n}" max="{n}" width="{width}" customWidth="1"/>"#,
            n = i + 1
        );
    }
    out.push_str("</cols><sheetData>");

    out.push_str(r#"<row r="1">"#);
    for (i, header) in HEADERS.iter().enumerate() {
        let reference = format!("{}1", column_letter(i));
        write_cell(&mut out, &reference, &Cell::Text(header.to_string()), STYLE_HEADER);
    }
    out.push_str("</row>");

    for (r, (row, is_closed)) in rows.iter().zip(closed).enumerate() {
        let row_num = r + 2;
        let _ = write!(out, r#"<row r="{row_num}">"#);
        for (c, cell) in row.iter().enumerate() {
            let style = if c == STATUS_COLUMN && *is_closed {
                STYLE_CLOSED
            } else {
                STYLE_BODY
            };
            let reference = format!("{}{}", column_letter(c), row_num);
            write_cell(&mut out, &reference, cell, style);
        }
        out.push_str("</row>");
    }

    out.push_str("</sheetData></worksheet>");
    out
}

fn workbook_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape(SHEET_NAME)
    )
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><color rgb="FFFFFFFF"/><name val="Calibri"/></font></fonts><fills count="4"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FFCC0000"/><bgColor indexed="64"/></patternFill></fill><fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill></fills><borders count="2"><border><left/><right/><top/><bottom/><diagonal/></border><border><left style="thin"><color auto="1"/></left><right style="thin"><color auto="1"/></right><top style="thin"><color auto="1"/></top><bottom style="thin"><color auto="1"/></bottom><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="4"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="2" borderId="1" xfId="0" applyFont="1" applyFill="1" applyBorder="1" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf><xf numFmtId="0" fontId="0" fillId="0" borderId="1" xfId="0" applyBorder="1"/><xf numFmtId="0" fontId="0" fillId="3" borderId="1" xfId="0" applyFill="1" applyBorder="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;
