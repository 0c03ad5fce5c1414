use crate::records::{format_timestamp, ValveLog};
use anyhow::{Context, Result};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SHEET_NAME: &str = "Logs";
pub const HEADERS: [&str; 4] = ["Changed Field", "Old Value", "New Value", "Timestamp"];
pub const PDF_TITLE: &str = "Valve Update Logs";

// A4 portrait; offsets are measured from the top edge
const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN_X: f32 = 10.0;
const TITLE_Y: f32 = 10.0;
const FIRST_LINE_Y: f32 = 20.0;
const LINE_STEP: f32 = 10.0;
const PAGE_BREAK_Y: f32 = 270.0;
const TOP_Y: f32 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "valve_logs.xlsx",
            ExportFormat::Pdf => "valve_logs.pdf",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "Excel",
            ExportFormat::Pdf => "PDF",
        }
    }
}

/// Sentence used for a log entry in the log view and the PDF.
pub fn log_sentence(log: &ValveLog) -> String {
    format!(
        "{} updated from \"{}\" to \"{}\" on {}",
        log.changed_field,
        log.old_value,
        log.new_value,
        format_timestamp(&log.timestamp)
    )
}

pub fn log_rows(logs: &[ValveLog]) -> Vec<[String; 4]> {
    logs.iter()
        .map(|l| {
            [
                l.changed_field.clone(),
                l.old_value.clone(),
                l.new_value.clone(),
                format_timestamp(&l.timestamp),
            ]
        })
        .collect()
}

pub fn write_xlsx(logs: &[ValveLog], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_fmt = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    for (col, h) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *h, &header_fmt)?;
        sheet.set_column_width(col as u16, 24)?;
    }
    for (i, row) in log_rows(logs).iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            sheet.write_string(i as u32 + 1, col as u16, cell.as_str())?;
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Place lines on pages: the first page starts below the title, a new page
/// begins once the next offset passes the break line. No trailing empty page.
pub fn pdf_layout(lines: &[String]) -> Vec<Vec<(f32, String)>> {
    let mut pages: Vec<Vec<(f32, String)>> = vec![Vec::new()];
    let mut y = FIRST_LINE_Y;
    for (i, line) in lines.iter().enumerate() {
        if let Some(page) = pages.last_mut() {
            page.push((y, line.clone()));
        }
        y += LINE_STEP;
        if y > PAGE_BREAK_Y && i + 1 < lines.len() {
            pages.push(Vec::new());
            y = TOP_Y;
        }
    }
    pages
}

pub fn write_pdf(logs: &[ValveLog], path: &Path) -> Result<()> {
    let lines: Vec<String> = logs.iter().map(log_sentence).collect();
    let layout = pdf_layout(&lines);
    let (doc, first_page, first_layer) =
        PdfDocument::new(PDF_TITLE, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .context("loading builtin font")?;
    for (i, page_lines) in layout.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
            doc.get_page(p).get_layer(l)
        };
        if i == 0 {
            layer.use_text(PDF_TITLE, 16.0, Mm(MARGIN_X), Mm(PAGE_H - TITLE_Y), &font);
        }
        for (y, text) in page_lines {
            layer.use_text(text.as_str(), 12.0, Mm(MARGIN_X), Mm(PAGE_H - y), &font);
        }
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    doc.save(&mut BufWriter::new(file))
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Write `logs` into `dir` in the chosen format and return the file path.
pub fn export_logs(format: ExportFormat, logs: &[ValveLog], dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format.file_name());
    match format {
        ExportFormat::Xlsx => write_xlsx(logs, &path)?,
        ExportFormat::Pdf => write_pdf(logs, &path)?,
    }
    info!(path = %path.display(), entries = logs.len(), "exported valve logs");
    Ok(path)
}
