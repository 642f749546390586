//! Call report generation.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::leads::Lead;

/// Trait for writing a lead report to an output.
pub trait ReportExporter {
    fn export(&self, leads: &[&Lead], out: &mut dyn Write) -> Result<()>;
}

/// Plain-text report: one aligned row per lead.
pub struct TextReportExporter;

const HEADERS: [&str; 4] = ["Customer", "City", "Status", "Interaction Summary"];

impl ReportExporter for TextReportExporter {
    fn export(&self, leads: &[&Lead], out: &mut dyn Write) -> Result<()> {
        let rows: Vec<[String; 4]> = leads
            .iter()
            .map(|lead| {
                [
                    lead.name.clone(),
                    lead.city.clone(),
                    lead.status.to_string(),
                    lead.summary.clone().unwrap_or_default(),
                ]
            })
            .collect();

        // Column widths sized to the widest cell; the last column is left
        // unpadded so summaries don't trail whitespace.
        let mut widths: [usize; 4] = HEADERS.map(|h| h.chars().count());
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        write_row(out, &HEADERS.map(String::from), &widths)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_row(out, &rule, &widths)?;
        for row in &rows {
            write_row(out, row, &widths)?;
        }
        Ok(())
    }
}

/// Exporter that collects report rows in memory instead of writing them.
#[derive(Debug, Clone, Default)]
pub struct CollectorExporter {
    rows: Arc<Mutex<Vec<[String; 4]>>>,
}

impl CollectorExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows collected by every export so far.
    pub fn rows(&self) -> Vec<[String; 4]> {
        self.rows.lock().expect("collector mutex poisoned").clone()
    }
}

impl ReportExporter for CollectorExporter {
    fn export(&self, leads: &[&Lead], _out: &mut dyn Write) -> Result<()> {
        let mut rows = self.rows.lock().expect("collector mutex poisoned");
        for lead in leads {
            rows.push([
                lead.name.clone(),
                lead.city.clone(),
                lead.status.to_string(),
                lead.summary.clone().unwrap_or_default(),
            ]);
        }
        Ok(())
    }
}

fn write_row<S: AsRef<str>>(out: &mut dyn Write, cells: &[S], widths: &[usize]) -> Result<()> {
    let mut line = String::new();
    let last = cells.len() - 1;
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        let cell = cell.as_ref();
        if i == last {
            line.push_str(cell);
        } else {
            line.push_str(cell);
            let pad = width.saturating_sub(cell.chars().count()) + 2;
            line.extend(std::iter::repeat_n(' ', pad));
        }
    }
    writeln!(out, "{}", line.trim_end())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::{LeadBook, LeadDraft, LeadStatus};

    fn sample_book() -> LeadBook {
        let mut book = LeadBook::new();
        let ids = book.ingest(vec![
            LeadDraft {
                name: "Maria Lopez".to_string(),
                city: "Valencia".to_string(),
                phone: None,
                notes: None,
            },
            LeadDraft {
                name: "Jan Novak".to_string(),
                city: "Prague".to_string(),
                phone: None,
                notes: None,
            },
        ]);
        let maria = book.get_mut(ids[0]).unwrap();
        maria.status = LeadStatus::Called;
        maria.set_summary("Asked about pricing, wants a follow-up email.");
        book
    }

    fn render(book: &LeadBook) -> String {
        let leads: Vec<&Lead> = book.iter().collect();
        let mut out = Vec::new();
        TextReportExporter.export(&leads, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn report_has_header_rule_and_one_row_per_lead() {
        let text = render(&sample_book());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Customer"));
        assert!(lines[0].contains("Interaction Summary"));
        assert!(lines[1].chars().all(|c| c == '-' || c == ' '));
        assert!(lines[2].contains("Maria Lopez"));
        assert!(lines[3].contains("Jan Novak"));
    }

    #[test]
    fn report_columns_are_aligned() {
        let text = render(&sample_book());
        let lines: Vec<&str> = text.lines().collect();
        // "City" starts at the same byte offset on every line (ASCII cells).
        let city_col = lines[0].find("City").unwrap();
        assert_eq!(&lines[2][city_col..city_col + 8], "Valencia");
        assert_eq!(&lines[3][city_col..city_col + 6], "Prague");
    }

    #[test]
    fn uncalled_lead_has_empty_summary_cell() {
        let text = render(&sample_book());
        let jan_line = text.lines().find(|l| l.contains("Jan Novak")).unwrap();
        assert!(jan_line.trim_end().ends_with("pending"));
    }

    #[test]
    fn called_lead_shows_status_and_summary() {
        let text = render(&sample_book());
        let maria_line = text.lines().find(|l| l.contains("Maria Lopez")).unwrap();
        assert!(maria_line.contains("called"));
        assert!(maria_line.contains("wants a follow-up email"));
    }

    #[test]
    fn collector_captures_one_row_per_lead() {
        let book = sample_book();
        let leads: Vec<&Lead> = book.iter().collect();
        let collector = CollectorExporter::new();
        let mut unused: Vec<u8> = Vec::new();
        collector.export(&leads, &mut unused).unwrap();

        let rows = collector.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "Maria Lopez");
        assert_eq!(rows[0][2], "called");
        assert_eq!(rows[1][3], "");
    }

    #[test]
    fn empty_book_renders_header_only() {
        let book = LeadBook::new();
        let text = render(&book);
        assert_eq!(text.lines().count(), 2);
    }
}
