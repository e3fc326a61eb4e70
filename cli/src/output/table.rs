//! Boxed table rendering for `list` and `show` results.

use console::measure_text_width;
use owo_colors::OwoColorize as _;

use super::Styles;

/// Column whose cells are colored by value.
const STATUS_COLUMN: &str = "status";

/// Render `header` and `rows` as a bordered table, rows sorted.
///
/// Short rows are padded with empty cells; extra cells are dropped.
#[must_use]
pub fn render(header: &[String], rows: &[Vec<String>], styles: &Styles) -> String {
    let mut rows: Vec<&Vec<String>> = rows.iter().collect();
    rows.sort();

    let mut widths: Vec<usize> = header.iter().map(|h| measure_text_width(h)).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(measure_text_width(cell));
        }
    }
    let status_col = header.iter().position(|h| h == STATUS_COLUMN);

    let border = border(&widths, styles);
    let bar = format!("{}", "|".style(styles.dim));
    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    out.push_str(&line(&bar, header.iter().zip(&widths).map(|(h, w)| {
        pad(&format!("{}", h.style(styles.header)), h, *w)
    })));
    out.push_str(&border);
    out.push('\n');
    for row in rows {
        let cells = widths.iter().enumerate().map(|(i, w)| {
            let cell = row.get(i).map_or("", String::as_str);
            let styled = if Some(i) == status_col {
                format!("{}", cell.style(styles.status(cell)))
            } else {
                cell.to_string()
            };
            pad(&styled, cell, *w)
        });
        out.push_str(&line(&bar, cells));
    }
    out.push_str(&border);
    out
}

fn border(widths: &[usize], styles: &Styles) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(w + 2));
        s.push('+');
    }
    format!("{}", s.style(styles.dim))
}

fn line(bar: &str, cells: impl Iterator<Item = String>) -> String {
    let mut s = bar.to_string();
    for cell in cells {
        s.push(' ');
        s.push_str(&cell);
        s.push(' ');
        s.push_str(bar);
    }
    s.push('\n');
    s
}

/// Pad `styled` to `width` using the display width of the unstyled `raw`.
fn pad(styled: &str, raw: &str, width: usize) -> String {
    let fill = width.saturating_sub(measure_text_width(raw));
    format!("{styled}{}", " ".repeat(fill))
}
