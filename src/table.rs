use std::borrow::Cow;
use std::fmt::Write as _;

pub const MAX_CELL_WIDTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| cell_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(cell_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).clamp(3, MAX_CELL_WIDTH);
    }
    let aligns = (0..column_count)
        .map(|idx| column_alignment(rows, idx))
        .collect::<Vec<_>>();

    let mut output = String::new();
    let header_aligns = vec![Align::Left; column_count];
    let _ = writeln!(output, "{}", format_row(headers, &widths, &header_aligns));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, &header_aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &aligns));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn column_alignment(rows: &[Vec<String>], idx: usize) -> Align {
    let mut cells = rows
        .iter()
        .filter_map(|row| row.get(idx))
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty())
        .peekable();
    if cells.peek().is_none() {
        return Align::Left;
    }
    if cells.all(|cell| cell.parse::<f64>().is_ok()) {
        Align::Right
    } else {
        Align::Left
    }
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .zip(aligns)
        .map(|((value, width), align)| {
            let fitted = fit_cell(value, *width);
            let padding = " ".repeat(width.saturating_sub(cell_width(&fitted)));
            match align {
                Align::Left => format!("{fitted}{padding}"),
                Align::Right => format!("{padding}{fitted}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn cell_width(value: &str) -> usize {
    value.chars().count()
}

/// Flattens control whitespace and truncates to `width` characters.
fn fit_cell(value: &str, width: usize) -> Cow<'_, str> {
    let needs_flatten = value.contains(['\n', '\r', '\t']);
    if !needs_flatten && cell_width(value) <= width {
        return Cow::Borrowed(value);
    }
    let flattened = value
        .chars()
        .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch });
    if cell_width(value) <= width {
        return Cow::Owned(flattened.collect());
    }
    let mut cut = flattened.take(width.saturating_sub(1)).collect::<String>();
    cut.push('…');
    Cow::Owned(cut)
}
