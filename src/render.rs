//! Bordered text grids, shared by `console.table` and SQL result rendering.

/// Render `columns` and `rows` as a box-drawing grid.
///
/// Column widths are the widest cell (in chars) of each column, header
/// included. Rows shorter than the header are padded with empty cells.
pub fn grid(columns: &[String], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    out.push_str(&border(&widths, '┌', '┬', '┐'));
    out.push_str(&line(columns, &widths));
    out.push_str(&border(&widths, '├', '┼', '┤'));
    for row in rows {
        out.push_str(&line(row, &widths));
    }
    out.push_str(&border(&widths, '└', '┴', '┘'));
    out.truncate(out.trim_end_matches('\n').len());
    out
}

fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    format!("{left}{}{right}\n", segments.join(&mid.to_string()))
}

fn line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, width)| {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let pad = width.saturating_sub(cell.chars().count());
            format!(" {cell}{} ", " ".repeat(pad))
        })
        .collect();
    format!("│{}│\n", padded.join("│"))
}
