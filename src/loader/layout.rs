use super::text::PositionedWord;

/// Horizontal gap (in page units) between the end of one word and the start
/// of the next that opens a new column.
pub const COLUMN_GAP: f32 = 20.0;

/// Vertical band (in page units) within which words share a line.
pub const LINE_TOLERANCE: f32 = 3.0;

/// Marker inserted between columns so downstream pattern matching never spans
/// a column boundary.
pub const COLUMN_BREAK: &str = "\n\n[QUEBRA_DE_COLUNA]\n\n";

/// Rebuild reading-order text from positioned words: columns left-to-right,
/// lines top-to-bottom inside each column, words left-to-right inside each
/// line. A page with no words yields an empty string.
pub fn reconstruct_page(words: &[PositionedWord]) -> String {
    if words.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<&PositionedWord> = words.iter().collect();
    sorted.sort_by(|a, b| a.x0.partial_cmp(&b.x0).unwrap_or(std::cmp::Ordering::Equal));

    // Scan left-to-right; a gap strictly greater than COLUMN_GAP between the
    // previous word's end and the next word's start separates columns.
    let mut columns: Vec<Vec<&PositionedWord>> = Vec::new();
    let mut current = vec![sorted[0]];
    for pair in sorted.windows(2) {
        let (prev, word) = (pair[0], pair[1]);
        if word.x0 - prev.x1 > COLUMN_GAP {
            columns.push(std::mem::take(&mut current));
        }
        current.push(word);
    }
    columns.push(current);

    let column_texts: Vec<String> = columns.iter().map(|col| column_text(col)).collect();
    column_texts.join(COLUMN_BREAK)
}

/// Group a column's words into lines keyed by rounded vertical position, then
/// emit lines top-to-bottom with words ordered left-to-right.
fn column_text(column: &[&PositionedWord]) -> String {
    let mut lines: Vec<(i32, Vec<&PositionedWord>)> = Vec::new();

    for word in column {
        let y = word.top.round() as i32;
        let band = lines
            .iter()
            .position(|(line_y, _)| (y - *line_y).abs() as f32 <= LINE_TOLERANCE);
        match band {
            Some(i) => lines[i].1.push(word),
            None => lines.push((y, vec![word])),
        }
    }

    lines.sort_by_key(|(y, _)| *y);

    let rendered: Vec<String> = lines
        .iter_mut()
        .map(|(_, members)| {
            members.sort_by(|a, b| {
                a.x0.partial_cmp(&b.x0).unwrap_or(std::cmp::Ordering::Equal)
            });
            members
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();

    rendered.join("\n")
}
