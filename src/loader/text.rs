use lopdf::content::Content;
use lopdf::{Dictionary, Document, Encoding, Object, ObjectId, Result as LopdfResult};
use std::collections::BTreeMap;

/// Joining tolerances for assembling words out of positioned characters,
/// matching the word extraction parameters of the upstream loader.
pub const X_TOLERANCE: f32 = 3.0;
pub const Y_TOLERANCE: f32 = 3.0;

/// Character advance is approximated from the font size; exact AFM widths are
/// not needed for column/line clustering, only relative positions.
const CHAR_WIDTH_RATIO: f32 = 0.5;

const DEFAULT_PAGE_HEIGHT: f32 = 842.0;

/// A word token with its horizontal extent and distance from the page top.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedWord {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
    pub top: f32,
}

#[derive(Debug, Clone)]
struct PositionedChar {
    ch: char,
    x: f32,
    width: f32,
    top: f32,
}

#[derive(Clone)]
struct TextState {
    text_matrix: [f32; 6],
    text_line_matrix: [f32; 6],
    font_key: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scaling: f32,
    leading: f32,
    rise: f32,
    // Horizontal displacement within the current text run, in text space.
    cursor: f32,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            text_matrix: IDENTITY,
            text_line_matrix: IDENTITY,
            font_key: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
            cursor: 0.0,
        }
    }
}

#[derive(Clone)]
struct GraphicsState {
    ctm: [f32; 6],
    text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        GraphicsState {
            ctm: IDENTITY,
            text: TextState::default(),
        }
    }
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply_matrices(a: &[f32; 6], b: &[f32; 6]) -> [f32; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn translate_matrix(tx: f32, ty: f32) -> [f32; 6] {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn transform_point(m: &[f32; 6], x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn operand_as_float(obj: &Object) -> f32 {
    match obj {
        Object::Integer(i) => *i as f32,
        Object::Real(f) => *f,
        _ => 0.0,
    }
}

fn matrix_from_operands(operands: &[Object]) -> [f32; 6] {
    let mut m = IDENTITY;
    for (i, obj) in operands.iter().take(6).enumerate() {
        m[i] = operand_as_float(obj);
    }
    m
}

fn page_height(page_dict: &Dictionary) -> f32 {
    page_dict
        .get(b"MediaBox")
        .and_then(|obj| obj.as_array())
        .ok()
        .and_then(|arr| {
            if arr.len() == 4 {
                Some(operand_as_float(&arr[3]) - operand_as_float(&arr[1]))
            } else {
                None
            }
        })
        .filter(|h| *h > 0.0)
        .unwrap_or(DEFAULT_PAGE_HEIGHT)
}

/// Extract positioned words from one page by interpreting its content stream.
/// A page without text operators yields an empty vector.
pub fn extract_words(doc: &Document, page_id: ObjectId) -> LopdfResult<Vec<PositionedWord>> {
    let content_data = doc.get_page_content(page_id)?;
    let content = Content::decode(&content_data)?;

    let page_dict = doc.get_dictionary(page_id)?;
    let height = page_height(page_dict);

    // A page without font resources (e.g. image-only) has no text to show.
    let fonts = match doc.get_page_fonts(page_id) {
        Ok(f) => f,
        Err(_) => return Ok(Vec::new()),
    };
    let encodings: BTreeMap<Vec<u8>, Encoding> = fonts
        .iter()
        .map(|(name, font)| font.get_font_encoding(doc).map(|enc| (name.clone(), enc)))
        .collect::<LopdfResult<BTreeMap<Vec<u8>, Encoding>>>()?;

    let mut gs_stack = vec![GraphicsState::default()];
    let mut chars: Vec<PositionedChar> = Vec::new();

    for op in &content.operations {
        let gs = gs_stack.last_mut().expect("graphics state stack is never empty");
        match op.operator.as_ref() {
            "q" => {
                let copy = gs.clone();
                gs_stack.push(copy);
            }
            "Q" => {
                if gs_stack.len() > 1 {
                    gs_stack.pop();
                }
            }
            "cm" => {
                let m = matrix_from_operands(&op.operands);
                gs.ctm = multiply_matrices(&m, &gs.ctm);
            }
            "BT" => {
                gs.text.text_matrix = IDENTITY;
                gs.text.text_line_matrix = IDENTITY;
                gs.text.cursor = 0.0;
            }
            "ET" => {
                gs.text.cursor = 0.0;
            }
            "Tf" => {
                if let (Some(Object::Name(name)), Some(size)) =
                    (op.operands.first(), op.operands.get(1))
                {
                    gs.text.font_key = Some(name.clone());
                    gs.text.font_size = operand_as_float(size);
                }
            }
            "Tc" => {
                if let Some(obj) = op.operands.first() {
                    gs.text.char_spacing = operand_as_float(obj);
                }
            }
            "Tw" => {
                if let Some(obj) = op.operands.first() {
                    gs.text.word_spacing = operand_as_float(obj);
                }
            }
            "Tz" => {
                if let Some(obj) = op.operands.first() {
                    gs.text.horizontal_scaling = operand_as_float(obj) / 100.0;
                }
            }
            "TL" => {
                if let Some(obj) = op.operands.first() {
                    gs.text.leading = operand_as_float(obj);
                }
            }
            "Ts" => {
                if let Some(obj) = op.operands.first() {
                    gs.text.rise = operand_as_float(obj);
                }
            }
            "Tm" => {
                let m = matrix_from_operands(&op.operands);
                gs.text.text_matrix = m;
                gs.text.text_line_matrix = m;
                gs.text.cursor = 0.0;
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (op.operands.first(), op.operands.get(1)) {
                    move_text_line(&mut gs.text, operand_as_float(tx), operand_as_float(ty));
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (op.operands.first(), op.operands.get(1)) {
                    let ty = operand_as_float(ty);
                    gs.text.leading = -ty;
                    move_text_line(&mut gs.text, operand_as_float(tx), ty);
                }
            }
            "T*" => {
                let leading = gs.text.leading;
                move_text_line(&mut gs.text, 0.0, -leading);
            }
            "Tj" | "TJ" => {
                show_text(&mut gs.text, &op.operands, &gs.ctm, &encodings, height, &mut chars);
            }
            "'" => {
                let leading = gs.text.leading;
                move_text_line(&mut gs.text, 0.0, -leading);
                show_text(&mut gs.text, &op.operands, &gs.ctm, &encodings, height, &mut chars);
            }
            "\"" => {
                if op.operands.len() == 3 {
                    gs.text.word_spacing = operand_as_float(&op.operands[0]);
                    gs.text.char_spacing = operand_as_float(&op.operands[1]);
                    let leading = gs.text.leading;
                    move_text_line(&mut gs.text, 0.0, -leading);
                    show_text(
                        &mut gs.text,
                        &op.operands[2..],
                        &gs.ctm,
                        &encodings,
                        height,
                        &mut chars,
                    );
                }
            }
            _ => {}
        }
    }

    Ok(group_chars_into_words(&chars, X_TOLERANCE, Y_TOLERANCE))
}

fn move_text_line(text: &mut TextState, tx: f32, ty: f32) {
    let tm = translate_matrix(tx, ty);
    text.text_matrix = multiply_matrices(&tm, &text.text_line_matrix);
    text.text_line_matrix = text.text_matrix;
    text.cursor = 0.0;
}

fn show_text(
    text: &mut TextState,
    operands: &[Object],
    ctm: &[f32; 6],
    encodings: &BTreeMap<Vec<u8>, Encoding>,
    height: f32,
    chars: &mut Vec<PositionedChar>,
) {
    let encoding = match text.font_key.as_ref().and_then(|k| encodings.get(k)) {
        Some(enc) => enc,
        None => return,
    };

    for operand in operands {
        match operand {
            Object::String(bytes, _) => {
                let decoded = match Document::decode_text(encoding, bytes) {
                    Ok(s) => s,
                    Err(_) => continue,
                };
                for ch in decoded.chars() {
                    let advance = CHAR_WIDTH_RATIO * text.font_size * text.horizontal_scaling;
                    let spacing = text.char_spacing
                        + if ch == ' ' { text.word_spacing } else { 0.0 };

                    let device = multiply_matrices(&text.text_matrix, ctm);
                    let (x, y) = transform_point(&device, text.cursor, text.rise);
                    let (x1, _) = transform_point(&device, text.cursor + advance, text.rise);

                    chars.push(PositionedChar {
                        ch,
                        x,
                        width: x1 - x,
                        top: height - y,
                    });

                    text.cursor += advance + spacing;
                }
            }
            // TJ offsets: negative thousandths of font size shift the cursor.
            Object::Integer(i) => {
                text.cursor -=
                    *i as f32 / 1000.0 * text.font_size * text.horizontal_scaling;
            }
            Object::Real(f) => {
                text.cursor -= *f / 1000.0 * text.font_size * text.horizontal_scaling;
            }
            Object::Array(arr) => {
                show_text(text, arr, ctm, encodings, height, chars);
            }
            _ => {}
        }
    }
}

/// Assemble characters into words: whitespace always closes a word, as does a
/// horizontal gap beyond `x_tol` or a vertical jump beyond `y_tol`.
fn group_chars_into_words(
    chars: &[PositionedChar],
    x_tol: f32,
    y_tol: f32,
) -> Vec<PositionedWord> {
    let mut words = Vec::new();
    let mut current: Option<PositionedWord> = None;

    for c in chars {
        if c.ch.is_whitespace() {
            if let Some(word) = current.take() {
                words.push(word);
            }
            continue;
        }

        match current.as_mut() {
            Some(word)
                if (c.x - word.x1) <= x_tol
                    && (c.x - word.x1) >= -x_tol
                    && (c.top - word.top).abs() <= y_tol =>
            {
                word.text.push(c.ch);
                word.x1 = c.x + c.width;
            }
            _ => {
                if let Some(word) = current.take() {
                    words.push(word);
                }
                current = Some(PositionedWord {
                    text: c.ch.to_string(),
                    x0: c.x,
                    x1: c.x + c.width,
                    top: c.top,
                });
            }
        }
    }

    if let Some(word) = current {
        words.push(word);
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(ch: char, x: f32, width: f32, top: f32) -> PositionedChar {
        PositionedChar { ch, x, width, top }
    }

    #[test]
    fn adjacent_chars_form_one_word() {
        let chars = vec![ch('a', 0.0, 5.0, 100.0), ch('b', 5.0, 5.0, 100.0)];
        let words = group_chars_into_words(&chars, X_TOLERANCE, Y_TOLERANCE);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "ab");
        assert_eq!(words[0].x0, 0.0);
        assert_eq!(words[0].x1, 10.0);
    }

    #[test]
    fn whitespace_splits_words() {
        let chars = vec![
            ch('a', 0.0, 5.0, 100.0),
            ch(' ', 5.0, 5.0, 100.0),
            ch('b', 10.0, 5.0, 100.0),
        ];
        let words = group_chars_into_words(&chars, X_TOLERANCE, Y_TOLERANCE);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "a");
        assert_eq!(words[1].text, "b");
        assert_eq!(words[1].x0, 10.0);
    }

    #[test]
    fn gap_beyond_tolerance_splits_words() {
        // 3.0 units is within tolerance, 3.1 is not.
        let joined = vec![ch('a', 0.0, 5.0, 100.0), ch('b', 8.0, 5.0, 100.0)];
        assert_eq!(
            group_chars_into_words(&joined, X_TOLERANCE, Y_TOLERANCE).len(),
            1
        );

        let split = vec![ch('a', 0.0, 5.0, 100.0), ch('b', 8.2, 5.0, 100.0)];
        assert_eq!(
            group_chars_into_words(&split, X_TOLERANCE, Y_TOLERANCE).len(),
            2
        );
    }

    #[test]
    fn vertical_jump_splits_words() {
        let chars = vec![ch('a', 0.0, 5.0, 100.0), ch('b', 5.0, 5.0, 110.0)];
        let words = group_chars_into_words(&chars, X_TOLERANCE, Y_TOLERANCE);
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn empty_input_yields_no_words() {
        assert!(group_chars_into_words(&[], X_TOLERANCE, Y_TOLERANCE).is_empty());
    }

    #[test]
    fn matrix_transform_applies_translation() {
        let m = translate_matrix(10.0, 20.0);
        assert_eq!(transform_point(&m, 1.0, 2.0), (11.0, 22.0));
    }
}
