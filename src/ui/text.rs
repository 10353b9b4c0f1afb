use unicode_width::UnicodeWidthChar;

pub fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Cut `text` to at most `width` columns, ending in `...` when it was cut.
pub fn truncate_with_ellipsis(text: &str, width: usize) -> String {
    if display_width(text) <= width {
        return text.to_string();
    }
    if width < 4 {
        return take_columns(text, width);
    }
    let mut out = take_columns(text, width - 3);
    out.push_str("...");
    out
}

fn take_columns(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = char_width(ch);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out
}

/// Word-wrap one paragraph to `width` columns. Words wider than a line are
/// broken at the column limit. An empty input yields one empty row.
pub fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut row_width = 0;

    for word in text.split(' ') {
        let word_width = display_width(word);
        let gap = usize::from(!row.is_empty());
        if row_width + gap + word_width <= width {
            if gap == 1 {
                row.push(' ');
            }
            row.push_str(word);
            row_width += gap + word_width;
            continue;
        }
        if !row.is_empty() {
            rows.push(std::mem::take(&mut row));
            row_width = 0;
        }
        for ch in word.chars() {
            let w = char_width(ch);
            if row_width + w > width && row_width > 0 {
                rows.push(std::mem::take(&mut row));
                row_width = 0;
            }
            row.push(ch);
            row_width += w;
        }
    }
    rows.push(row);
    rows
}

/// Wrap multi-line text, keeping explicit line breaks.
pub fn wrap_lines(text: &str, width: usize) -> Vec<String> {
    text.split('\n')
        .flat_map(|line| wrap_to_width(line.trim_end_matches('\r'), width))
        .collect()
}

/// Visible tail of a single-line input and the cursor column within it.
pub fn input_window(input: &str, cursor_byte: usize, width: usize) -> (String, usize) {
    let width = width.max(1);
    let cursor_byte = clamp_to_char_boundary(input, cursor_byte);
    let before = &input[..cursor_byte];

    let mut start = 0;
    let mut before_width = display_width(before);
    for (index, ch) in before.char_indices() {
        if before_width < width {
            break;
        }
        before_width -= char_width(ch);
        start = index + ch.len_utf8();
    }

    let visible = take_columns(&input[start..], width);
    (visible, before_width)
}

pub fn clamp_to_char_boundary(input: &str, cursor: usize) -> usize {
    let mut cursor = cursor.min(input.len());
    while cursor > 0 && !input.is_char_boundary(cursor) {
        cursor -= 1;
    }
    cursor
}
