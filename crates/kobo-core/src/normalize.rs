//! Canonical join keys for free-text product names.
//!
//! Spreadsheets entered by hand disagree on width, case and spacing
//! ("Ｓｗｏｒｄ Ａ", "sword a", "SwordA"). Every cross-source join goes
//! through [`normalize_key`] so those spellings land on one key.

const FULLWIDTH_START: u32 = 0xFF01;
const FULLWIDTH_END: u32 = 0xFF5E;
const FULLWIDTH_OFFSET: u32 = 0xFEE0;

/// Folds full-width ASCII to half-width, strips all whitespace and lowercases.
///
/// No semantic correction is attempted: two spellings that differ by more
/// than width, case or spacing stay distinct.
pub fn normalize_key(text: &str) -> String {
    text.chars()
        .map(fold_width)
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn fold_width(ch: char) -> char {
    let code = ch as u32;
    if (FULLWIDTH_START..=FULLWIDTH_END).contains(&code) {
        char::from_u32(code - FULLWIDTH_OFFSET).unwrap_or(ch)
    } else {
        ch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_width_case_and_whitespace() {
        assert_eq!(normalize_key("  Test  "), "test");
        assert_eq!(normalize_key("Ｓｗｏｒｄ　Ａ１"), "sworda1");
        assert_eq!(normalize_key("Sword\tA 1"), "sworda1");
        assert_eq!(normalize_key("ＳＷＯＲＤａ"), "sworda");
    }

    #[test]
    fn keeps_non_ascii_text() {
        assert_eq!(normalize_key(" 剣 "), "剣");
        assert_eq!(normalize_key("剣（大）"), "剣(大)");
    }

    #[test]
    fn blank_maps_to_empty() {
        assert_eq!(normalize_key(""), "");
        assert_eq!(normalize_key(" \u{3000} "), "");
    }
}
