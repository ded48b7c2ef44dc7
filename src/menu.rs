//! Menu caption/keyword matching.
//!
//! Exact caption equality wins over keyword containment, so a tapped
//! keyboard button always resolves to its own entry even when another
//! entry's keyword happens to occur in the caption.

use crate::config::MenuEntry;

/// Returns the index of the first menu entry matching `text`, if any.
///
/// A match is either the exact caption (trimmed) or a case-insensitive
/// substring hit on one of the entry's keywords.
pub fn match_menu(text: &str, menu: &[MenuEntry]) -> Option<usize> {
    let trimmed = text.trim();
    if let Some(i) = menu.iter().position(|e| e.caption == trimmed) {
        return Some(i);
    }

    let lowered = trimmed.to_lowercase();
    menu.iter().position(|e| {
        e.keywords
            .iter()
            .any(|k| lowered.contains(&k.to_lowercase()))
    })
}
