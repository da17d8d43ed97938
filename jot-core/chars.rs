use crate::line_ending::LineEnding;

#[inline]
pub fn char_is_line_ending(ch: char) -> bool {
  LineEnding::from_char(ch).is_some()
}

/// Word characters: alphanumerics plus underscore. Everything else is
/// a word boundary.
#[inline]
pub fn char_is_word(ch: char) -> bool {
  ch.is_alphanumeric() || ch == '_'
}
