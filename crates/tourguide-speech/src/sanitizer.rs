//! Removes markup the synthesis engine cannot speak.

use std::borrow::Cow;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static IMAGE_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[.*?\]\(.*?\)").expect("image markup pattern must compile"));

/// Strips inline markdown image references (`![alt](url)`) from `text`.
///
/// Returns the input borrowed when there is nothing to remove.
pub fn sanitize(text: &str) -> Cow<'_, str> {
    IMAGE_MARKUP.replace_all(text, "")
}

/// Where image markup sits in a partially streamed buffer.
///
/// A buffer cut inside `![alt](url)` leaves halves that [`sanitize`] cannot
/// recognise, so split points inside markup must be rejected. Markup that
/// has started but not yet closed extends to the end of the buffer and past
/// it, as does a trailing `!` that may be the start of `![`.
#[derive(Debug, Default)]
pub(crate) struct ImageMarkup {
    complete: Vec<Range<usize>>,
    open_from: Option<usize>,
}

impl ImageMarkup {
    pub(crate) fn scan(text: &str) -> Self {
        let complete: Vec<Range<usize>> =
            IMAGE_MARKUP.find_iter(text).map(|found| found.range()).collect();
        // Markup never spans a line break, so an opener followed by one is plain text.
        let open_from = text
            .match_indices("![")
            .map(|(start, _)| start)
            .find(|start| {
                !complete.iter().any(|range| range.contains(start))
                    && !text[*start..].contains('\n')
            })
            .or_else(|| text.ends_with('!').then(|| text.len() - 1));
        Self {
            complete,
            open_from,
        }
    }

    /// True if cutting the buffer at byte `at` would split a piece of markup.
    pub(crate) fn cuts(&self, at: usize) -> bool {
        self.open_from.is_some_and(|start| start < at)
            || self
                .complete
                .iter()
                .any(|range| range.start < at && at < range.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_image_markup() {
        let cleaned = sanitize("Text. ![alt](http://x/y.png)more text. ");
        assert_eq!(cleaned, "Text. more text. ");
    }

    #[test]
    fn strips_every_image_on_the_line() {
        let cleaned = sanitize("![a](1)one ![b](2)two ![](3)");
        assert_eq!(cleaned, "one two ");
    }

    #[test]
    fn plain_text_is_borrowed() {
        let cleaned = sanitize("这是文本。 ");
        assert!(matches!(cleaned, Cow::Borrowed(_)));
        assert_eq!(cleaned, "这是文本。 ");
    }

    #[test]
    fn leaves_regular_links_alone() {
        assert_eq!(sanitize("see [docs](http://x) "), "see [docs](http://x) ");
    }

    #[test]
    fn incomplete_markup_is_kept() {
        assert_eq!(sanitize("![desc](http:"), "![desc](http:");
    }

    #[test]
    fn cuts_inside_complete_markup_only() {
        let text = "Text. ![alt](http://x/y.png) more";
        let markup = ImageMarkup::scan(text);
        let start = text.find('!').unwrap();
        let end = text.find(')').unwrap() + 1;
        assert!(!markup.cuts(start));
        assert!(markup.cuts(start + 1));
        assert!(markup.cuts(text.find("y.").unwrap() + 2));
        assert!(!markup.cuts(end));
        assert!(!markup.cuts(text.len()));
    }

    #[test]
    fn open_markup_blocks_every_later_cut() {
        let text = "Look. ![Bell. Zhou](http";
        let markup = ImageMarkup::scan(text);
        assert!(!markup.cuts("Look. ".len()));
        assert!(markup.cuts("Look. ![Bell. ".len()));
        assert!(markup.cuts(text.len()));
    }

    #[test]
    fn trailing_bang_may_open_markup() {
        assert!(ImageMarkup::scan("Wow!").cuts(4));
        assert!(!ImageMarkup::scan("Wow! ").cuts(5));
    }

    #[test]
    fn opener_before_newline_is_plain_text() {
        let text = "Great![1]\nNext. ";
        assert!(!ImageMarkup::scan(text).cuts(text.len()));
    }
}
