//! Thread assembly: turning flat post rows into renderable threads, with
//! display caps and comment abbreviation.

use std::sync::OnceLock;

use regex::Regex;

use serde::Serialize;

use crate::config::BoardOptions;
use crate::models::Post;

/// A read-optimized projection of a post for rendering.
///
/// `abbrev` is set when the comment was cut down for display; the full
/// text is only on the thread page. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct CompactPost {
    #[serde(flatten)]
    pub post: Post,
    pub abbrev: bool,
}

impl From<Post> for CompactPost {
    fn from(post: Post) -> CompactPost {
        CompactPost {
            post,
            abbrev: false,
        }
    }
}

/// A thread prepared for an index page.
#[derive(Debug, Serialize)]
pub struct AssembledThread {
    /// The root post followed by the retained replies.
    pub posts: Vec<CompactPost>,
    /// How many replies were dropped for display.
    pub omit: usize,
    /// How many of the dropped replies carried an image.
    pub omitimages: usize,
}

/// Prepare page threads for rendering.
///
/// Each thread keeps its root and the newest replies under the reply cap
/// (stickied threads use their own cap) and the image cap, dropping the
/// oldest replies first and counting what was dropped. Retained comments
/// are abbreviated to the board's line budget.
pub fn assemble(
    page_threads: Vec<Vec<Post>>,
    options: &BoardOptions,
    replies_per_sticky: usize,
) -> Vec<AssembledThread> {
    let mut threads = Vec::with_capacity(page_threads.len());

    for mut posts in page_threads {
        if posts.is_empty() {
            continue;
        }

        let parent = posts.remove(0);
        let mut replies = posts;

        let mut images =
            replies.iter().filter(|p| !p.image.is_empty()).count();

        let max_replies = if parent.stickied != 0 {
            replies_per_sticky
        } else {
            options.replies_per_thread
        };

        let max_images = if options.image_replies_per_thread == 0 {
            images
        } else {
            options.image_replies_per_thread
        };

        let mut omit = 0;
        let mut omitimages = 0;
        while replies.len() > max_replies || images > max_images {
            let dropped = replies.remove(0);
            omit += 1;
            if !dropped.image.is_empty() {
                omitimages += 1;
                images -= 1;
            }
        }

        let mut compact: Vec<CompactPost> = Vec::with_capacity(
            replies.len() + 1,
        );
        compact.push(parent.into());
        compact.extend(replies.into_iter().map(CompactPost::from));

        for post in &mut compact {
            if let Some(cut) = abbreviate_html(
                &post.post.comment,
                options.max_lines_shown,
                options.approx_line_length,
            ) {
                post.abbrev = true;
                post.post.comment = cut;
            }
        }

        threads.push(AssembledThread {
            posts: compact,
            omit,
            omitimages,
        });
    }

    threads
}

const BLOCK_TAGS: [&str; 7] =
    ["p", "blockquote", "pre", "li", "ol", "ul", "br"];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:([^<]+)|<(/?)(\w+).*?(/?)>)")
            .expect("token regex is valid")
    })
}

fn trailing_closers_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\s*</\w+>)*\s*$")
            .expect("trailing closers regex is valid")
    })
}

/// Cut a comment down to an approximate number of display lines.
///
/// Walks the markup with an open-tag stack and a pending character count.
/// Every closed block-level tag costs `pending / approx_len + 1` lines,
/// paragraphs and blockquotes one extra. Once the budget is exceeded the
/// text is cut at that point and the still-open tags are closed in
/// reverse order, so the result is always balanced. Returns `None` when
/// nothing needs cutting, including when only closing tags would have
/// been dropped; re-running on its own output is a no-op.
pub fn abbreviate_html(
    html: &str,
    max_lines: usize,
    approx_len: usize,
) -> Option<String> {
    if max_lines == 0 || approx_len == 0 {
        return None;
    }

    let mut lines = 0usize;
    let mut chars = 0usize;
    let mut stack: Vec<String> = Vec::new();

    for caps in token_regex().captures_iter(html) {
        if let Some(text) = caps.get(1) {
            chars += text.as_str().chars().count();
            continue;
        }

        let closing = caps.get(2).map_or(false, |m| m.as_str() == "/");
        let implicit = caps.get(4).map_or(false, |m| m.as_str() == "/");
        let tag = caps
            .get(3)
            .map_or(String::new(), |m| m.as_str().to_lowercase());

        if !closing && !implicit {
            stack.push(tag.clone());
        }
        if closing {
            stack.pop();
        }

        if (closing || implicit) && BLOCK_TAGS.contains(&tag.as_str()) {
            lines += chars / approx_len + 1;
            if tag == "p" || tag == "blockquote" {
                lines += 1;
            }
            chars = 0;
        }

        if lines > max_lines {
            let end = caps.get(0).map_or(html.len(), |m| m.end());

            // Nothing but closers left: the cut would change nothing.
            if trailing_closers_regex().is_match(&html[end..]) {
                return None;
            }

            let mut out = String::from(&html[..end]);
            while let Some(open) = stack.pop() {
                out.push_str("</");
                out.push_str(&open);
                out.push('>');
            }

            return Some(out);
        }
    }

    None
}
