//! Static page cache generation: board index pages, thread pages, the
//! board feed, and archival of rendered threads.
//!
//! Every artifact is rebuilt whole from the current store state and
//! written to a temporary file first, so a crash mid-rebuild leaves the
//! previous artifact in place. Rebuilding is idempotent and can always be
//! re-triggered.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::Utc;

use handlebars::Handlebars;

use log::trace;

use regex::Regex;

use serde::Serialize;

use serde_json::value::{to_value, Value as JsonValue};

use crate::assemble::{self, CompactPost};
use crate::config::{Config, DateStyle};
use crate::files::BoardPaths;
use crate::models::{Database, PostId};
use crate::normalize;
use crate::{config::BoardOptions, Error, Result};

/// The rendering seam. Templates are keyed by name; the data is a JSON
/// tree built from the store.
pub trait Renderer {
    fn render(&self, template: &str, data: &JsonValue) -> Result<String>;
}

/// The default renderer, backed by a directory of handlebars templates.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    /// Register every `.hbs` template under the given directory.
    pub fn new<P>(template_dir: P) -> Result<HandlebarsRenderer>
    where
        P: AsRef<Path>,
    {
        let mut registry = Handlebars::new();
        registry.register_templates_directory(".hbs", template_dir)?;

        Ok(HandlebarsRenderer { registry })
    }
}

impl Renderer for HandlebarsRenderer {
    fn render(&self, template: &str, data: &JsonValue) -> Result<String> {
        trace!("Rendering template {}", template);

        Ok(self.registry.render(template, data)?)
    }
}

/// How many pages a board with `items` threads renders.
pub fn page_count(items: usize, per_page: usize) -> usize {
    if per_page == 0 {
        1
    } else {
        (items + per_page - 1) / per_page
    }
}

/// A link to one index page.
#[derive(Debug, Serialize)]
pub struct PageLink {
    pub page: usize,
    pub filename: String,
    pub current: bool,
}

/// Links between the index pages of a board.
#[derive(Debug, Serialize)]
pub struct PageNav {
    pub pages: Vec<PageLink>,
    pub prevpage: Option<String>,
    pub nextpage: Option<String>,
    pub current: usize,
}

/// Build the page navigation for one index page.
///
/// A requested page at or past the total clamps to the last existing
/// page.
pub fn page_nav(paths: &BoardPaths, page: usize, total: usize) -> PageNav {
    let current = if total == 0 {
        0
    } else if page >= total {
        total - 1
    } else {
        page
    };

    let pages = (0..total)
        .map(|i| PageLink {
            page: i,
            filename: paths.page_name(i),
            current: i == current,
        })
        .collect();

    let prevpage = if current > 0 {
        Some(paths.page_name(current - 1))
    } else {
        None
    };
    let nextpage = if total > 0 && current + 1 < total {
        Some(paths.page_name(current + 1))
    } else {
        None
    };

    PageNav {
        pages,
        prevpage,
        nextpage,
        current,
    }
}

/// Write an artifact through a temporary file and an atomic replace.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        Error::from_io_error(
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "no parent directory",
            ),
            format!("Bad artifact path {}", path.display()),
        )
    })?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{}.tmp", file_name));

    let mut out = File::create(&tmp).map_err(|err| {
        Error::from_io_error(
            err,
            format!("Couldn't create {}", tmp.display()),
        )
    })?;
    out.write_all(contents.as_bytes())?;
    out.sync_all()?;
    drop(out);

    fs::rename(&tmp, path)?;

    Ok(())
}

/// Regenerates a board's cached artifacts from the store.
pub struct CacheBuilder<'a> {
    pub db: &'a Database,
    pub config: &'a Config,
    pub options: &'a BoardOptions,
    pub paths: &'a BoardPaths,
    pub renderer: &'a dyn Renderer,
    pub board_name: &'a str,
}

impl CacheBuilder<'_> {
    fn render_to(
        &self,
        template: &str,
        data: &JsonValue,
        path: &Path,
    ) -> Result<()> {
        let html = self.renderer.render(template, data)?;
        write_atomic(path, &html)
    }

    /// Rebuild every index page of the board, drop index pages past the
    /// new total, and refresh the feed.
    pub fn build_board_cache(&self) -> Result<()> {
        let threads = self.db.threads(self.board_name)?;

        let per_page = self.options.threads_per_page.max(1);
        let total = page_count(threads.len(), per_page).max(1);

        if threads.is_empty() {
            self.build_page(0, total, Vec::new())?;
        } else {
            for (page, chunk) in threads.chunks(per_page).enumerate() {
                self.build_page(page, total, chunk.to_vec())?;
            }
        }

        // Stale trailing pages from before the board shrank.
        let mut page = total;
        while self.paths.page_path(page).exists() {
            fs::remove_file(self.paths.page_path(page))?;
            page += 1;
        }

        if self.config.enable_rss {
            self.build_rss()?;
        }

        Ok(())
    }

    /// Rebuild a single index page.
    fn build_page(
        &self,
        page: usize,
        total: usize,
        page_threads: Vec<Vec<crate::models::Post>>,
    ) -> Result<()> {
        let threads = assemble::assemble(
            page_threads,
            self.options,
            self.config.replies_per_sticky,
        );
        let nav = page_nav(self.paths, page, total);

        let data = serde_json::json!({
            "board": self.board_name,
            "threads": threads,
            "pages": nav.pages,
            "prevpage": nav.prevpage,
            "nextpage": nav.nextpage,
            "postform":
                self.options.allow_text_only || self.options.allow_images,
            "image_inp": self.options.allow_images,
            "textonly_inp":
                self.options.allow_images && self.options.allow_text_only,
        });

        self.render_to("page", &data, &self.paths.page_path(page))
    }

    /// Rebuild a thread's full page, and its abbreviated page when the
    /// thread is long enough to warrant one.
    pub fn build_thread_cache(&self, thread_num: PostId) -> Result<()> {
        let posts = self.db.thread_posts(self.board_name, thread_num)?;

        let locked = posts[0].locked;
        let dummy = posts.last().map(|p| p.num).unwrap_or(thread_num);

        let full: Vec<CompactPost> =
            posts.iter().cloned().map(CompactPost::from).collect();

        let data = serde_json::json!({
            "board": self.board_name,
            "thread": thread_num,
            "threads": [{ "posts": full, "omit": 0, "omitimages": 0 }],
            "postform": self.options.allow_text_replies
                || self.options.allow_image_replies,
            "image_inp": self.options.allow_image_replies,
            "textonly_inp": false,
            "dummy": dummy,
            "lockedthread": locked,
        });

        self.render_to(
            "page",
            &data,
            &self.paths.thread_path(thread_num, false),
        )?;

        let keep = self.config.posts_in_abbreviated_pages;
        let to_trim = posts.len().saturating_sub(keep);

        let abbr_path = self.paths.thread_path(thread_num, true);

        if self.config.enable_abbreviated_pages && to_trim > 1 {
            let mut recent = vec![posts[0].clone()];
            recent.extend(posts[to_trim..].iter().cloned());

            let min_res =
                recent.get(1).map(|p| p.num).unwrap_or(recent[0].num);

            let recent: Vec<CompactPost> =
                recent.into_iter().map(CompactPost::from).collect();

            let data = serde_json::json!({
                "board": self.board_name,
                "thread": thread_num,
                "threads": [{
                    "posts": recent,
                    "omit": to_trim - 1,
                    "omitimages": 0,
                }],
                "postform": self.options.allow_text_replies
                    || self.options.allow_image_replies,
                "image_inp": self.options.allow_image_replies,
                "textonly_inp": false,
                "dummy": dummy,
                "lockedthread": locked,
                "min_res": min_res,
            });

            self.render_to("page", &data, &abbr_path)?;
        } else if abbr_path.exists() {
            fs::remove_file(&abbr_path)?;
        }

        Ok(())
    }

    /// Rebuild the page of every live thread on the board.
    pub fn build_all_thread_caches(&self) -> Result<()> {
        for thread in self.db.threads(self.board_name)? {
            self.build_thread_cache(thread[0].num)?;
        }

        Ok(())
    }

    /// Drop a thread's cached pages; when archiving, move the full page
    /// into the archive with its media and reply links rewritten.
    pub fn delete_thread_cache(
        &self,
        thread_num: PostId,
        archiving: bool,
    ) -> Result<()> {
        let live = self.paths.thread_path(thread_num, false);
        let abbr = self.paths.thread_path(thread_num, true);

        if archiving && live.exists() {
            let html = fs::read_to_string(&live)?;
            let rewritten = self.rewrite_archive_links(&html)?;
            write_atomic(
                &self.paths.archived_thread_path(thread_num),
                &rewritten,
            )?;
        }

        if live.exists() {
            fs::remove_file(&live)?;
        }
        if abbr.exists() {
            fs::remove_file(&abbr)?;
        }

        Ok(())
    }

    fn rewrite_archive_links(&self, html: &str) -> Result<String> {
        rewrite_archive_links(
            html,
            self.paths.img_dir(),
            self.paths.thumb_dir(),
            self.paths.res_dir(),
            self.paths.archive_dir(),
        )
    }

    /// Rebuild the board feed from the most recent posts.
    pub fn build_rss(&self) -> Result<()> {
        let posts = self
            .db
            .recent_posts(self.board_name, self.config.rss_length)?;

        let items = posts
            .iter()
            .map(|post| {
                let mut value = to_value(post)?;
                if !post.image.is_empty() {
                    let mime_type: mime::Mime =
                        mime_guess::from_path(&post.image)
                            .first_or_octet_stream();
                    value["mime_type"] =
                        JsonValue::String(mime_type.to_string());
                }
                Ok(value)
            })
            .collect::<Result<Vec<_>>>()?;

        let data = serde_json::json!({
            "board": self.board_name,
            "items": items,
            "pub_date": normalize::format_date(
                Utc::now().timestamp_millis(),
                DateStyle::Http,
            ),
        });

        self.render_to("rss", &data, &self.paths.rss_path())
    }
}

/// Point the thumbnail, image, and reply links of a rendered page at the
/// archive directory, so an archived page keeps working after its media
/// moves.
fn rewrite_archive_links(
    html: &str,
    img_dir: &str,
    thumb_dir: &str,
    res_dir: &str,
    archive_dir: &str,
) -> Result<String> {
    let thumb_re =
        Regex::new(&format!(r#"img src="(.*?){}/"#, regex::escape(thumb_dir)))?;
    let html = thumb_re.replace_all(
        html,
        format!(r#"img src="${{1}}{}/{}/"#, archive_dir, thumb_dir),
    );

    let img_re =
        Regex::new(&format!(r#"a href="(.*?){}/"#, regex::escape(img_dir)))?;
    let html = img_re.replace_all(
        &html,
        format!(r#"a href="${{1}}{}/{}/"#, archive_dir, img_dir),
    );

    let res_re =
        Regex::new(&format!(r#"a href="(.*?){}/"#, regex::escape(res_dir)))?;
    let html = res_re.replace_all(
        &html,
        format!(r#"a href="${{1}}{}/{}/"#, archive_dir, res_dir),
    );

    Ok(html.into_owned())
}
