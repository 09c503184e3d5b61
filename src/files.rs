//! File management: upload ingest, thumbnails, and media relocation
//! between the live, archive, and backup areas.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{GenericImageView, ImageFormat};

use log::warn;

use md5::{Digest, Md5};

use crate::config::{BoardOptions, Config, DuplicateScope};
use crate::models::{Database, PostId};
use crate::{Error, Result};

/// Deterministic locations of a board's artifacts and media.
#[derive(Debug, Clone)]
pub struct BoardPaths {
    root: PathBuf,
    img_dir: String,
    thumb_dir: String,
    res_dir: String,
    archive_dir: String,
    backup_dir: String,
    page_ext: String,
}

impl BoardPaths {
    pub fn new(
        site_dir: &Path,
        board_name: &str,
        options: &BoardOptions,
        page_ext: &str,
    ) -> BoardPaths {
        BoardPaths {
            root: site_dir.join(board_name),
            img_dir: options.img_dir.clone(),
            thumb_dir: options.thumb_dir.clone(),
            res_dir: options.res_dir.clone(),
            archive_dir: options.archive_dir.clone(),
            backup_dir: options.backup_dir.clone(),
            page_ext: page_ext.to_string(),
        }
    }

    /// The board's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn img_dir(&self) -> &str {
        &self.img_dir
    }

    pub fn thumb_dir(&self) -> &str {
        &self.thumb_dir
    }

    pub fn res_dir(&self) -> &str {
        &self.res_dir
    }

    pub fn archive_dir(&self) -> &str {
        &self.archive_dir
    }

    /// Create the directories a live board writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.img_dir, &self.thumb_dir, &self.res_dir] {
            fs::create_dir_all(self.root.join(dir))?;
        }

        Ok(())
    }

    /// The file name of an index page. Page 0 is the board's front page.
    pub fn page_name(&self, page: usize) -> String {
        if page == 0 {
            format!("index.{}", self.page_ext)
        } else {
            format!("{}.{}", page, self.page_ext)
        }
    }

    /// The path of an index page.
    pub fn page_path(&self, page: usize) -> PathBuf {
        self.root.join(self.page_name(page))
    }

    /// The file name of a thread page, relative to the board root.
    pub fn thread_page_name(
        &self,
        thread: PostId,
        abbreviated: bool,
    ) -> String {
        if abbreviated {
            format!("{}/{}_abbr.{}", self.res_dir, thread, self.page_ext)
        } else {
            format!("{}/{}.{}", self.res_dir, thread, self.page_ext)
        }
    }

    /// The path of a thread page.
    pub fn thread_path(&self, thread: PostId, abbreviated: bool) -> PathBuf {
        self.root.join(self.thread_page_name(thread, abbreviated))
    }

    /// The path a thread page is archived at.
    pub fn archived_thread_path(&self, thread: PostId) -> PathBuf {
        self.root
            .join(&self.archive_dir)
            .join(self.thread_page_name(thread, false))
    }

    /// The path of the board's feed.
    pub fn rss_path(&self) -> PathBuf {
        self.root.join("board.rss")
    }

    /// Resolve a board-relative media path.
    pub fn live_path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Where a board-relative media path lives once archived.
    pub fn archive_path(&self, rel: &str) -> PathBuf {
        self.root.join(&self.archive_dir).join(rel)
    }

    /// Where a board-relative media path lives while backed up. Backups
    /// are flattened to their file name.
    pub fn backup_path(&self, rel: &str) -> PathBuf {
        let name = Path::new(rel)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.root
            .join(&self.archive_dir)
            .join(&self.backup_dir)
            .join(name)
    }

    /// A stored image path, relative to the board root.
    pub fn image_rel(&self, file: &str) -> String {
        format!("{}/{}", self.img_dir, file)
    }

    /// A thumbnail path, relative to the board root.
    pub fn thumb_rel(&self, file: &str) -> String {
        format!("{}/{}", self.thumb_dir, file)
    }

    /// Whether a board-relative path points into the thumbnail directory.
    ///
    /// Static icons standing in for thumbnails live elsewhere and must
    /// never be moved or deleted with a post.
    pub fn is_thumb(&self, rel: &str) -> bool {
        rel.starts_with(&format!("{}/", self.thumb_dir))
    }

    /// The link to a post within its thread page.
    pub fn reply_link(&self, thread: PostId, post: PostId) -> String {
        format!("{}#{}", self.thread_page_name(thread, false), post)
    }
}

/// A staged upload handed in by the request layer.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Where the request layer staged the bytes.
    pub source: PathBuf,
    /// The file name the client supplied.
    pub original_name: String,
}

/// The stored form of an ingested upload.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image: String,
    pub size: i64,
    pub md5: String,
    pub width: i32,
    pub height: i32,
    pub thumbnail: String,
    pub tn_width: i32,
    pub tn_height: i32,
}

/// What to do with a post's media when the post goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Move into the board archive.
    Archive,
    /// Move into the backup area for possible restore.
    Backup,
    /// Delete outright.
    Delete,
}

/// Everything `ingest` needs to know about the board it stores into.
pub struct FileContext<'a> {
    pub db: &'a Database,
    pub board_name: &'a str,
    pub options: &'a BoardOptions,
    pub config: &'a Config,
    pub paths: &'a BoardPaths,
}

/// Fit source dimensions into a bounding box, preserving aspect ratio.
pub(crate) fn fit_dimensions(
    width: u32,
    height: u32,
    max_w: u32,
    max_h: u32,
) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }

    let mut tn_w = max_w;
    let mut tn_h = (height as u64 * max_w as u64 / width as u64) as u32;

    if tn_h > max_h {
        tn_w = (width as u64 * max_h as u64 / height as u64) as u32;
        tn_h = max_h;
    }

    (tn_w.max(1), tn_h.max(1))
}

/// Whether a payload head looks like an executable or script smuggled in
/// under a media name.
pub(crate) fn looks_like_exploit(head: &[u8]) -> bool {
    head.starts_with(b"MZ")
        || head.starts_with(b"\x7fELF")
        || head.starts_with(b"#!")
        || head.starts_with(b"<?")
        || head.windows(b"<script".len()).any(|w| w == b"<script")
}

fn md5_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Md5::new();
    let mut buf = [0u8; 16 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

fn canonical_ext(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        other => other.extensions_str().first().copied().unwrap_or("bin"),
    }
}

fn set_world_readable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Move a file, creating the target's directories on demand.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(dir) = to.parent() {
        fs::create_dir_all(dir)?;
    }

    if fs::rename(from, to).is_err() {
        // Cross-device fallback.
        fs::copy(from, to).map_err(|err| {
            Error::from_io_error(
                err,
                format!("Couldn't move {} to {}", from.display(), to.display()),
            )
        })?;
        fs::remove_file(from)?;
    }

    Ok(())
}

/// Validate, store, checksum, and thumbnail an upload.
///
/// Classification is by content inspection, never by the supplied
/// extension. On any rejection after the bytes hit the disk, the stored
/// file is removed before the error is returned, so a failed ingest
/// leaves nothing behind.
pub fn ingest(
    ctx: &FileContext,
    upload: &Upload,
    timestamp: i64,
    thread_num: PostId,
    editing: bool,
) -> Result<StoredImage> {
    let options = ctx.options;

    let size = fs::metadata(&upload.source)
        .map_err(|err| {
            Error::from_io_error(err, "Couldn't stat staged upload")
        })?
        .len();

    if size == 0 {
        return Err(Error::UploadEmpty);
    }
    if size > options.max_kb * 1024 {
        return Err(Error::UploadTooBig {
            limit_kb: options.max_kb,
        });
    }

    let mut head = Vec::with_capacity(1024);
    File::open(&upload.source)?
        .take(1024)
        .read_to_end(&mut head)?;

    let format = image::guess_format(&head).ok();
    let dimensions = match format {
        Some(_) => Some(image::image_dimensions(&upload.source)?),
        None => None,
    };

    let ext = match format {
        Some(format) => canonical_ext(format).to_string(),
        None => Path::new(&upload.original_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default(),
    };

    let known = dimensions.is_some()
        || options.extra_filetypes.iter().any(|e| *e == ext);

    if (!known && !options.allow_unknown)
        || options.forbidden_extensions.iter().any(|e| *e == ext)
    {
        return Err(Error::UnsupportedFormat { ext });
    }

    if let Some((width, height)) = dimensions {
        if width > options.max_image_width
            || height > options.max_image_height
            || width as u64 * height as u64 > options.max_image_pixels
        {
            return Err(Error::ImageTooBig { width, height });
        }
    }

    // File name straight from the millisecond timestamp; sub-second
    // precision keeps it collision-free.
    let base = timestamp.to_string();
    let mut stored_file = format!("{}.{}", base, ext);
    if !known {
        stored_file.push_str(&options.munge_suffix);
    }

    let mut image_rel = ctx.paths.image_rel(&stored_file);
    let mut image_abs = ctx.paths.live_path(&image_rel);

    if let Some(dir) = image_abs.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::copy(&upload.source, &image_abs).map_err(|err| {
        Error::from_io_error(
            err,
            format!("Couldn't store upload at {}", image_abs.display()),
        )
    })?;

    // Second look at the payload after it hit the disk; a "media" file
    // opening like a script or executable is removed on the spot.
    if looks_like_exploit(&head) {
        fs::remove_file(&image_abs)?;
        return Err(Error::PotentialExploit);
    }

    let digest = md5_file(&image_abs)?;

    if !editing && options.duplicate_detection != DuplicateScope::Off {
        let found = ctx.db.find_duplicate(
            ctx.board_name,
            &digest,
            options.duplicate_detection,
            thread_num,
        )?;

        if let Some(existing) = found {
            fs::remove_file(&image_abs)?;
            return Err(Error::DuplicateImage {
                location: ctx
                    .paths
                    .reply_link(existing.thread_num(), existing.num),
            });
        }
    }

    let (mut thumbnail, mut tn_width, mut tn_height) =
        (String::new(), 0u32, 0u32);
    let (mut width, mut height) = (0u32, 0u32);

    match dimensions {
        None => {
            // Unknown but allowed format: a static icon stands in for the
            // thumbnail when one is configured.
            if let Some(icon) = ctx.config.icons.get(&ext) {
                let icon_rel = icon.to_string_lossy().into_owned();
                let icon_abs = ctx.paths.live_path(&icon_rel);

                match image::image_dimensions(&icon_abs) {
                    Ok((w, h)) => {
                        thumbnail = icon_rel;
                        tn_width = w;
                        tn_height = h;
                    }
                    Err(err) => {
                        warn!(
                            "Couldn't read icon for '{}' at {}: {}",
                            ext,
                            icon_abs.display(),
                            err
                        );
                    }
                }
            }
        }
        Some((w, h)) => {
            width = w;
            height = h;

            let over_bounds = w > options.max_thumb_width
                || h > options.max_thumb_height;

            if over_bounds || options.thumbnail_small {
                let (target_w, target_h) = fit_dimensions(
                    w,
                    h,
                    options.max_thumb_width,
                    options.max_thumb_height,
                );

                let thumb_rel =
                    ctx.paths.thumb_rel(&format!("{}s.{}", base, ext));
                let thumb_abs = ctx.paths.live_path(&thumb_rel);

                if let Some(dir) = thumb_abs.parent() {
                    fs::create_dir_all(dir)?;
                }

                let scaled =
                    image::open(&image_abs)?.thumbnail(target_w, target_h);

                if ext == "jpg" {
                    let out = BufWriter::new(File::create(&thumb_abs)?);
                    let encoder = JpegEncoder::new_with_quality(
                        out,
                        options.thumbnail_quality,
                    );
                    scaled.write_with_encoder(encoder)?;
                } else {
                    scaled.save(&thumb_abs)?;
                }

                let (sw, sh) = scaled.dimensions();
                thumbnail = thumb_rel;
                tn_width = sw;
                tn_height = sh;

                set_world_readable(&thumb_abs)?;
            } else {
                // Small enough to be its own thumbnail.
                thumbnail = image_rel.clone();
                tn_width = w;
                tn_height = h;
            }
        }
    }

    // Keep the original name for configured extensions, refusing to
    // overwrite an existing file.
    if options.keep_name_filetypes().iter().any(|e| *e == ext) {
        let orig_file = Path::new(&upload.original_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !orig_file.is_empty() {
            let named_rel = ctx.paths.image_rel(&orig_file);
            let named_abs = ctx.paths.live_path(&named_rel);

            if named_abs.exists() {
                fs::remove_file(&image_abs)?;
                return Err(Error::DuplicateFileName { name: orig_file });
            }

            fs::rename(&image_abs, &named_abs)?;

            if thumbnail == image_rel {
                thumbnail = named_rel.clone();
            }
            image_rel = named_rel;
            image_abs = named_abs;
        }
    }

    set_world_readable(&image_abs)?;

    Ok(StoredImage {
        image: image_rel,
        size: size as i64,
        md5: digest,
        width: width as i32,
        height: height as i32,
        thumbnail,
        tn_width: tn_width as i32,
        tn_height: tn_height as i32,
    })
}

/// Move or delete a post's media as the post is deleted or archived.
///
/// Missing sources are tolerated; a post whose media was already stripped
/// disposes of nothing.
pub fn dispose(
    paths: &BoardPaths,
    rel_image: &str,
    rel_thumb: &str,
    disposition: Disposition,
) -> Result<()> {
    for (rel, thumb_slot) in [(rel_image, false), (rel_thumb, true)] {
        if rel.is_empty() {
            continue;
        }

        // Never move a shared static icon.
        if thumb_slot && !paths.is_thumb(rel) {
            continue;
        }

        let live = paths.live_path(rel);
        if !live.exists() {
            continue;
        }

        match disposition {
            Disposition::Archive => {
                let target = paths.archive_path(rel);
                move_file(&live, &target)?;
                set_world_readable(&target)?;
            }
            Disposition::Backup => {
                let target = paths.backup_path(rel);
                move_file(&live, &target)?;
                set_world_readable(&target)?;
            }
            Disposition::Delete => {
                fs::remove_file(&live)?;
            }
        }
    }

    Ok(())
}

/// Move a backed-up post's media back to the live area.
pub fn restore_media(
    paths: &BoardPaths,
    rel_image: &str,
    rel_thumb: &str,
) -> Result<()> {
    for (rel, thumb_slot) in [(rel_image, false), (rel_thumb, true)] {
        if rel.is_empty() {
            continue;
        }
        if thumb_slot && !paths.is_thumb(rel) {
            continue;
        }

        let stored = paths.backup_path(rel);
        if !stored.exists() {
            continue;
        }

        let live = paths.live_path(rel);
        move_file(&stored, &live)?;
        set_world_readable(&live)?;
    }

    Ok(())
}

/// Delete a backed-up post's media for good.
pub fn purge_backup_media(
    paths: &BoardPaths,
    rel_image: &str,
    rel_thumb: &str,
) -> Result<()> {
    for (rel, thumb_slot) in [(rel_image, false), (rel_thumb, true)] {
        if rel.is_empty() {
            continue;
        }
        if thumb_slot && !paths.is_thumb(rel) {
            continue;
        }

        let stored = paths.backup_path(rel);
        if stored.exists() {
            fs::remove_file(&stored)?;
        }
    }

    Ok(())
}
