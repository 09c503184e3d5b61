//! The post lifecycle: submission, moderation, archival, and restore,
//! with the cache rebuilds that keep the rendered pages in step with the
//! store.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use log::{info, warn};

use crate::cache::{CacheBuilder, Renderer};
use crate::config::Config;
use crate::files::{self, BoardPaths, Disposition, FileContext, StoredImage, Upload};
use crate::flood;
use crate::hooks::{Hooks, PostFields};
use crate::models::{Database, NewPost, NewReport, PostId, Report};
use crate::normalize;
use crate::{config::BoardOptions, Error, Result};

/// A validated staff identity, scoped to the boards it may moderate.
///
/// Authentication happens outside this crate; holding a `StaffSession` is
/// proof of it.
#[derive(Debug, Clone)]
pub struct StaffSession {
    pub username: String,
    /// The boards this staff member moderates. Empty means all of them.
    pub reign: Vec<String>,
}

impl StaffSession {
    /// A session with authority over every board.
    pub fn global<S>(username: S) -> StaffSession
    where
        S: Into<String>,
    {
        StaffSession {
            username: username.into(),
            reign: Vec::new(),
        }
    }

    /// Whether this session may moderate the given board.
    pub fn may_moderate(&self, board_name: &str) -> bool {
        self.reign.is_empty() || self.reign.iter().any(|b| b == board_name)
    }
}

/// Whether a submission creates a post or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    Create,
    Edit { num: PostId },
}

/// A raw submission, as the request layer hands it over.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// The thread being replied to, still as the submitted string. Empty
    /// or `"0"` starts a new thread.
    pub parent: String,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub comment: String,
    pub password: String,
    /// A staged upload, if the post carries a file.
    pub upload: Option<Upload>,
    /// The "post without a file" checkbox.
    pub no_file: bool,
    pub captcha: Option<String>,
    /// Pin the thread. Staff only, except that replies inherit it.
    pub sticky: bool,
    /// Lock the thread. Staff only.
    pub lock: bool,
    /// Skip the captcha. Staff only.
    pub no_captcha: bool,
    /// Store the comment verbatim instead of sanitizing it. Staff only.
    pub no_format: bool,
    /// Drop the stored tripcode when editing.
    pub killtrip: bool,
    /// Edit without updating the edit stamp.
    pub ninja: bool,
    pub mode: SubmitMode,
    /// Whether this runs in a staff capacity; requires `session`.
    pub admin: bool,
    pub session: Option<StaffSession>,
    pub ip: IpAddr,
}

impl SubmitRequest {
    /// An empty request from the given address.
    pub fn new(ip: IpAddr) -> SubmitRequest {
        SubmitRequest {
            parent: String::new(),
            name: String::new(),
            email: String::new(),
            subject: String::new(),
            comment: String::new(),
            password: String::new(),
            upload: None,
            no_file: false,
            captcha: None,
            sticky: false,
            lock: false,
            no_captcha: false,
            no_format: false,
            killtrip: false,
            ninja: false,
            mode: SubmitMode::Create,
            admin: false,
            session: None,
            ip,
        }
    }
}

/// Where the poster should be sent after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Back to the board index.
    Index,
    /// Into the thread ("noko"), preferring the abbreviated page when one
    /// exists.
    Thread {
        thread: PostId,
        abbreviated: bool,
    },
}

/// The values the embedder should set as convenience cookies.
#[derive(Debug, Clone)]
pub struct CookieValues {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// The result of a successful submission.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub num: PostId,
    pub redirect: RedirectTarget,
    pub cookies: CookieValues,
}

/// A batch request to delete posts.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub posts: Vec<PostId>,
    pub password: String,
    /// Strip the image but keep the post.
    pub file_only: bool,
    /// Move the thread into the archive instead of the backup area.
    /// Staff only; ignored otherwise.
    pub archive: bool,
    pub admin: bool,
    pub session: Option<StaffSession>,
}

/// A batch request to report posts.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    /// Post numbers as submitted, still strings.
    pub posts: Vec<String>,
    pub comment: String,
    pub ip: IpAddr,
}

/// A per-target failure inside a moderation batch.
#[derive(Debug)]
pub struct TargetError {
    pub target: String,
    pub error: Error,
}

/// The collected per-target failures of a moderation batch. The batch
/// itself succeeded; these targets did not.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub errors: Vec<TargetError>,
}

/// The process-wide entry point: configuration, store, oracles, renderer,
/// and the board registry.
pub struct Core {
    pub config: Config,
    pub db: Database,
    pub hooks: Box<dyn Hooks>,
    pub renderer: Box<dyn Renderer>,
    boards: RwLock<HashMap<String, Arc<Board>>>,
}

impl Core {
    pub fn new(
        config: Config,
        db: Database,
        hooks: Box<dyn Hooks>,
        renderer: Box<dyn Renderer>,
    ) -> Core {
        Core {
            config,
            db,
            hooks,
            renderer,
            boards: RwLock::new(HashMap::new()),
        }
    }

    /// Get a board, lazily materializing it from configuration.
    ///
    /// The registry is populated on first use; a board's directories are
    /// created when it is.
    pub fn board(&self, name: &str) -> Result<Arc<Board>> {
        {
            let boards =
                self.boards.read().expect("board registry poisoned");
            if let Some(board) = boards.get(name) {
                return Ok(Arc::clone(board));
            }
        }

        let options = self.config.board_options(name)?.clone();
        let paths = BoardPaths::new(
            &self.config.site_dir,
            name,
            &options,
            &self.config.page_ext,
        );
        paths.ensure_dirs()?;

        let board = Arc::new(Board {
            name: name.to_string(),
            options,
            paths,
        });

        self.boards
            .write()
            .expect("board registry poisoned")
            .insert(name.to_string(), Arc::clone(&board));

        Ok(board)
    }
}

/// One board: its name, options, and artifact locations. All lifecycle
/// operations hang off this type.
#[derive(Debug)]
pub struct Board {
    pub name: String,
    pub options: BoardOptions,
    pub paths: BoardPaths,
}

fn parse_parent(raw: &str) -> Result<PostId> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Ok(0);
    }
    if raw.len() > 10 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::UnusualCharacters);
    }

    raw.parse().map_err(|_| Error::UnusualCharacters)
}

impl Board {
    fn cache<'a>(&'a self, core: &'a Core) -> CacheBuilder<'a> {
        CacheBuilder {
            db: &core.db,
            config: &core.config,
            options: &self.options,
            paths: &self.paths,
            renderer: core.renderer.as_ref(),
            board_name: &self.name,
        }
    }

    fn check_access<'a>(
        &self,
        session: Option<&'a StaffSession>,
    ) -> Result<&'a StaffSession> {
        let session = session.ok_or(Error::StaffSessionRequired)?;

        if !session.may_moderate(&self.name) {
            return Err(Error::BoardAccessDenied {
                board_name: self.name.clone(),
                user_name: session.username.clone(),
            });
        }

        Ok(session)
    }

    /// Create or edit a post.
    ///
    /// Runs the full pipeline: authorization, validation, the thread
    /// gate, external oracles, the flood gate, attachment ingest, field
    /// normalization, persistence, thread bookkeeping, and the cache
    /// rebuilds. Returns the post number and where to send the poster.
    pub fn submit(
        &self,
        core: &Core,
        req: SubmitRequest,
    ) -> Result<SubmitOutcome> {
        let db = &core.db;
        let config = &core.config;
        let options = &self.options;
        let now = Utc::now().timestamp_millis();

        if req.admin {
            self.check_access(req.session.as_ref())?;
        }

        // Editing starts from the stored row; the password must match the
        // stored plaintext credential unless staff is at work.
        let original = match req.mode {
            SubmitMode::Edit { num } => {
                let row = db.post(self.name.as_str(), num)?;
                if !req.admin && req.password != row.password {
                    return Err(Error::WrongPassword { post_num: num });
                }
                Some(row)
            }
            SubmitMode::Create => None,
        };

        let thread_num = match &original {
            Some(row) => row.parent,
            None => parse_parent(&req.parent)?,
        };

        if original.is_none()
            && (normalize::has_crlf(&req.name)
                || normalize::has_crlf(&req.email)
                || normalize::has_crlf(&req.subject))
        {
            return Err(Error::UnusualCharacters);
        }

        if req.name.chars().count() > options.max_field_length
            || req.email.chars().count() > options.max_field_length
            || req.subject.chars().count() > options.max_field_length
            || req.comment.chars().count() > options.max_comment_length
        {
            return Err(Error::FieldTooLong);
        }

        if !req.admin
            && (req.no_captcha
                || req.no_format
                || req.lock
                || (req.sticky && thread_num == 0))
        {
            return Err(Error::PrivilegedParameter);
        }

        let has_file = req.upload.is_some();

        if original.is_none() {
            if thread_num == 0 && !has_file && !req.no_file {
                return Err(Error::NoFileChosen);
            }

            if !req.admin {
                let allowed = if thread_num != 0 {
                    if has_file {
                        options.allow_image_replies
                    } else {
                        options.allow_text_replies
                    }
                } else if has_file {
                    options.allow_images
                } else {
                    options.allow_text_only
                };

                if !allowed {
                    return Err(Error::PostingNotAllowed);
                }
            }
        }

        if req.comment.trim().is_empty() && !has_file {
            return Err(Error::EmptyPost);
        }

        // Thread-state gate: the parent must exist and be open; its
        // sticky state propagates into the reply.
        let mut sticky = if req.admin && req.sticky { 1 } else { 0 };
        if let Some(row) = &original {
            sticky = row.stickied;
        }

        let mut lasthit = now;
        let root = if thread_num != 0 {
            let root = db.thread_root(self.name.as_str(), thread_num)?;

            if root.stickied != 0 {
                sticky = root.stickied;
            } else if !req.admin {
                sticky = 0;
            }
            if root.locked && !req.admin {
                return Err(Error::ThreadLocked);
            }

            lasthit = root.lasthit;
            Some(root)
        } else {
            None
        };

        if req.admin && thread_num != 0 && (req.sticky || req.lock) {
            db.set_thread_state(
                &self.name,
                thread_num,
                req.sticky.then_some(1),
                req.lock.then_some(true),
            )?;
        }

        // External oracles. Whitelisted addresses skip everything here
        // except the captcha, which only trusted tripcodes skip.
        let whitelisted = config.is_whitelisted(req.ip);
        let fields = PostFields {
            name: &req.name,
            email: &req.email,
            subject: &req.subject,
            comment: &req.comment,
        };

        let (mut name, derived_trip) =
            normalize::process_tripcode(&req.name, &options.tripkey);
        let mut trip = match (&original, req.killtrip) {
            (Some(row), false) if !row.trip.is_empty() => row.trip.clone(),
            _ => derived_trip,
        };

        if !whitelisted && !req.admin {
            core.hooks.ban_check(req.ip, &fields)?;
            if options.spam_trap {
                core.hooks.spam_check(&fields)?;
            }
        }
        if options.enable_captcha
            && !req.no_captcha
            && !config.is_trusted(&trip)
        {
            core.hooks.captcha_check(
                req.captcha.as_deref(),
                req.ip,
                thread_num,
            )?;
        }
        if !whitelisted && options.enable_proxy_check {
            core.hooks.proxy_check(req.ip)?;
        }

        // Field normalization.
        let mut email = req.email.clone();
        if options.forced_anon {
            name.clear();
            trip.clear();
            email = if email.eq_ignore_ascii_case("sage") {
                "sage".into()
            } else {
                String::new()
            };
        }
        let email = normalize::normalize_email(&email);

        let subject = normalize::clean_string(&req.subject);
        let comment = if req.no_format {
            req.comment.clone()
        } else {
            normalize::sanitize_comment(&req.comment)
        };

        if name.is_empty() && trip.is_empty() {
            name = options.anonymous.clone();
        }
        let subject = if subject.is_empty() {
            options.default_subject.clone()
        } else {
            subject
        };
        let comment = if comment.trim().is_empty() {
            options.default_comment.clone()
        } else {
            comment
        };

        let encoded_ip = normalize::encode_ip(req.ip);

        // Flood gate. Edits insert nothing, so only new posts count.
        if original.is_none() && !whitelisted {
            flood::check_post(
                db,
                &self.name,
                options,
                &encoded_ip,
                now,
                &comment,
                has_file,
            )?;
        }

        // Attachment ingest. A replaced image is disposed of first; the
        // new file is staged and validated before the row is touched.
        let file_timestamp =
            original.as_ref().map(|row| row.timestamp).unwrap_or(now);

        let mut stored: Option<StoredImage> = None;
        if let Some(upload) = &req.upload {
            if let Some(row) = &original {
                if !row.image.is_empty() {
                    let disposition = if config.post_backup {
                        Disposition::Backup
                    } else {
                        Disposition::Delete
                    };
                    files::dispose(
                        &self.paths,
                        &row.image,
                        &row.thumbnail,
                        disposition,
                    )?;
                }
            }

            let ctx = FileContext {
                db,
                board_name: &self.name,
                options,
                config,
                paths: &self.paths,
            };
            stored = Some(files::ingest(
                &ctx,
                upload,
                file_timestamp,
                thread_num,
                original.is_some(),
            )?);
        }

        // Persistence: all derived fields in one row write.
        let (date, lastedit) = match &original {
            None => {
                (normalize::format_date(now, options.date_style), String::new())
            }
            Some(row) => {
                let stamp = if req.ninja {
                    String::new()
                } else {
                    normalize::format_date(now, options.date_style)
                };
                (row.date.clone(), stamp)
            }
        };

        let blank = StoredImage {
            image: String::new(),
            size: 0,
            md5: String::new(),
            width: 0,
            height: 0,
            thumbnail: String::new(),
            tn_width: 0,
            tn_height: 0,
        };
        let media = match (&stored, &original) {
            (Some(stored), _) => stored.clone(),
            (None, Some(row)) => StoredImage {
                image: row.image.clone(),
                size: row.size,
                md5: row.md5.clone(),
                width: row.width,
                height: row.height,
                thumbnail: row.thumbnail.clone(),
                tn_width: row.tn_width,
                tn_height: row.tn_height,
            },
            (None, None) => blank,
        };

        let password = match &original {
            None => req.password.clone(),
            Some(row) => {
                if req.admin && !req.password.is_empty() {
                    req.password.clone()
                } else {
                    row.password.clone()
                }
            }
        };

        let new_post = NewPost {
            board: self.name.clone(),
            num: original.as_ref().map(|row| row.num).unwrap_or(0),
            parent: thread_num,
            timestamp: original
                .as_ref()
                .map(|row| row.timestamp)
                .unwrap_or(now),
            lasthit: original
                .as_ref()
                .map(|row| row.lasthit)
                .unwrap_or(lasthit),
            ip: original
                .as_ref()
                .map(|row| row.ip.clone())
                .unwrap_or_else(|| encoded_ip.clone()),
            date,
            name,
            trip,
            email: email.clone(),
            subject,
            password,
            comment,
            image: media.image,
            size: media.size,
            md5: media.md5,
            width: media.width,
            height: media.height,
            thumbnail: media.thumbnail,
            tn_width: media.tn_width,
            tn_height: media.tn_height,
            lastedit,
            lastedit_ip: if original.is_some() {
                encoded_ip.clone()
            } else {
                String::new()
            },
            admin_post: req.admin
                || original.as_ref().map(|row| row.admin_post).unwrap_or(false),
            stickied: sticky,
            locked: match &original {
                Some(row) => row.locked || (req.admin && req.lock),
                None => req.admin && req.lock,
            },
            backup: false,
            timestampofarchival: 0,
        };

        let post_num = match req.mode {
            SubmitMode::Create => db.insert_post(new_post)?,
            SubmitMode::Edit { num } => {
                db.update_post(&self.name, num, &new_post)?;
                num
            }
        };

        // Thread bookkeeping: bump unless saged or past the reply cap.
        if original.is_none() {
            if let Some(root) = &root {
                let over_cap = db
                    .reply_count_for_bump(root, options.nosage_window)?
                    > options.max_res as i64;

                if !normalize::is_sage(&email) && !over_cap {
                    db.bump_thread(&self.name, thread_num, now)?;
                }
            }

            if thread_num == 0 && post_num == 1 {
                // Numbering reset: the board was wiped, its reports with it.
                db.clear_reports(&self.name)?;
            }
        }

        self.trim_database(core, now)?;

        // Cache rebuild: the index is always stale after a mutation, and
        // so is the affected thread's page.
        let cache = self.cache(core);
        cache.build_board_cache()?;

        let page_thread = if thread_num != 0 { thread_num } else { post_num };
        cache.build_thread_cache(page_thread)?;

        let noko = req.subject.eq_ignore_ascii_case("noko")
            || req.email.eq_ignore_ascii_case("noko");
        let redirect = if noko {
            RedirectTarget::Thread {
                thread: page_thread,
                abbreviated: self
                    .paths
                    .thread_path(page_thread, true)
                    .exists(),
            }
        } else {
            RedirectTarget::Index
        };

        info!(
            "/{}/: post #{} {}",
            self.name,
            post_num,
            if original.is_some() { "edited" } else { "created" }
        );

        Ok(SubmitOutcome {
            num: post_num,
            redirect,
            cookies: CookieValues {
                name: req.name,
                email: req.email,
                password: req.password,
            },
        })
    }

    /// Delete a batch of posts.
    ///
    /// Per-post failures are collected and returned; the batch carries
    /// on. Deleting a thread root takes every reply with it, into the
    /// backup area, the archive, or oblivion depending on configuration.
    pub fn delete(
        &self,
        core: &Core,
        req: DeleteRequest,
    ) -> Result<BatchOutcome> {
        if req.admin {
            self.check_access(req.session.as_ref())?;
        }

        if req.posts.len() > core.config.max_batch_targets {
            return Err(Error::TooManyTargets {
                max: core.config.max_batch_targets,
            });
        }

        let now = Utc::now().timestamp_millis();
        self.remove_old_backups(core, now)?;

        let archiving = req.archive && req.admin;

        let mut errors = Vec::new();
        for &target in &req.posts {
            let result = self.delete_post(
                core,
                target,
                &req.password,
                req.file_only,
                archiving,
                req.admin,
                now,
            );

            if let Err(error) = result {
                if error.is_per_target() {
                    warn!(
                        "/{}/: couldn't delete post #{}: {}",
                        self.name, target, error
                    );
                    errors.push(TargetError {
                        target: target.to_string(),
                        error,
                    });
                } else {
                    return Err(error);
                }
            }
        }

        self.cache(core).build_board_cache()?;

        Ok(BatchOutcome { errors })
    }

    /// Delete a single post. Media moves before the rows change, and the
    /// thread's cached pages follow the row state.
    fn delete_post(
        &self,
        core: &Core,
        target: PostId,
        password: &str,
        file_only: bool,
        archiving: bool,
        admin: bool,
        now: i64,
    ) -> Result<()> {
        let db = &core.db;
        let config = &core.config;

        let row = db.post(self.name.as_str(), target)?;

        if !admin {
            if row.admin_post {
                return Err(Error::StaffDeleteOnly { post_num: target });
            }
            if password != row.password {
                return Err(Error::WrongPassword { post_num: target });
            }
        }

        let disposition = if archiving {
            Disposition::Archive
        } else if config.post_backup {
            Disposition::Backup
        } else {
            Disposition::Delete
        };

        if file_only {
            if !row.image.is_empty() {
                files::dispose(
                    &self.paths,
                    &row.image,
                    &row.thumbnail,
                    disposition,
                )?;
            }
            db.strip_image(&self.name, target)?;
        } else {
            for (image, thumbnail) in db.thread_media(&self.name, target)? {
                files::dispose(&self.paths, &image, &thumbnail, disposition)?;
            }

            if config.post_backup && !archiving {
                db.soft_delete(&self.name, target, now)?;
            } else {
                db.hard_delete(&self.name, target)?;
            }
        }

        let cache = self.cache(core);
        if row.is_thread() {
            if file_only {
                cache.build_thread_cache(target)?;
            } else {
                cache.delete_thread_cache(target, archiving)?;
            }
        } else {
            cache.build_thread_cache(row.parent)?;
        }

        Ok(())
    }

    /// Restore backed-up posts. A thread root brings back every reply
    /// archived with it, as one group.
    pub fn restore_backups(
        &self,
        core: &Core,
        posts: &[PostId],
        session: &StaffSession,
    ) -> Result<BatchOutcome> {
        self.check_access(Some(session))?;

        let mut errors = Vec::new();
        for &target in posts {
            if let Err(error) = self.restore_backup(core, target) {
                if error.is_per_target() {
                    warn!(
                        "/{}/: couldn't restore post #{}: {}",
                        self.name, target, error
                    );
                    errors.push(TargetError {
                        target: target.to_string(),
                        error,
                    });
                } else {
                    return Err(error);
                }
            }
        }

        self.cache(core).build_board_cache()?;

        Ok(BatchOutcome { errors })
    }

    fn restore_backup(&self, core: &Core, target: PostId) -> Result<()> {
        let db = &core.db;
        let row = db.backup_post(&self.name, target)?;

        if row.is_thread() {
            let group = db.backup_group(
                &self.name,
                row.num,
                row.timestampofarchival,
            )?;

            for post in &group {
                if !post.image.is_empty() {
                    files::restore_media(
                        &self.paths,
                        &post.image,
                        &post.thumbnail,
                    )?;
                }
            }

            db.restore_group(&self.name, row.num, row.timestampofarchival)?;
            self.cache(core).build_thread_cache(row.num)?;
        } else {
            // A reply only has somewhere to go if its thread is still up.
            db.thread_root(self.name.as_str(), row.parent).map_err(
                |err| match err {
                    Error::ThreadNotFound { .. } => Error::ParentThreadGone {
                        post_num: target,
                    },
                    other => other,
                },
            )?;

            if !row.image.is_empty() {
                files::restore_media(&self.paths, &row.image, &row.thumbnail)?;
            }

            db.restore_post(&self.name, row.num)?;
            self.cache(core).build_thread_cache(row.parent)?;
        }

        Ok(())
    }

    /// Permanently remove backed-up posts and their media.
    pub fn purge_backups(
        &self,
        core: &Core,
        posts: &[PostId],
        session: &StaffSession,
    ) -> Result<BatchOutcome> {
        self.check_access(Some(session))?;

        let mut errors = Vec::new();
        for &target in posts {
            if let Err(error) = self.purge_backup(core, target) {
                if error.is_per_target() {
                    errors.push(TargetError {
                        target: target.to_string(),
                        error,
                    });
                } else {
                    return Err(error);
                }
            }
        }

        self.cache(core).build_board_cache()?;

        Ok(BatchOutcome { errors })
    }

    fn purge_backup(&self, core: &Core, target: PostId) -> Result<()> {
        let db = &core.db;
        let row = db.backup_post(&self.name, target)?;

        let group = if row.is_thread() {
            db.backup_group(&self.name, row.num, row.timestampofarchival)?
        } else {
            vec![row]
        };

        for post in &group {
            if !post.image.is_empty() {
                files::purge_backup_media(
                    &self.paths,
                    &post.image,
                    &post.thumbnail,
                )?;
            }
        }

        db.purge_backup_rows(&self.name, target)?;

        Ok(())
    }

    /// File reports against a batch of posts.
    ///
    /// The offending address is captured into the report so it survives
    /// deletion of the post. Already-reported and already-resolved posts
    /// are per-target errors; the batch carries on.
    pub fn report(
        &self,
        core: &Core,
        req: ReportRequest,
    ) -> Result<BatchOutcome> {
        let db = &core.db;
        let config = &core.config;
        let now = Utc::now().timestamp_millis();

        let trimmed = req.comment.trim();
        if trimmed.chars().count() < config.report_min_length {
            return Err(Error::ReportTooShort);
        }
        if trimmed.chars().count() > config.report_max_length {
            return Err(Error::ReportTooLong {
                max: config.report_max_length,
            });
        }
        if req.posts.len() > config.max_batch_targets {
            return Err(Error::TooManyTargets {
                max: config.max_batch_targets,
            });
        }

        // The ban list always runs first; the whitelist only skips the
        // flood window.
        let fields = PostFields {
            name: "",
            email: "",
            subject: "",
            comment: trimmed,
        };
        core.hooks.ban_check(req.ip, &fields)?;

        let encoded_ip = normalize::encode_ip(req.ip);
        if !config.is_whitelisted(req.ip) {
            flood::check_report(db, config, &encoded_ip, now)?;
        }

        let comment = normalize::clean_string(trimmed);
        let date = normalize::format_date(now, self.options.date_style);

        let mut errors = Vec::new();
        for target in &req.posts {
            let result =
                self.file_report(db, target, &encoded_ip, &comment, now, &date);

            if let Err(error) = result {
                if error.is_per_target() {
                    errors.push(TargetError {
                        target: target.clone(),
                        error,
                    });
                } else {
                    return Err(error);
                }
            }
        }

        Ok(BatchOutcome { errors })
    }

    fn file_report(
        &self,
        db: &Database,
        target: &str,
        reporter: &str,
        comment: &str,
        now: i64,
        date: &str,
    ) -> Result<()> {
        let post_num: PostId = match target.parse() {
            Ok(num) => num,
            Err(_) => {
                return Err(Error::InvalidPostNumber {
                    input: target.to_string(),
                })
            }
        };

        let row = db.post(self.name.as_str(), post_num)?;

        if let Some(existing) = db.report_for_post(&self.name, post_num)? {
            return Err(if existing.resolved {
                Error::AlreadyResolved { post_num }
            } else {
                Error::AlreadyReported { post_num }
            });
        }

        db.insert_report(NewReport {
            board: self.name.clone(),
            reporter: reporter.to_string(),
            offender: row.ip,
            postnum: post_num,
            comment: comment.to_string(),
            timestamp: now,
            date: date.to_string(),
            resolved: false,
        })
    }

    /// The board's unresolved reports, for the moderation queue.
    pub fn reports(&self, core: &Core) -> Result<Vec<Report>> {
        core.db.unresolved_reports(&self.name)
    }

    /// Pin or lock a thread, propagating the flag over the root and every
    /// reply, then refresh the affected pages.
    pub fn set_thread_flag(
        &self,
        core: &Core,
        thread_num: PostId,
        flag: ThreadFlag,
        enabled: bool,
        session: &StaffSession,
    ) -> Result<()> {
        self.check_access(Some(session))?;

        let row = core.db.post(self.name.as_str(), thread_num)?;
        if !row.is_thread() {
            return Err(Error::NotAThread {
                post_num: thread_num,
            });
        }

        match flag {
            ThreadFlag::Sticky => core.db.set_thread_state(
                &self.name,
                thread_num,
                Some(i32::from(enabled)),
                None,
            )?,
            ThreadFlag::Lock => core.db.set_thread_state(
                &self.name,
                thread_num,
                None,
                Some(enabled),
            )?,
        }

        let cache = self.cache(core);
        cache.build_thread_cache(thread_num)?;
        cache.build_board_cache()?;

        info!(
            "/{}/: thread #{} {} {}",
            self.name,
            thread_num,
            match flag {
                ThreadFlag::Sticky => "sticky",
                ThreadFlag::Lock => "lock",
            },
            if enabled { "set" } else { "cleared" }
        );

        Ok(())
    }

    /// Delete every live post from an address, mask-aware. A moderation
    /// sweep; individual failures are collected.
    pub fn delete_by_ip(
        &self,
        core: &Core,
        ip: &str,
        mask: Option<&str>,
        session: &StaffSession,
    ) -> Result<BatchOutcome> {
        self.check_access(Some(session))?;

        let target_ip = normalize::parse_ip_value(ip).ok_or_else(|| {
            Error::InvalidIpValue { input: ip.to_string() }
        })?;
        let mask_value = match mask {
            Some(mask) => normalize::parse_ip_value(mask).ok_or_else(|| {
                Error::InvalidIpValue {
                    input: mask.to_string(),
                }
            })?,
            None => u128::MAX,
        };

        let now = Utc::now().timestamp_millis();

        let mut errors = Vec::new();
        for row in core.db.live_posts(&self.name)? {
            let row_ip = match normalize::parse_ip_value(&row.ip) {
                Some(value) => value,
                None => continue,
            };
            if row_ip & mask_value != target_ip & mask_value {
                continue;
            }

            match self.delete_post(core, row.num, "", false, false, true, now)
            {
                Ok(()) => {}
                // Already gone with its thread.
                Err(Error::PostNotFound { .. }) => {}
                Err(error) if error.is_per_target() => {
                    errors.push(TargetError {
                        target: row.num.to_string(),
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        self.cache(core).build_board_cache()?;

        Ok(BatchOutcome { errors })
    }

    /// Rebuild every cached artifact of the board from the store.
    pub fn rebuild_caches(&self, core: &Core) -> Result<()> {
        let cache = self.cache(core);
        cache.build_all_thread_caches()?;
        cache.build_board_cache()
    }

    /// Trim threads past the board's age limit, archiving them when the
    /// board is configured to.
    fn trim_database(&self, core: &Core, now: i64) -> Result<()> {
        let max_age = match self.options.max_age {
            Some(age) => age,
            None => return Ok(()),
        };

        let cutoff = now - max_age.as_millis() as i64;
        for root in core.db.stale_thread_roots(&self.name, cutoff)? {
            info!(
                "/{}/: trimming thread #{} past the age limit",
                self.name, root.num
            );
            self.delete_post(
                core,
                root.num,
                "",
                false,
                self.options.archive_mode,
                true,
                now,
            )?;
        }

        Ok(())
    }

    /// Drop backups past their retention, media first.
    fn remove_old_backups(&self, core: &Core, now: i64) -> Result<()> {
        let cutoff = now - core.config.backup_expire.as_millis() as i64;

        let expired = core.db.expired_backups(&self.name, cutoff)?;
        if expired.is_empty() {
            return Ok(());
        }

        for row in &expired {
            if !row.image.is_empty() {
                files::purge_backup_media(
                    &self.paths,
                    &row.image,
                    &row.thumbnail,
                )?;
            }
        }

        core.db.delete_backups_before(&self.name, cutoff)?;

        Ok(())
    }
}

/// A thread flag staff can toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadFlag {
    Sticky,
    Lock,
}
