//! End-to-end lifecycle coverage against a temp-dir database: submission,
//! bumping, flood windows, duplicate detection, deletion, backup/restore,
//! reports, and the cached artifacts.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use diesel::prelude::*;

use tempfile::TempDir;

use corkboard::board::{
    Core, DeleteRequest, RedirectTarget, ReportRequest, StaffSession,
    SubmitMode, SubmitRequest, ThreadFlag,
};
use corkboard::cache::Renderer;
use corkboard::config::{BoardOptions, Config, DuplicateScope};
use corkboard::files::Upload;
use corkboard::hooks::AllowAll;
use corkboard::models::Database;
use corkboard::{Error, Result};

/// Renders every template as its name plus the JSON data, which keeps the
/// artifacts grep-able in asserts.
struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(
        &self,
        template: &str,
        data: &serde_json::Value,
    ) -> Result<String> {
        Ok(format!("{}\n{}", template, data))
    }
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join("board.db")
}

fn make_core<F>(dir: &Path, tweak: F) -> Core
where
    F: FnOnce(&mut Config, &mut BoardOptions),
{
    let mut config = Config::default();
    config.site_dir = dir.join("site");
    config.template_dir = dir.join("templates");

    let mut options = BoardOptions::default();
    // Quiet the windows by default; individual tests turn them back on.
    options.post_flood_window = Duration::from_secs(0);
    options.image_flood_window = Duration::from_secs(0);
    options.repeat_flood_window = Duration::from_secs(0);
    options.duplicate_detection = DuplicateScope::Off;

    tweak(&mut config, &mut options);
    config.boards.insert("tech".to_string(), options);

    let db = Database::open(db_path(dir)).expect("open database");

    Core::new(config, db, Box::new(AllowAll), Box::new(JsonRenderer))
}

fn ip(last: u8) -> IpAddr {
    IpAddr::from([127, 0, 0, last])
}

fn text_post(parent: &str, comment: &str, ip_last: u8) -> SubmitRequest {
    let mut req = SubmitRequest::new(ip(ip_last));
    req.parent = parent.to_string();
    req.comment = comment.to_string();
    req.password = "hunter2".to_string();
    req.no_file = true;
    req
}

fn png_upload(dir: &Path, name: &str, shade: u8) -> Upload {
    let path = dir.join(name);
    let img = image::RgbaImage::from_pixel(
        32,
        32,
        image::Rgba([shade, 0, 0, 255]),
    );
    img.save(&path).expect("write fixture png");

    Upload {
        source: path,
        original_name: name.to_string(),
    }
}

fn image_post(
    parent: &str,
    comment: &str,
    ip_last: u8,
    upload: Upload,
) -> SubmitRequest {
    let mut req = text_post(parent, comment, ip_last);
    req.no_file = false;
    req.upload = Some(upload);
    req
}

/// Uploads within the same millisecond would share a stored file name.
fn settle() {
    std::thread::sleep(Duration::from_millis(5));
}

/// Shift every post of the test board back in time.
fn backdate_all(dir: &Path, by_ms: i64) {
    use corkboard::schema::post::dsl::{lasthit, post, timestamp};

    let mut conn = diesel::SqliteConnection::establish(
        db_path(dir).to_string_lossy().as_ref(),
    )
    .expect("open raw connection");

    diesel::update(post)
        .set((timestamp.eq(timestamp - by_ms), lasthit.eq(lasthit - by_ms)))
        .execute(&mut conn)
        .expect("backdate posts");
}

#[test]
fn thread_and_reply_share_lasthit_after_bump() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    let op = board.submit(&core, text_post("", "first post", 1))?;
    assert_eq!(op.num, 1);
    assert_eq!(op.redirect, RedirectTarget::Index);

    let reply = board.submit(&core, text_post("1", "a reply", 2))?;
    assert_eq!(reply.num, 2);

    let posts = core.db.thread_posts("tech", 1)?;
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].parent, 0);
    assert_eq!(posts[1].parent, 1);
    assert_eq!(posts[0].lasthit, posts[1].lasthit);
    assert!(posts[0].lasthit >= posts[1].timestamp);

    assert!(board.paths.page_path(0).exists());
    assert!(board.paths.thread_path(1, false).exists());

    Ok(())
}

#[test]
fn sage_does_not_bump() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "first post", 1))?;
    let before = core.db.thread_posts("tech", 1)?[0].lasthit;

    let mut req = text_post("1", "quiet reply", 2);
    req.email = "sage".to_string();
    board.submit(&core, req)?;

    let posts = core.db.thread_posts("tech", 1)?;
    assert_eq!(posts[0].lasthit, before);
    assert_eq!(posts[1].lasthit, before);
    assert_eq!(posts[1].email, "mailto:sage");

    Ok(())
}

#[test]
fn noko_redirects_into_the_thread() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "first post", 1))?;

    let mut req = text_post("1", "take me back", 2);
    req.email = "noko".to_string();
    let out = board.submit(&core, req)?;

    assert_eq!(
        out.redirect,
        RedirectTarget::Thread {
            thread: 1,
            abbreviated: false
        }
    );

    Ok(())
}

#[test]
fn locked_thread_rejects_replies_except_staff() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;
    let session = StaffSession::global("mod");

    board.submit(&core, text_post("", "first post", 1))?;
    board.set_thread_flag(&core, 1, ThreadFlag::Lock, true, &session)?;

    let err = board
        .submit(&core, text_post("1", "too late", 2))
        .unwrap_err();
    assert!(matches!(err, Error::ThreadLocked));

    let mut req = text_post("1", "staff note", 3);
    req.admin = true;
    req.session = Some(session);
    board.submit(&core, req)?;

    let posts = core.db.thread_posts("tech", 1)?;
    assert_eq!(posts.len(), 2);
    assert!(posts[1].admin_post);

    Ok(())
}

#[test]
fn sticky_propagates_and_orders_first() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;
    let session = StaffSession::global("mod");

    board.submit(&core, text_post("", "old thread", 1))?;
    board.submit(&core, text_post("", "new thread", 2))?;

    board.set_thread_flag(&core, 1, ThreadFlag::Sticky, true, &session)?;
    board.submit(&core, text_post("2", "bump the other", 3))?;

    let threads = core.db.threads("tech")?;
    assert_eq!(threads[0][0].num, 1);
    assert_eq!(threads[1][0].num, 2);

    board.submit(&core, text_post("1", "reply to sticky", 4))?;
    let posts = core.db.thread_posts("tech", 1)?;
    assert_eq!(posts[1].stickied, 1);

    Ok(())
}

#[test]
fn flood_window_rejects_rapid_posts() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, options| {
        options.post_flood_window = Duration::from_secs(60);
    });
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "first post", 1))?;

    let err = board
        .submit(&core, text_post("", "again already", 1))
        .unwrap_err();
    assert!(matches!(err, Error::PostFlood));

    // Someone else is fine.
    board.submit(&core, text_post("", "different poster", 2))?;

    // And so is the first poster once the window has passed.
    backdate_all(tmp.path(), 120_000);
    board.submit(&core, text_post("", "patience", 1))?;

    Ok(())
}

#[test]
fn repeated_comment_is_a_flood() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, options| {
        options.repeat_flood_window = Duration::from_secs(300);
    });
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "same words", 1))?;
    backdate_all(tmp.path(), 60_000);

    let err = board
        .submit(&core, text_post("", "same words", 1))
        .unwrap_err();
    assert!(matches!(err, Error::RepeatedComment));

    board.submit(&core, text_post("", "other words", 1))?;

    Ok(())
}

#[test]
fn duplicate_image_detection_scopes() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, options| {
        options.duplicate_detection = DuplicateScope::Thread;
    });
    let board = core.board("tech")?;

    let first = board.submit(
        &core,
        image_post("", "original", 1, png_upload(tmp.path(), "a.png", 1)),
    )?;
    settle();

    // Same bytes into the same thread: rejected, pointing at the holder.
    let err = board
        .submit(
            &core,
            image_post(
                "1",
                "repost",
                2,
                png_upload(tmp.path(), "b.png", 1),
            ),
        )
        .unwrap_err();
    match err {
        Error::DuplicateImage { location } => {
            assert_eq!(location, format!("res/1.html#{}", first.num));
        }
        other => panic!("expected DuplicateImage, got {}", other),
    }
    settle();

    // Same bytes into a different thread: fine under thread scope.
    board.submit(
        &core,
        image_post("", "elsewhere", 3, png_upload(tmp.path(), "c.png", 1)),
    )?;

    // Board scope catches it across threads.
    let tmp2 = TempDir::new()?;
    let core2 = make_core(tmp2.path(), |_, options| {
        options.duplicate_detection = DuplicateScope::Board;
    });
    let board2 = core2.board("tech")?;

    board2.submit(
        &core2,
        image_post("", "original", 1, png_upload(tmp2.path(), "a.png", 7)),
    )?;
    settle();

    let err = board2
        .submit(
            &core2,
            image_post(
                "",
                "new thread same file",
                2,
                png_upload(tmp2.path(), "b.png", 7),
            ),
        )
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateImage { .. }));

    Ok(())
}

#[test]
fn stored_image_and_thumbnail_land_in_place() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    board.submit(
        &core,
        image_post("", "with a file", 1, png_upload(tmp.path(), "a.png", 1)),
    )?;

    let post = core.db.post("tech", 1)?;
    assert!(post.image.starts_with("src/"));
    assert!(post.image.ends_with(".png"));
    assert_eq!(post.width, 32);
    assert_eq!(post.height, 32);
    assert!(!post.md5.is_empty());
    // Small enough to serve as its own thumbnail.
    assert_eq!(post.thumbnail, post.image);
    assert!(board.paths.live_path(&post.image).exists());

    Ok(())
}

#[test]
fn file_only_delete_strips_the_image() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    board.submit(
        &core,
        image_post("", "with a file", 1, png_upload(tmp.path(), "a.png", 1)),
    )?;
    let stored = core.db.post("tech", 1)?.image.clone();

    let outcome = board.delete(
        &core,
        DeleteRequest {
            posts: vec![1],
            password: "hunter2".to_string(),
            file_only: true,
            archive: false,
            admin: false,
            session: None,
        },
    )?;
    assert!(outcome.errors.is_empty());

    let post = core.db.post("tech", 1)?;
    assert!(post.image.is_empty());
    assert!(post.md5.is_empty());
    assert_eq!(post.size, 0);
    assert!(!board.paths.live_path(&stored).exists());

    Ok(())
}

#[test]
fn deleting_a_root_archives_the_whole_group() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |config, _| {
        config.post_backup = true;
    });
    let board = core.board("tech")?;
    let session = StaffSession::global("mod");

    board.submit(&core, text_post("", "first post", 1))?;
    board.submit(&core, text_post("1", "reply one", 2))?;
    board.submit(&core, text_post("1", "reply two", 3))?;

    let outcome = board.delete(
        &core,
        DeleteRequest {
            posts: vec![1],
            password: "hunter2".to_string(),
            file_only: false,
            archive: false,
            admin: false,
            session: None,
        },
    )?;
    assert!(outcome.errors.is_empty());

    assert!(core.db.thread_posts("tech", 1).is_err());
    assert!(!board.paths.thread_path(1, false).exists());

    let root = core.db.backup_post("tech", 1)?;
    let group =
        core.db.backup_group("tech", 1, root.timestampofarchival)?;
    assert_eq!(group.len(), 3);
    assert!(group
        .iter()
        .all(|p| p.timestampofarchival == root.timestampofarchival));

    // Post numbering continues: nothing was hard-removed.
    let next = board.submit(&core, text_post("", "meanwhile", 4))?;
    assert_eq!(next.num, 4);

    // Group restore brings the whole thread back.
    let outcome = board.restore_backups(&core, &[1], &session)?;
    assert!(outcome.errors.is_empty());

    let posts = core.db.thread_posts("tech", 1)?;
    assert_eq!(posts.len(), 3);
    assert!(board.paths.thread_path(1, false).exists());

    Ok(())
}

#[test]
fn restoring_a_reply_needs_a_live_parent() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |config, _| {
        config.post_backup = true;
    });
    let board = core.board("tech")?;
    let session = StaffSession::global("mod");

    board.submit(&core, text_post("", "first post", 1))?;
    board.submit(&core, text_post("1", "a reply", 2))?;

    let delete = |posts: Vec<i64>| DeleteRequest {
        posts,
        password: "hunter2".to_string(),
        file_only: false,
        archive: false,
        admin: false,
        session: None,
    };

    // The reply goes first, then its whole thread.
    assert!(board.delete(&core, delete(vec![2]))?.errors.is_empty());
    assert!(board.delete(&core, delete(vec![1]))?.errors.is_empty());

    let outcome = board.restore_backups(&core, &[2], &session)?;
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(
        outcome.errors[0].error,
        Error::ParentThreadGone { post_num: 2 }
    ));

    // Restore the thread, and the reply has somewhere to go again.
    assert!(board.restore_backups(&core, &[1], &session)?.errors.is_empty());
    assert!(board.restore_backups(&core, &[2], &session)?.errors.is_empty());
    assert_eq!(core.db.thread_posts("tech", 1)?.len(), 2);

    Ok(())
}

#[test]
fn pagination_splits_and_prunes_pages() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    for i in 1..=25 {
        board.submit(&core, text_post("", &format!("thread {}", i), 1))?;
    }

    assert!(board.paths.page_path(0).exists());
    assert!(board.paths.page_path(1).exists());
    assert!(board.paths.page_path(2).exists());
    assert!(!board.paths.page_path(3).exists());

    // Newest threads lead page 0; the oldest five trail on page 2.
    let page0 = std::fs::read_to_string(board.paths.page_path(0))?;
    let page2 = std::fs::read_to_string(board.paths.page_path(2))?;
    assert!(page0.contains("\"num\":25"));
    assert!(!page0.contains("\"num\":1,"));
    assert!(page2.contains("\"num\":1,"));

    // Shrinking the board prunes the stale trailing page.
    let outcome = board.delete(
        &core,
        DeleteRequest {
            posts: (1..=6).collect(),
            password: "hunter2".to_string(),
            file_only: false,
            archive: false,
            admin: false,
            session: None,
        },
    )?;
    assert!(outcome.errors.is_empty());
    assert!(board.paths.page_path(1).exists());
    assert!(!board.paths.page_path(2).exists());

    Ok(())
}

#[test]
fn abbreviated_page_appears_for_long_threads() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |config, _| {
        config.posts_in_abbreviated_pages = 5;
    });
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "first post", 1))?;
    for i in 1..=10 {
        board.submit(&core, text_post("1", &format!("reply {}", i), 1))?;
    }

    assert!(board.paths.thread_path(1, true).exists());

    let mut req = text_post("1", "one more", 2);
    req.email = "noko".to_string();
    let out = board.submit(&core, req)?;
    assert_eq!(
        out.redirect,
        RedirectTarget::Thread {
            thread: 1,
            abbreviated: true
        }
    );

    Ok(())
}

#[test]
fn reports_capture_the_offender_and_deduplicate() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |config, _| {
        config.report_flood_window = Duration::from_secs(0);
    });
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "first post", 1))?;

    let outcome = board.report(
        &core,
        ReportRequest {
            posts: vec!["1".to_string()],
            comment: "rule violation".to_string(),
            ip: ip(9),
        },
    )?;
    assert!(outcome.errors.is_empty());

    let reports = board.reports(&core)?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].postnum, 1);
    // 127.0.0.1, decimal-encoded: the poster survives post deletion.
    assert_eq!(reports[0].offender, "2130706433");

    let outcome = board.report(
        &core,
        ReportRequest {
            posts: vec![
                "1".to_string(),
                "99".to_string(),
                "abc".to_string(),
            ],
            comment: "rule violation".to_string(),
            ip: ip(10),
        },
    )?;
    assert_eq!(outcome.errors.len(), 3);
    assert!(matches!(
        outcome.errors[0].error,
        Error::AlreadyReported { post_num: 1 }
    ));
    assert!(matches!(
        outcome.errors[1].error,
        Error::PostNotFound { .. }
    ));
    assert!(matches!(
        outcome.errors[2].error,
        Error::InvalidPostNumber { .. }
    ));

    let err = board
        .report(
            &core,
            ReportRequest {
                posts: (1..=11).map(|i| i.to_string()).collect(),
                comment: "rule violation".to_string(),
                ip: ip(11),
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::TooManyTargets { max: 10 }));

    // Once resolved, the report leaves the queue but still blocks a
    // duplicate filing.
    core.db.resolve_report(reports[0].num)?;
    assert!(board.reports(&core)?.is_empty());

    let outcome = board.report(
        &core,
        ReportRequest {
            posts: vec!["1".to_string()],
            comment: "rule violation".to_string(),
            ip: ip(12),
        },
    )?;
    assert!(matches!(
        outcome.errors[0].error,
        Error::AlreadyResolved { post_num: 1 }
    ));

    Ok(())
}

#[test]
fn wiping_the_board_resets_numbering_and_reports() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |config, _| {
        config.report_flood_window = Duration::from_secs(0);
    });
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "first post", 1))?;
    board.report(
        &core,
        ReportRequest {
            posts: vec!["1".to_string()],
            comment: "rule violation".to_string(),
            ip: ip(9),
        },
    )?;
    assert_eq!(board.reports(&core)?.len(), 1);

    board.delete(
        &core,
        DeleteRequest {
            posts: vec![1],
            password: "hunter2".to_string(),
            file_only: false,
            archive: false,
            admin: false,
            session: None,
        },
    )?;

    // Numbering starts over on the wiped board, and the stale reports go.
    let next = board.submit(&core, text_post("", "fresh start", 2))?;
    assert_eq!(next.num, 1);
    assert!(board.reports(&core)?.is_empty());

    Ok(())
}

#[test]
fn edits_stamp_provenance_and_keep_the_timestamp() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "first post", 1))?;
    let before = core.db.post("tech", 1)?;

    let mut wrong = text_post("", "hijack", 3);
    wrong.password = "guess".to_string();
    wrong.mode = SubmitMode::Edit { num: 1 };
    let err = board.submit(&core, wrong).unwrap_err();
    assert!(matches!(err, Error::WrongPassword { post_num: 1 }));

    let mut edit = text_post("", "revised post", 2);
    edit.mode = SubmitMode::Edit { num: 1 };
    let out = board.submit(&core, edit)?;
    assert_eq!(out.num, 1);

    let after = core.db.post("tech", 1)?;
    assert_eq!(after.comment, "revised post");
    assert_eq!(after.timestamp, before.timestamp);
    assert_eq!(after.date, before.date);
    assert_eq!(after.ip, before.ip);
    assert!(!after.lastedit.is_empty());
    assert_eq!(after.lastedit_ip, "2130706434");

    // A ninja edit leaves no stamp.
    let mut ninja = text_post("", "quietly revised", 2);
    ninja.mode = SubmitMode::Edit { num: 1 };
    ninja.ninja = true;
    board.submit(&core, ninja)?;
    assert!(core.db.post("tech", 1)?.lastedit.is_empty());

    Ok(())
}

#[test]
fn staff_posts_resist_user_deletion() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;
    let session = StaffSession::global("mod");

    let mut req = text_post("", "announcement", 1);
    req.admin = true;
    req.session = Some(session.clone());
    board.submit(&core, req)?;

    let outcome = board.delete(
        &core,
        DeleteRequest {
            posts: vec![1],
            password: "hunter2".to_string(),
            file_only: false,
            archive: false,
            admin: false,
            session: None,
        },
    )?;
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(
        outcome.errors[0].error,
        Error::StaffDeleteOnly { post_num: 1 }
    ));
    assert!(core.db.post("tech", 1).is_ok());

    let outcome = board.delete(
        &core,
        DeleteRequest {
            posts: vec![1],
            password: String::new(),
            file_only: false,
            archive: false,
            admin: true,
            session: Some(session),
        },
    )?;
    assert!(outcome.errors.is_empty());
    assert!(core.db.post("tech", 1).is_err());

    Ok(())
}

#[test]
fn privileged_parameters_need_staff() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    let mut req = text_post("", "locked from the start", 1);
    req.lock = true;
    let err = board.submit(&core, req).unwrap_err();
    assert!(matches!(err, Error::PrivilegedParameter));

    let mut req = text_post("", "admin without session", 1);
    req.admin = true;
    let err = board.submit(&core, req).unwrap_err();
    assert!(matches!(err, Error::StaffSessionRequired));

    Ok(())
}

#[test]
fn old_threads_are_trimmed_after_posting() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, options| {
        options.max_age = Some(Duration::from_secs(3600));
    });
    let board = core.board("tech")?;

    board.submit(&core, text_post("", "ancient thread", 1))?;
    assert!(board.paths.thread_path(1, false).exists());

    backdate_all(tmp.path(), 2 * 3600 * 1000);

    board.submit(&core, text_post("", "fresh thread", 2))?;

    assert!(core.db.thread_posts("tech", 1).is_err());
    assert!(core.db.thread_posts("tech", 2).is_ok());
    assert!(!board.paths.thread_path(1, false).exists());

    Ok(())
}

#[test]
fn unusual_fields_are_rejected() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    let mut req = text_post("", "fine comment", 1);
    req.name = "line\nbreak".to_string();
    assert!(matches!(
        board.submit(&core, req).unwrap_err(),
        Error::UnusualCharacters
    ));

    let req = text_post("12345678901", "fine comment", 1);
    assert!(matches!(
        board.submit(&core, req).unwrap_err(),
        Error::UnusualCharacters
    ));

    let req = text_post("12a", "fine comment", 1);
    assert!(matches!(
        board.submit(&core, req).unwrap_err(),
        Error::UnusualCharacters
    ));

    let mut req = text_post("", "x", 1);
    req.subject = "s".repeat(200);
    assert!(matches!(
        board.submit(&core, req).unwrap_err(),
        Error::FieldTooLong
    ));

    let mut req = text_post("", "", 1);
    req.no_file = true;
    assert!(matches!(
        board.submit(&core, req).unwrap_err(),
        Error::EmptyPost
    ));

    Ok(())
}

#[test]
fn replying_to_a_missing_thread_fails() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    let err = board
        .submit(&core, text_post("7", "shouting into the void", 1))
        .unwrap_err();
    assert!(matches!(err, Error::ThreadNotFound { thread_num: 7, .. }));

    Ok(())
}

#[test]
fn unknown_board_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let core = make_core(tmp.path(), |_, _| {});

    assert!(matches!(
        core.board("random").unwrap_err(),
        Error::BoardNotFound { .. }
    ));
}

#[test]
fn admin_archive_moves_page_and_media() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;
    let session = StaffSession::global("mod");

    board.submit(
        &core,
        image_post(
            "",
            "archived thread",
            1,
            png_upload(tmp.path(), "a.png", 1),
        ),
    )?;
    let stored = core.db.post("tech", 1)?.image.clone();

    let outcome = board.delete(
        &core,
        DeleteRequest {
            posts: vec![1],
            password: String::new(),
            file_only: false,
            archive: true,
            admin: true,
            session: Some(session),
        },
    )?;
    assert!(outcome.errors.is_empty());

    assert!(core.db.post("tech", 1).is_err());
    assert!(!board.paths.thread_path(1, false).exists());
    assert!(board.paths.archived_thread_path(1).exists());
    assert!(!board.paths.live_path(&stored).exists());
    assert!(board.paths.archive_path(&stored).exists());

    Ok(())
}

#[test]
fn rss_feed_is_generated() -> Result<()> {
    let tmp = TempDir::new()?;
    let core = make_core(tmp.path(), |_, _| {});
    let board = core.board("tech")?;

    board.submit(
        &core,
        image_post("", "with a file", 1, png_upload(tmp.path(), "a.png", 1)),
    )?;

    let rss = std::fs::read_to_string(board.paths.rss_path())?;
    assert!(rss.starts_with("rss\n"));
    assert!(rss.contains("image/png"));

    Ok(())
}
