//! Flood detection: trailing-window count queries over posts and reports.

use std::time::Duration;

use diesel::prelude::*;

use crate::config::{BoardOptions, Config};
use crate::models::{Database, Post};
use crate::{Error, Result};

impl Database {
    /// Count a board's posts from an address after the given instant.
    pub fn post_count_since(
        &self,
        board_name: &str,
        poster_ip: &str,
        since: i64,
    ) -> Result<i64> {
        use crate::schema::post::columns::{board, ip, timestamp};
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name))
            .filter(ip.eq(poster_ip))
            .filter(timestamp.gt(since))
            .count()
            .first(&mut self.conn()?)?)
    }

    /// Count a board's posts from an address carrying an identical comment
    /// after the given instant.
    pub fn repeat_count_since(
        &self,
        board_name: &str,
        poster_ip: &str,
        body: &str,
        since: i64,
    ) -> Result<i64> {
        use crate::schema::post::columns::{board, comment, ip, timestamp};
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name))
            .filter(ip.eq(poster_ip))
            .filter(comment.eq(body))
            .filter(timestamp.gt(since))
            .count()
            .first(&mut self.conn()?)?)
    }

    /// Count reports filed from an address after the given instant, across
    /// all boards.
    pub fn report_count_since(
        &self,
        reporter_ip: &str,
        since: i64,
    ) -> Result<i64> {
        use crate::schema::report::columns::{reporter, timestamp};
        use crate::schema::report::dsl::report;

        Ok(report
            .filter(reporter.eq(reporter_ip))
            .filter(timestamp.gt(since))
            .count()
            .first(&mut self.conn()?)?)
    }

    /// Count the replies of a thread that weigh against the bump limit.
    ///
    /// Replies from the thread author within the no-sage window of the
    /// thread's creation are not counted.
    pub fn reply_count_for_bump(
        &self,
        root: &Post,
        nosage_window: Duration,
    ) -> Result<i64> {
        use crate::schema::post::columns::{
            backup, board, ip, parent, timestamp,
        };
        use crate::schema::post::dsl::post;

        let window_end = root.timestamp + nosage_window.as_millis() as i64;

        Ok(post
            .filter(board.eq(&root.board))
            .filter(parent.eq(root.num))
            .filter(backup.eq(false))
            .filter(
                diesel::dsl::not(
                    timestamp.lt(window_end).and(ip.eq(&root.ip)),
                ),
            )
            .count()
            .first(&mut self.conn()?)?)
    }
}

/// Reject a posting that falls inside one of the board's flood windows.
///
/// The window differs for plain posts and posts carrying a file, and new
/// text posts are additionally checked against the repeated-comment
/// window. Any nonzero count inside the active window is a flood.
pub fn check_post(
    db: &Database,
    board_name: &str,
    options: &BoardOptions,
    poster_ip: &str,
    now: i64,
    body: &str,
    has_file: bool,
) -> Result<()> {
    let (window, err) = if has_file {
        (options.image_flood_window, Error::ImageFlood)
    } else {
        (options.post_flood_window, Error::PostFlood)
    };

    let since = now - window.as_millis() as i64;
    if db.post_count_since(board_name, poster_ip, since)? != 0 {
        return Err(err);
    }

    if !has_file {
        let since = now - options.repeat_flood_window.as_millis() as i64;
        if db.repeat_count_since(board_name, poster_ip, body, since)? != 0 {
            return Err(Error::RepeatedComment);
        }
    }

    Ok(())
}

/// Reject a report that falls inside the site-wide report flood window.
pub fn check_report(
    db: &Database,
    config: &Config,
    reporter_ip: &str,
    now: i64,
) -> Result<()> {
    let since = now - config.report_flood_window.as_millis() as i64;

    if db.report_count_since(reporter_ip, since)? != 0 {
        return Err(Error::ReportFlood);
    }

    Ok(())
}
