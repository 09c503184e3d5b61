//! The report queue.

use diesel::{delete, insert_into, prelude::*, update};

use serde::Serialize;

use crate::models::{Database, PostId, ReportId};
use crate::schema::report;
use crate::Result;

/// A report that a user made about a post.
#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Report {
    /// The report number.
    pub num: ReportId,
    /// The board the reported post was made on.
    pub board: String,
    /// The reporter's address, numerically encoded.
    pub reporter: String,
    /// The reported poster's address, captured at report time so it
    /// survives deletion of the post.
    pub offender: String,
    /// The number of the reported post.
    pub postnum: PostId,
    /// The reason for the report.
    pub comment: String,
    /// When the report was made, in epoch milliseconds.
    pub timestamp: i64,
    /// The report date as a display string.
    pub date: String,
    /// Whether moderation has resolved the report.
    pub resolved: bool,
}

/// A new report to be inserted in the database.
#[derive(Debug, Insertable)]
#[diesel(table_name = report)]
pub struct NewReport {
    pub board: String,
    pub reporter: String,
    pub offender: String,
    pub postnum: PostId,
    pub comment: String,
    pub timestamp: i64,
    pub date: String,
    pub resolved: bool,
}

impl Database {
    /// Insert a new post report.
    pub fn insert_report(&self, new_report: NewReport) -> Result<()> {
        use crate::schema::report::dsl::report;

        insert_into(report)
            .values(&new_report)
            .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Get the report filed against a post, if any.
    pub fn report_for_post(
        &self,
        board_name: &str,
        post_num: PostId,
    ) -> Result<Option<Report>> {
        use crate::schema::report::columns::{board, postnum};
        use crate::schema::report::dsl::report;

        Ok(report
            .filter(board.eq(board_name))
            .filter(postnum.eq(post_num))
            .limit(1)
            .first(&mut self.conn()?)
            .optional()?)
    }

    /// Get the unresolved reports of a board, oldest first.
    pub fn unresolved_reports(&self, board_name: &str) -> Result<Vec<Report>> {
        use crate::schema::report::columns::{board, num, resolved};
        use crate::schema::report::dsl::report;

        Ok(report
            .filter(board.eq(board_name))
            .filter(resolved.eq(false))
            .order(num.asc())
            .load(&mut self.conn()?)?)
    }

    /// Mark a report resolved.
    pub fn resolve_report(&self, report_num: ReportId) -> Result<()> {
        use crate::schema::report::columns::{num, resolved};
        use crate::schema::report::dsl::report;

        update(report.filter(num.eq(report_num)))
            .set(resolved.eq(true))
            .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Delete every report of a board. Runs when the board's post
    /// numbering resets, which signals a wiped board.
    pub fn clear_reports(&self, board_name: &str) -> Result<()> {
        use crate::schema::report::columns::board;
        use crate::schema::report::dsl::report;

        delete(report.filter(board.eq(board_name)))
            .execute(&mut self.conn()?)?;

        Ok(())
    }
}
