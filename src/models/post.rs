//! The post store: rows, inserts, and the query surface of the board core.

use std::collections::HashMap;

use diesel::{delete, insert_into, prelude::*, update};

use serde::Serialize;

use crate::config::DuplicateScope;
use crate::models::{Database, PostId};
use crate::schema::post;
use crate::{Error, Result};

/// A user-made post.
///
/// A post with `parent == 0` starts a thread; its replies carry the
/// thread's number in `parent`. Every row of a thread shares the same
/// `lasthit` value.
#[derive(Debug, Clone, Queryable, Serialize)]
pub struct Post {
    /// The board the post was made on.
    pub board: String,
    /// The post number. Assigned per board, never reused while any row of
    /// the board remains.
    pub num: PostId,
    /// The thread this post replies to, or 0 for a thread root.
    pub parent: PostId,
    /// When the post was created, in epoch milliseconds.
    pub timestamp: i64,
    /// When the thread was last bumped, in epoch milliseconds.
    pub lasthit: i64,
    /// The poster's address, numerically encoded.
    pub ip: String,
    /// The creation date as a display string.
    pub date: String,
    /// The name of the author.
    pub name: String,
    /// The author's derived tripcode, if any.
    pub trip: String,
    /// Contact field, normalized into a link form.
    pub email: String,
    /// The subject of the post.
    pub subject: String,
    /// The deletion password, stored in plaintext and compared verbatim.
    #[serde(skip_serializing)]
    pub password: String,
    /// The comment, as pre-formatted markup.
    pub comment: String,
    /// Path of the stored image, relative to the board root. Empty if the
    /// post has no file.
    pub image: String,
    /// Size of the stored image in bytes.
    pub size: i64,
    /// Checksum of the stored image.
    pub md5: String,
    /// Width of the image in pixels.
    pub width: i32,
    /// Height of the image in pixels.
    pub height: i32,
    /// Path of the thumbnail, relative to the board root.
    pub thumbnail: String,
    /// Thumbnail width in pixels.
    pub tn_width: i32,
    /// Thumbnail height in pixels.
    pub tn_height: i32,
    /// Date of the last edit as a display string, if any.
    pub lastedit: String,
    /// Address of the last editor, numerically encoded.
    pub lastedit_ip: String,
    /// Whether staff created or took over this post.
    pub admin_post: bool,
    /// Nonzero when the thread is pinned to the top of the board.
    pub stickied: i32,
    /// Whether the thread accepts replies.
    pub locked: bool,
    /// Whether the post is soft-deleted into the backup area.
    pub backup: bool,
    /// When `backup` was set, in epoch milliseconds. Replies archived with
    /// their thread share the root's value, which groups them for restore.
    pub timestampofarchival: i64,
}

impl Post {
    /// Whether this post starts a thread.
    pub fn is_thread(&self) -> bool {
        self.parent == 0
    }

    /// The number of the thread this post belongs to.
    pub fn thread_num(&self) -> PostId {
        if self.parent == 0 {
            self.num
        } else {
            self.parent
        }
    }
}

/// A new post to be inserted in the database.
///
/// `num` is assigned by [`Database::insert_post`].
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = post)]
pub struct NewPost {
    pub board: String,
    pub num: PostId,
    pub parent: PostId,
    pub timestamp: i64,
    pub lasthit: i64,
    pub ip: String,
    pub date: String,
    pub name: String,
    pub trip: String,
    pub email: String,
    pub subject: String,
    pub password: String,
    pub comment: String,
    pub image: String,
    pub size: i64,
    pub md5: String,
    pub width: i32,
    pub height: i32,
    pub thumbnail: String,
    pub tn_width: i32,
    pub tn_height: i32,
    pub lastedit: String,
    pub lastedit_ip: String,
    pub admin_post: bool,
    pub stickied: i32,
    pub locked: bool,
    pub backup: bool,
    pub timestampofarchival: i64,
}

/// Convenience function to convert from diesel's error type into our error
/// type, when we're querying for a post.
fn conv_post_error<S>(
    board_name: S,
    post_num: PostId,
) -> impl FnOnce(diesel::result::Error) -> Error
where
    S: Into<String>,
{
    move |e: diesel::result::Error| match e {
        diesel::result::Error::NotFound => Error::PostNotFound {
            board_name: board_name.into(),
            post_num,
        },
        _ => Error::from(e),
    }
}

/// As `conv_post_error`, when the post was expected to be a thread root.
fn conv_thread_error<S>(
    board_name: S,
    thread_num: PostId,
) -> impl FnOnce(diesel::result::Error) -> Error
where
    S: Into<String>,
{
    move |e: diesel::result::Error| match e {
        diesel::result::Error::NotFound => Error::ThreadNotFound {
            board_name: board_name.into(),
            thread_num,
        },
        _ => Error::from(e),
    }
}

impl Database {
    /// Get a live post.
    pub fn post<S>(&self, board_name: S, post_num: PostId) -> Result<Post>
    where
        S: Into<String>,
    {
        use crate::schema::post::columns::{backup, board, num};
        use crate::schema::post::dsl::post;

        let board_name = board_name.into();

        post.filter(board.eq(&board_name))
            .filter(num.eq(post_num))
            .filter(backup.eq(false))
            .limit(1)
            .first(&mut self.conn()?)
            .map_err(conv_post_error(board_name, post_num))
    }

    /// Get a live thread root.
    pub fn thread_root<S>(
        &self,
        board_name: S,
        thread_num: PostId,
    ) -> Result<Post>
    where
        S: Into<String>,
    {
        use crate::schema::post::columns::{backup, board, num, parent};
        use crate::schema::post::dsl::post;

        let board_name = board_name.into();

        post.filter(board.eq(&board_name))
            .filter(num.eq(thread_num))
            .filter(parent.eq(0))
            .filter(backup.eq(false))
            .limit(1)
            .first(&mut self.conn()?)
            .map_err(conv_thread_error(board_name, thread_num))
    }

    /// Get all of the live posts in a thread, the root first.
    pub fn thread_posts<S>(
        &self,
        board_name: S,
        thread_num: PostId,
    ) -> Result<Vec<Post>>
    where
        S: Into<String>,
    {
        use crate::schema::post::columns::{backup, board, num, parent};
        use crate::schema::post::dsl::post;

        let board_name = board_name.into();

        let posts: Vec<Post> = post
            .filter(board.eq(&board_name))
            .filter(num.eq(thread_num).or(parent.eq(thread_num)))
            .filter(backup.eq(false))
            .order(num.asc())
            .load(&mut self.conn()?)?;

        match posts.first() {
            Some(first) if first.is_thread() => Ok(posts),
            _ => Err(Error::ThreadNotFound {
                board_name,
                thread_num,
            }),
        }
    }

    /// Get every live thread of a board as `[root, replies...]` groups.
    ///
    /// Threads are in index order: stickied first, then by most recent
    /// bump, ties broken by the root's post number. Replies are in post
    /// order within each group.
    pub fn threads<S>(&self, board_name: S) -> Result<Vec<Vec<Post>>>
    where
        S: AsRef<str>,
    {
        use crate::schema::post::columns::{
            backup, board, lasthit, num, parent, stickied,
        };
        use crate::schema::post::dsl::post;

        let mut conn = self.conn()?;

        let roots: Vec<Post> = post
            .filter(board.eq(board_name.as_ref()))
            .filter(parent.eq(0))
            .filter(backup.eq(false))
            .order((stickied.desc(), lasthit.desc(), num.asc()))
            .load(&mut conn)?;

        let root_nums: Vec<PostId> = roots.iter().map(|p| p.num).collect();

        let replies: Vec<Post> = post
            .filter(board.eq(board_name.as_ref()))
            .filter(parent.eq_any(&root_nums))
            .filter(backup.eq(false))
            .order(num.asc())
            .load(&mut conn)?;

        let mut by_thread: HashMap<PostId, Vec<Post>> = HashMap::new();
        for reply in replies {
            by_thread.entry(reply.parent).or_default().push(reply);
        }

        Ok(roots
            .into_iter()
            .map(|root| {
                let root_num = root.num;
                let mut thread = vec![root];
                if let Some(mut rest) = by_thread.remove(&root_num) {
                    thread.append(&mut rest);
                }
                thread
            })
            .collect())
    }

    /// Get all of the live posts of a board in post order.
    pub fn live_posts<S>(&self, board_name: S) -> Result<Vec<Post>>
    where
        S: AsRef<str>,
    {
        use crate::schema::post::columns::{backup, board, num};
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name.as_ref()))
            .filter(backup.eq(false))
            .order(num.asc())
            .load(&mut self.conn()?)?)
    }

    /// Get the number of live posts on a board.
    pub fn live_post_count<S>(&self, board_name: S) -> Result<i64>
    where
        S: AsRef<str>,
    {
        use crate::schema::post::columns::{backup, board};
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name.as_ref()))
            .filter(backup.eq(false))
            .count()
            .first(&mut self.conn()?)?)
    }

    /// Get up to `limit` recent live posts of a board, newest first.
    pub fn recent_posts<S>(
        &self,
        board_name: S,
        limit: usize,
    ) -> Result<Vec<Post>>
    where
        S: AsRef<str>,
    {
        use crate::schema::post::columns::{backup, board, num};
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name.as_ref()))
            .filter(backup.eq(false))
            .order(num.desc())
            .limit(limit as i64)
            .load(&mut self.conn()?)?)
    }

    /// Insert a new post, assigning its number.
    ///
    /// The number is `max(num) + 1` over every row of the board, live or
    /// backed up, inside the insert transaction. It drops back to 1 only
    /// when the board has been wiped completely.
    pub fn insert_post(&self, mut new_post: NewPost) -> Result<PostId> {
        use crate::schema::post::columns::{board, num};
        use crate::schema::post::dsl::post;

        let mut conn = self.conn()?;

        conn.transaction::<_, Error, _>(|conn| {
            let last: Option<PostId> = post
                .filter(board.eq(&new_post.board))
                .select(diesel::dsl::max(num))
                .first(conn)?;

            new_post.num = last.unwrap_or(0) + 1;

            insert_into(post).values(&new_post).execute(conn)?;

            Ok(new_post.num)
        })
    }

    /// Overwrite a live post's fields.
    pub fn update_post(
        &self,
        board_name: &str,
        post_num: PostId,
        new_post: &NewPost,
    ) -> Result<()> {
        use crate::schema::post::columns::{backup, board, num};
        use crate::schema::post::dsl::post;

        update(
            post.filter(board.eq(board_name))
                .filter(num.eq(post_num))
                .filter(backup.eq(false)),
        )
        .set(new_post)
        .execute(&mut self.conn()?)
        .map_err(conv_post_error(board_name, post_num))?;

        Ok(())
    }

    /// Update `lasthit` across a whole thread.
    pub fn bump_thread(
        &self,
        board_name: &str,
        thread_num: PostId,
        new_lasthit: i64,
    ) -> Result<()> {
        use crate::schema::post::columns::{
            backup, board, lasthit, num, parent,
        };
        use crate::schema::post::dsl::post;

        update(
            post.filter(board.eq(board_name))
                .filter(num.eq(thread_num).or(parent.eq(thread_num)))
                .filter(backup.eq(false)),
        )
        .set(lasthit.eq(new_lasthit))
        .execute(&mut self.conn()?)
        .map_err(conv_thread_error(board_name, thread_num))?;

        Ok(())
    }

    /// Propagate sticky or lock flags across a whole thread.
    ///
    /// Each given flag is applied to the root and every reply in a single
    /// statement.
    pub fn set_thread_state(
        &self,
        board_name: &str,
        thread_num: PostId,
        sticky: Option<i32>,
        lock: Option<bool>,
    ) -> Result<()> {
        use crate::schema::post::columns::{
            board, locked, num, parent, stickied,
        };
        use crate::schema::post::dsl::post;

        let mut conn = self.conn()?;

        if let Some(value) = sticky {
            update(
                post.filter(board.eq(board_name))
                    .filter(num.eq(thread_num).or(parent.eq(thread_num))),
            )
            .set(stickied.eq(value))
            .execute(&mut conn)?;
        }

        if let Some(value) = lock {
            update(
                post.filter(board.eq(board_name))
                    .filter(num.eq(thread_num).or(parent.eq(thread_num))),
            )
            .set(locked.eq(value))
            .execute(&mut conn)?;
        }

        Ok(())
    }

    /// Remove the image fields of a post, leaving the post in place.
    pub fn strip_image(
        &self,
        board_name: &str,
        post_num: PostId,
    ) -> Result<()> {
        use crate::schema::post::columns::{
            board, height, image, md5, num, size, thumbnail, tn_height,
            tn_width, width,
        };
        use crate::schema::post::dsl::post;

        update(post.filter(board.eq(board_name)).filter(num.eq(post_num)))
            .set((
                image.eq(""),
                thumbnail.eq(""),
                md5.eq(""),
                size.eq(0),
                width.eq(0),
                height.eq(0),
                tn_width.eq(0),
                tn_height.eq(0),
            ))
            .execute(&mut self.conn()?)
            .map_err(conv_post_error(board_name, post_num))?;

        Ok(())
    }

    /// Get the media paths of a post and, if it is a root, its replies.
    pub fn thread_media(
        &self,
        board_name: &str,
        target: PostId,
    ) -> Result<Vec<(String, String)>> {
        use crate::schema::post::columns::{
            backup, board, image, num, parent, thumbnail,
        };
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name))
            .filter(num.eq(target).or(parent.eq(target)))
            .filter(backup.eq(false))
            .filter(image.ne(""))
            .select((image, thumbnail))
            .load(&mut self.conn()?)?)
    }

    /// Soft-delete a post and, if it is a root, its replies.
    ///
    /// All affected rows get the same archival timestamp, which ties the
    /// group together for restore.
    pub fn soft_delete(
        &self,
        board_name: &str,
        target: PostId,
        archival_ts: i64,
    ) -> Result<()> {
        use crate::schema::post::columns::{
            backup, board, num, parent, timestampofarchival,
        };
        use crate::schema::post::dsl::post;

        update(
            post.filter(board.eq(board_name))
                .filter(num.eq(target).or(parent.eq(target)))
                .filter(backup.eq(false)),
        )
        .set((backup.eq(true), timestampofarchival.eq(archival_ts)))
        .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Remove a post and, if it is a root, its replies.
    pub fn hard_delete(&self, board_name: &str, target: PostId) -> Result<()> {
        use crate::schema::post::columns::{board, num, parent};
        use crate::schema::post::dsl::post;

        delete(
            post.filter(board.eq(board_name))
                .filter(num.eq(target).or(parent.eq(target))),
        )
        .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Get a backed-up post by number.
    pub fn backup_post(
        &self,
        board_name: &str,
        post_num: PostId,
    ) -> Result<Post> {
        use crate::schema::post::columns::{backup, board, num};
        use crate::schema::post::dsl::post;

        post.filter(board.eq(board_name))
            .filter(num.eq(post_num))
            .filter(backup.eq(true))
            .limit(1)
            .first(&mut self.conn()?)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => Error::BackupNotFound {
                    board_name: board_name.to_string(),
                    post_num,
                },
                _ => Error::from(e),
            })
    }

    /// Get the backup group of a thread: the root plus every reply that
    /// was archived with it.
    pub fn backup_group(
        &self,
        board_name: &str,
        thread_num: PostId,
        archival_ts: i64,
    ) -> Result<Vec<Post>> {
        use crate::schema::post::columns::{
            backup, board, num, parent, timestampofarchival,
        };
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name))
            .filter(num.eq(thread_num).or(
                parent.eq(thread_num).and(timestampofarchival.eq(archival_ts)),
            ))
            .filter(backup.eq(true))
            .order(num.asc())
            .load(&mut self.conn()?)?)
    }

    /// Flip a whole backup group live again, in one statement.
    pub fn restore_group(
        &self,
        board_name: &str,
        thread_num: PostId,
        archival_ts: i64,
    ) -> Result<()> {
        use crate::schema::post::columns::{
            backup, board, num, parent, timestampofarchival,
        };
        use crate::schema::post::dsl::post;

        update(
            post.filter(board.eq(board_name))
                .filter(num.eq(thread_num).or(
                    parent
                        .eq(thread_num)
                        .and(timestampofarchival.eq(archival_ts)),
                ))
                .filter(backup.eq(true)),
        )
        .set(backup.eq(false))
        .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Flip a single backed-up post live again.
    pub fn restore_post(
        &self,
        board_name: &str,
        post_num: PostId,
    ) -> Result<()> {
        use crate::schema::post::columns::{backup, board, num};
        use crate::schema::post::dsl::post;

        update(
            post.filter(board.eq(board_name))
                .filter(num.eq(post_num))
                .filter(backup.eq(true)),
        )
        .set(backup.eq(false))
        .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Get the backed-up posts whose archival timestamp is at or before
    /// the cutoff.
    pub fn expired_backups(
        &self,
        board_name: &str,
        cutoff: i64,
    ) -> Result<Vec<Post>> {
        use crate::schema::post::columns::{
            backup, board, timestampofarchival,
        };
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name))
            .filter(backup.eq(true))
            .filter(timestampofarchival.le(cutoff))
            .load(&mut self.conn()?)?)
    }

    /// Delete backed-up rows whose archival timestamp is at or before the
    /// cutoff.
    pub fn delete_backups_before(
        &self,
        board_name: &str,
        cutoff: i64,
    ) -> Result<()> {
        use crate::schema::post::columns::{
            backup, board, timestampofarchival,
        };
        use crate::schema::post::dsl::post;

        delete(
            post.filter(board.eq(board_name))
                .filter(backup.eq(true))
                .filter(timestampofarchival.le(cutoff)),
        )
        .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Delete the backup rows of a post and, for a root, its replies.
    pub fn purge_backup_rows(
        &self,
        board_name: &str,
        target: PostId,
    ) -> Result<()> {
        use crate::schema::post::columns::{backup, board, num, parent};
        use crate::schema::post::dsl::post;

        delete(
            post.filter(board.eq(board_name))
                .filter(num.eq(target).or(parent.eq(target)))
                .filter(backup.eq(true)),
        )
        .execute(&mut self.conn()?)?;

        Ok(())
    }

    /// Get the non-stickied live thread roots created at or before the
    /// cutoff.
    pub fn stale_thread_roots(
        &self,
        board_name: &str,
        cutoff: i64,
    ) -> Result<Vec<Post>> {
        use crate::schema::post::columns::{
            backup, board, num, parent, stickied, timestamp,
        };
        use crate::schema::post::dsl::post;

        Ok(post
            .filter(board.eq(board_name))
            .filter(parent.eq(0))
            .filter(backup.eq(false))
            .filter(stickied.eq(0))
            .filter(timestamp.le(cutoff))
            .order(num.asc())
            .load(&mut self.conn()?)?)
    }

    /// Find a live post carrying the given checksum, within the configured
    /// duplicate-detection scope.
    ///
    /// Thread scope searches the target thread; a fresh thread root has no
    /// thread yet and can never conflict. Board scope searches all live
    /// posts of the board.
    pub fn find_duplicate(
        &self,
        board_name: &str,
        digest: &str,
        scope: DuplicateScope,
        thread_num: PostId,
    ) -> Result<Option<Post>> {
        use crate::schema::post::columns::{backup, board, md5, num, parent};
        use crate::schema::post::dsl::post;

        let query = post
            .filter(board.eq(board_name))
            .filter(md5.eq(digest))
            .filter(backup.eq(false))
            .limit(1);

        let found = match scope {
            DuplicateScope::Off => None,
            DuplicateScope::Thread => {
                if thread_num == 0 {
                    None
                } else {
                    query
                        .filter(
                            num.eq(thread_num).or(parent.eq(thread_num)),
                        )
                        .first(&mut self.conn()?)
                        .optional()?
                }
            }
            DuplicateScope::Board => {
                query.first(&mut self.conn()?).optional()?
            }
        };

        Ok(found)
    }
}
