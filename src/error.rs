//! Error types.

use derive_more::{Display, From};

use crate::models::PostId;

/// Our error type.
#[derive(Debug, Display, From)]
pub enum Error {
    #[display(fmt = "Board '{}' not found", board_name)]
    BoardNotFound { board_name: String },
    #[display(fmt = "Thread #{} on board '{}' not found", thread_num, board_name)]
    ThreadNotFound {
        board_name: String,
        thread_num: PostId,
    },
    #[display(fmt = "Post #{} on board '{}' not found", post_num, board_name)]
    PostNotFound {
        board_name: String,
        post_num: PostId,
    },
    #[display(fmt = "No backup record for post #{} on board '{}'", post_num, board_name)]
    BackupNotFound {
        board_name: String,
        post_num: PostId,
    },
    #[display(fmt = "Cannot restore post #{}: parent thread deleted", post_num)]
    ParentThreadGone { post_num: PostId },
    #[display(fmt = "Post #{} is not a thread", post_num)]
    NotAThread { post_num: PostId },
    #[display(fmt = "A staff session is required for this operation")]
    StaffSessionRequired,
    #[display(fmt = "Access to board '{}' denied for '{}'", board_name, user_name)]
    BoardAccessDenied {
        board_name: String,
        user_name: String,
    },
    #[display(fmt = "Parameter requires staff privileges")]
    PrivilegedParameter,
    #[display(fmt = "Post #{} can only be deleted by staff", post_num)]
    StaffDeleteOnly { post_num: PostId },
    // Deletion passwords are stored in plaintext and compared verbatim.
    #[display(fmt = "Wrong password for post #{}", post_num)]
    WrongPassword { post_num: PostId },
    #[display(fmt = "Cannot add a post to a locked thread")]
    ThreadLocked,
    #[display(fmt = "Unusual characters in post fields")]
    UnusualCharacters,
    #[display(fmt = "Post field exceeds the maximum length")]
    FieldTooLong,
    #[display(fmt = "No file chosen, and posting without one was not requested")]
    NoFileChosen,
    #[display(fmt = "The post contains neither text nor a file")]
    EmptyPost,
    #[display(fmt = "This kind of post is not allowed on this board")]
    PostingNotAllowed,
    #[display(fmt = "The uploaded file is empty")]
    UploadEmpty,
    #[display(fmt = "The uploaded file is over the limit of {} KB", limit_kb)]
    UploadTooBig { limit_kb: u64 },
    #[display(fmt = "Flood detected: posting too fast")]
    PostFlood,
    #[display(fmt = "Flood detected: uploading files too fast")]
    ImageFlood,
    #[display(fmt = "Flood detected: repeated comment")]
    RepeatedComment,
    #[display(fmt = "Flood detected: reporting too fast")]
    ReportFlood,
    #[display(fmt = "Duplicate file found at {}", location)]
    DuplicateImage { location: String },
    #[display(fmt = "A file named '{}' already exists", name)]
    DuplicateFileName { name: String },
    #[display(fmt = "Unsupported file format '{}'", ext)]
    UnsupportedFormat { ext: String },
    #[display(fmt = "Image dimensions {}x{} exceed the allowed maximum", width, height)]
    ImageTooBig { width: u32, height: u32 },
    #[display(fmt = "File rejected: content does not match a media format")]
    PotentialExploit,
    #[display(fmt = "Too many posts selected; the maximum is {}", max)]
    TooManyTargets { max: usize },
    #[display(fmt = "Report comment is too short")]
    ReportTooShort,
    #[display(fmt = "Report comment is over the maximum of {} characters", max)]
    ReportTooLong { max: usize },
    #[display(fmt = "Post #{} was already reported", post_num)]
    AlreadyReported { post_num: PostId },
    #[display(fmt = "The report for post #{} was already resolved", post_num)]
    AlreadyResolved { post_num: PostId },
    #[display(fmt = "'{}' is not a valid post number", input)]
    InvalidPostNumber { input: String },
    #[display(fmt = "'{}' is not a valid IP value", input)]
    InvalidIpValue { input: String },
    #[display(fmt = "Path for {} at {} does not exist", name, path)]
    ConfigPathNotFound { name: String, path: String },
    #[display(fmt = "Database migration error: {}", message)]
    Migration { message: String },
    #[display(fmt = "Couldn't create regex: {}", _0)]
    #[from]
    RegexError(regex::Error),
    #[display(fmt = "Error processing image: {}", _0)]
    #[from]
    ImageError(image::error::ImageError),
    #[display(fmt = "Couldn't render HTML template: {}", _0)]
    #[from]
    RenderError(handlebars::RenderError),
    #[display(fmt = "HTML template file error: {}", _0)]
    #[from]
    TemplateError(handlebars::TemplateError),
    #[display(fmt = "JSON error: {}", _0)]
    #[from]
    JsonError(serde_json::Error),
    #[display(fmt = "YAML error: {}", _0)]
    #[from]
    YamlError(serde_yaml::Error),
    #[display(fmt = "Database connection pool error: {}", _0)]
    #[from]
    R2d2Error(r2d2::Error),
    #[display(fmt = "Database error: {}", _0)]
    #[from]
    DatabaseError(diesel::result::Error),
    #[display(fmt = "Couldn't connect to the database: {}", _0)]
    #[from]
    ConnectionError(diesel::ConnectionError),
    #[display(fmt = "I/O error: {}", _0)]
    #[from]
    IoError(std::io::Error),
    #[display(fmt = "I/O error: {}: {}", msg, cause)]
    IoErrorMsg { cause: std::io::Error, msg: String },
}

impl Error {
    pub fn from_io_error<S>(cause: std::io::Error, msg: S) -> Error
    where
        S: Into<String>,
    {
        Error::IoErrorMsg {
            cause,
            msg: msg.into(),
        }
    }

    /// Whether this error is one a moderation batch records and moves past,
    /// rather than aborting the whole call.
    pub fn is_per_target(&self) -> bool {
        matches!(
            self,
            Error::PostNotFound { .. }
                | Error::BackupNotFound { .. }
                | Error::ParentThreadGone { .. }
                | Error::StaffDeleteOnly { .. }
                | Error::WrongPassword { .. }
                | Error::AlreadyReported { .. }
                | Error::AlreadyResolved { .. }
                | Error::InvalidPostNumber { .. }
        )
    }
}

impl std::error::Error for Error {}

/// Our result type.
pub type Result<T> = std::result::Result<T, Error>;
