//! Site and board configuration.

use std::collections::HashMap;
use std::fs::File;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// How duplicate file detection is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateScope {
    /// No duplicate detection.
    Off,
    /// Reject a checksum already present in the target thread.
    Thread,
    /// Reject a checksum already present anywhere on the board.
    Board,
}

/// Display styles for post dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateStyle {
    /// `24/02/29(Thu)13:37`
    Futaba,
    /// `2024-02-29 13:37`
    Iso,
    /// RFC 2822, for feeds.
    Http,
}

fn de_duration<'de, D>(de: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(de)?;
    parse_duration::parse(&s).map_err(de::Error::custom)
}

fn se_duration<S>(d: &Duration, se: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    format!("{}s", d.as_secs()).serialize(se)
}

fn de_opt_duration<'de, D>(
    de: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(de)? {
        Some(s) => parse_duration::parse(&s)
            .map(Some)
            .map_err(de::Error::custom),
        None => Ok(None),
    }
}

fn se_opt_duration<S>(
    d: &Option<Duration>,
    se: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    d.map(|d| format!("{}s", d.as_secs())).serialize(se)
}

/// Options for a single board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoardOptions {
    /// How many threads are rendered per index page.
    pub threads_per_page: usize,
    /// How many replies an index page shows per thread.
    pub replies_per_thread: usize,
    /// How many image replies an index page shows per thread. Zero means
    /// no separate image cap.
    pub image_replies_per_thread: usize,
    /// The display line budget before a comment is abbreviated. Zero
    /// disables abbreviation.
    pub max_lines_shown: usize,
    /// Approximate characters per display line.
    pub approx_line_length: usize,
    /// Replies past this count no longer bump the thread.
    pub max_res: usize,
    /// Replies by the thread author within this window of the thread's
    /// creation don't count toward `max_res`.
    #[serde(deserialize_with = "de_duration", serialize_with = "se_duration")]
    pub nosage_window: Duration,
    /// Maximum length of the name, email, and subject fields.
    pub max_field_length: usize,
    /// Maximum length of the comment field.
    pub max_comment_length: usize,
    /// Whether new threads may carry an image.
    pub allow_images: bool,
    /// Whether new threads may be text-only.
    pub allow_text_only: bool,
    /// Whether replies may carry an image.
    pub allow_image_replies: bool,
    /// Whether replies may be text-only.
    pub allow_text_replies: bool,
    /// Discard names and contact fields, keeping only sage.
    pub forced_anon: bool,
    /// The name given to posts without one.
    pub anonymous: String,
    /// Placeholder for an empty subject.
    pub default_subject: String,
    /// Placeholder for an empty comment.
    pub default_comment: String,
    /// Marker and salt for tripcode derivation.
    pub tripkey: String,
    /// Display style for post dates.
    pub date_style: DateStyle,
    /// Maximum upload size in kilobytes.
    pub max_kb: u64,
    /// Maximum upload width in pixels.
    pub max_image_width: u32,
    /// Maximum upload height in pixels.
    pub max_image_height: u32,
    /// Maximum upload pixel count.
    pub max_image_pixels: u64,
    /// Thumbnail bounding box width.
    pub max_thumb_width: u32,
    /// Thumbnail bounding box height.
    pub max_thumb_height: u32,
    /// Thumbnail even when the source already fits the bounding box.
    pub thumbnail_small: bool,
    /// Thumbnail encode quality, 1-100.
    pub thumbnail_quality: u8,
    /// Scope of duplicate file detection.
    pub duplicate_detection: DuplicateScope,
    /// Accept files that aren't a recognized media format.
    pub allow_unknown: bool,
    /// Extensions that are never accepted.
    pub forbidden_extensions: Vec<String>,
    /// Extra non-media extensions accepted by name.
    pub extra_filetypes: Vec<String>,
    /// Extensions whose original filename is kept. Defaults to
    /// `extra_filetypes`.
    pub keep_name_filetypes: Option<Vec<String>>,
    /// Suffix appended to stored files of unknown formats.
    pub munge_suffix: String,
    /// Window in which a second post from the same address is a flood.
    #[serde(deserialize_with = "de_duration", serialize_with = "se_duration")]
    pub post_flood_window: Duration,
    /// As `post_flood_window`, for posts carrying a file.
    #[serde(deserialize_with = "de_duration", serialize_with = "se_duration")]
    pub image_flood_window: Duration,
    /// Window in which reposting an identical comment is a flood.
    #[serde(deserialize_with = "de_duration", serialize_with = "se_duration")]
    pub repeat_flood_window: Duration,
    /// Non-stickied threads older than this are trimmed after each post.
    #[serde(
        deserialize_with = "de_opt_duration",
        serialize_with = "se_opt_duration"
    )]
    pub max_age: Option<Duration>,
    /// Move trimmed threads into the archive instead of deleting them.
    pub archive_mode: bool,
    /// Hand the honeypot fields to the spam oracle.
    pub spam_trap: bool,
    /// Require a captcha for untrusted posters.
    pub enable_captcha: bool,
    /// Run the proxy oracle for non-whitelisted addresses.
    pub enable_proxy_check: bool,
    /// Directory for stored images, relative to the board root.
    pub img_dir: String,
    /// Directory for thumbnails, relative to the board root.
    pub thumb_dir: String,
    /// Directory for rendered thread pages, relative to the board root.
    pub res_dir: String,
    /// Directory for archived pages and media, relative to the board root.
    pub archive_dir: String,
    /// Directory for backed-up media, relative to the archive directory.
    pub backup_dir: String,
}

impl Default for BoardOptions {
    fn default() -> BoardOptions {
        BoardOptions {
            threads_per_page: 10,
            replies_per_thread: 5,
            image_replies_per_thread: 0,
            max_lines_shown: 15,
            approx_line_length: 150,
            max_res: 500,
            nosage_window: Duration::from_secs(0),
            max_field_length: 100,
            max_comment_length: 8192,
            allow_images: true,
            allow_text_only: true,
            allow_image_replies: true,
            allow_text_replies: true,
            forced_anon: false,
            anonymous: "Anonymous".into(),
            default_subject: String::new(),
            default_comment: String::new(),
            tripkey: "!".into(),
            date_style: DateStyle::Futaba,
            max_kb: 4096,
            max_image_width: 16384,
            max_image_height: 16384,
            max_image_pixels: 50_000_000,
            max_thumb_width: 200,
            max_thumb_height: 200,
            thumbnail_small: false,
            thumbnail_quality: 70,
            duplicate_detection: DuplicateScope::Board,
            allow_unknown: false,
            forbidden_extensions: ["php", "cgi", "pl", "exe", "js", "html", "htm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extra_filetypes: Vec::new(),
            keep_name_filetypes: None,
            munge_suffix: "_m".into(),
            post_flood_window: Duration::from_secs(20),
            image_flood_window: Duration::from_secs(30),
            repeat_flood_window: Duration::from_secs(300),
            max_age: None,
            archive_mode: false,
            spam_trap: false,
            enable_captcha: false,
            enable_proxy_check: false,
            img_dir: "src".into(),
            thumb_dir: "thumb".into(),
            res_dir: "res".into(),
            archive_dir: "arch".into(),
            backup_dir: "backup".into(),
        }
    }
}

impl BoardOptions {
    /// The extensions whose original filename is kept.
    pub fn keep_name_filetypes(&self) -> &[String] {
        self.keep_name_filetypes
            .as_deref()
            .unwrap_or(&self.extra_filetypes)
    }
}

/// Configuration for a corkboard instance.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the board directories live.
    pub site_dir: PathBuf,
    /// Where the templates to be rendered are.
    pub template_dir: PathBuf,
    /// The boards served by this instance, keyed by name.
    pub boards: HashMap<String, BoardOptions>,
    /// Addresses exempt from flood checks and oracles.
    pub whitelist: Vec<IpAddr>,
    /// Tripcodes exempt from the captcha.
    pub trusted_trips: Vec<String>,
    /// Soft-delete posts into the backup area instead of removing them.
    pub post_backup: bool,
    /// How long backed-up posts are retained.
    #[serde(deserialize_with = "de_duration", serialize_with = "se_duration")]
    pub backup_expire: Duration,
    /// Window in which a second report from the same address is a flood.
    #[serde(deserialize_with = "de_duration", serialize_with = "se_duration")]
    pub report_flood_window: Duration,
    /// Minimum report comment length.
    pub report_min_length: usize,
    /// Maximum report comment length.
    pub report_max_length: usize,
    /// Most posts a single delete or report may target.
    pub max_batch_targets: usize,
    /// How many posts the RSS feed carries.
    pub rss_length: usize,
    /// Whether board feeds are generated.
    pub enable_rss: bool,
    /// Whether long threads get an abbreviated page.
    pub enable_abbreviated_pages: bool,
    /// How many posts the abbreviated page keeps.
    pub posts_in_abbreviated_pages: usize,
    /// Reply display cap for stickied threads on index pages.
    pub replies_per_sticky: usize,
    /// Extension of rendered pages.
    pub page_ext: String,
    /// Static thumbnails for accepted non-media extensions.
    pub icons: HashMap<String, PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        let (site_dir, template_dir) = if cfg!(debug_assertions) {
            (PathBuf::from("site"), PathBuf::from("res/templates"))
        } else {
            (
                PathBuf::from("/var/lib/corkboard/site"),
                PathBuf::from("/usr/share/corkboard/templates"),
            )
        };

        Config {
            site_dir,
            template_dir,
            boards: HashMap::new(),
            whitelist: Vec::new(),
            trusted_trips: Vec::new(),
            post_backup: false,
            backup_expire: Duration::from_secs(14 * 24 * 3600),
            report_flood_window: Duration::from_secs(60),
            report_min_length: 3,
            report_max_length: 250,
            max_batch_targets: 10,
            rss_length: 30,
            enable_rss: true,
            enable_abbreviated_pages: true,
            posts_in_abbreviated_pages: 50,
            replies_per_sticky: 1,
            page_ext: "html".into(),
            icons: HashMap::new(),
        }
    }
}

impl Config {
    /// Open a config file at the given path.
    pub fn open<P>(path: P) -> Result<Config>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let msg = format!("Couldn't open config file at {}", path.display());

        let reader =
            File::open(path).map_err(|err| Error::from_io_error(err, msg))?;

        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Generate a new config file from default values.
    pub fn generate<W>(mut out: W) -> Result<()>
    where
        W: std::io::Write,
    {
        writeln!(&mut out, "# Configuration for corkboard")?;
        serde_yaml::to_writer(&mut out, &Config::default())?;
        writeln!(&mut out)?;
        Ok(())
    }

    /// Get the default location of the config file.
    pub fn default_path() -> PathBuf {
        if cfg!(debug_assertions) {
            PathBuf::from("contrib/dev-config.yaml")
        } else {
            PathBuf::from("/etc/corkboard/config.yaml")
        }
    }

    /// Get the options for a board.
    pub fn board_options<S>(&self, board_name: S) -> Result<&BoardOptions>
    where
        S: AsRef<str>,
    {
        self.boards
            .get(board_name.as_ref())
            .ok_or_else(|| Error::BoardNotFound {
                board_name: board_name.as_ref().to_string(),
            })
    }

    /// Whether an address is whitelisted.
    pub fn is_whitelisted(&self, ip: IpAddr) -> bool {
        self.whitelist.contains(&ip)
    }

    /// Whether a tripcode is trusted enough to skip the captcha.
    pub fn is_trusted(&self, trip: &str) -> bool {
        !trip.is_empty() && self.trusted_trips.iter().any(|t| t == trip)
    }

    /// Dump configuration info to the log.
    pub fn debug_log(&self) {
        use log::debug;

        debug!("  site dir {}", self.site_dir.display());
        debug!("  template dir {}", self.template_dir.display());
        debug!("  post backup {}", self.post_backup);
        debug!("  boards:");
        for name in self.boards.keys() {
            debug!("    board: {}", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse_from_human_strings() -> crate::Result<()> {
        let yaml = "post_flood_window: 45s\nmax_age: 2 days\n";
        let options: BoardOptions = serde_yaml::from_str(yaml)?;

        assert_eq!(options.post_flood_window, Duration::from_secs(45));
        assert_eq!(options.max_age, Some(Duration::from_secs(2 * 24 * 3600)));

        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "threads_per_page: 10\nmystery_knob: 3\n";

        assert!(serde_yaml::from_str::<BoardOptions>(yaml).is_err());
    }

    #[test]
    fn generated_config_round_trips() -> crate::Result<()> {
        let mut buf = Vec::new();
        Config::generate(&mut buf)?;

        let parsed: Config = serde_yaml::from_slice(&buf)?;
        assert_eq!(parsed.max_batch_targets, 10);

        Ok(())
    }
}
