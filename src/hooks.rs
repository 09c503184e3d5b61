//! Seams for the external pass/fail oracles: ban list, spam trap,
//! captcha, and proxy checking live outside this crate and are consulted
//! through this trait.

use std::net::IpAddr;

use crate::models::PostId;
use crate::Result;

/// The text fields of a submission, as the oracles want to see them.
#[derive(Debug, Clone, Copy)]
pub struct PostFields<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub subject: &'a str,
    pub comment: &'a str,
}

/// External checks consulted before a post or report is accepted.
///
/// Every method is pass/fail: return `Ok(())` to let the submission
/// through, or an error to reject it. The default implementations pass
/// everything.
pub trait Hooks {
    /// Reject banned addresses, names, or content.
    fn ban_check(&self, _ip: IpAddr, _fields: &PostFields) -> Result<()> {
        Ok(())
    }

    /// Reject submissions that tripped a spam trap.
    fn spam_check(&self, _fields: &PostFields) -> Result<()> {
        Ok(())
    }

    /// Verify a captcha token for an untrusted poster.
    fn captcha_check(
        &self,
        _token: Option<&str>,
        _ip: IpAddr,
        _thread: PostId,
    ) -> Result<()> {
        Ok(())
    }

    /// Reject posts routed through open proxies.
    fn proxy_check(&self, _ip: IpAddr) -> Result<()> {
        Ok(())
    }
}

/// The do-nothing oracle set.
pub struct AllowAll;

impl Hooks for AllowAll {}
