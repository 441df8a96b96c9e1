//! Validation of platform-supplied embed markup.
//!
//! Embed HTML arrives from the platform's oEmbed API and is rendered verbatim
//! in user browsers, so it is either accepted unchanged or rejected; nothing
//! is rewritten.
//!
//! # Rules
//!
//! Applied in order, the first violation is reported:
//!
//! 1. [`RejectionReason::Empty`]: nothing left after trimming.
//! 2. [`RejectionReason::TooLarge`]: more than [`TrustPolicy::max_chars`].
//! 3. [`RejectionReason::ScriptOrStyle`]: a `<script` or `<style` tag.
//! 4. [`RejectionReason::InlineEventHandler`]: an `on*` attribute.
//! 5. [`RejectionReason::JavascriptUrl`]: a `javascript:` scheme, raw or
//!    entity-encoded.
//! 6. [`RejectionReason::DisallowedTag`]: a tag outside the allow-list, or
//!    markup the embed grammar never contains (comments, unterminated tags).
//! 7. [`RejectionReason::DisallowedAttribute`]: an attribute outside the
//!    allow-list, such as `srcdoc`.
//! 8. [`RejectionReason::MissingContainerClass`]: no `tiktok-embed` class.
//! 9. [`RejectionReason::UntrustedCite`]: `cite` missing or off-platform.
//! 10. [`RejectionReason::UntrustedUrl`]: an `href` or `ping` off-platform, or
//!     a `src`, `srcset` or `style` `url(...)` off-platform and off-CDN.
//!
//! Rules 2, 3 and 5 also run against the raw text; everything else is a walk
//! over the tokens produced by [`tokenizer::tokenize`]. Attributes written on
//! end tags are checked like any other.
//!
//! # Module invariants
//!
//! - **No I/O and no shared state.** [`EmbedGuard`] is `Copy` and safe to use
//!   from any number of tasks.

pub mod policy;
pub mod tokenizer;

pub use policy::TrustPolicy;

use thiserror::Error;
use tracing::debug;

use tokenizer::{Attribute, Token};

/// Why a piece of embed markup was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RejectionReason {
    #[error("embed markup is empty")]
    Empty,

    #[error("embed markup exceeds the maximum length")]
    TooLarge,

    #[error("embed markup contains a <script> or <style> tag")]
    ScriptOrStyle,

    #[error("embed markup contains an inline event handler")]
    InlineEventHandler,

    #[error("embed markup contains a javascript: URL")]
    JavascriptUrl,

    #[error("embed markup contains a disallowed tag")]
    DisallowedTag,

    #[error("embed markup contains a disallowed attribute")]
    DisallowedAttribute,

    #[error("embed markup is missing the embed container class")]
    MissingContainerClass,

    #[error("embed cite URL is missing or not on the platform")]
    UntrustedCite,

    #[error("embed markup references an untrusted URL")]
    UntrustedUrl,
}

impl RejectionReason {
    /// Stable snake-case identifier used in API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::Empty => "empty",
            RejectionReason::TooLarge => "too_large",
            RejectionReason::ScriptOrStyle => "script_or_style",
            RejectionReason::InlineEventHandler => "inline_event_handler",
            RejectionReason::JavascriptUrl => "javascript_url",
            RejectionReason::DisallowedTag => "disallowed_tag",
            RejectionReason::DisallowedAttribute => "disallowed_attribute",
            RejectionReason::MissingContainerClass => "missing_container_class",
            RejectionReason::UntrustedCite => "untrusted_cite",
            RejectionReason::UntrustedUrl => "untrusted_url",
        }
    }
}

/// Allow/deny gate for embed markup under a fixed [`TrustPolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedGuard {
    policy: TrustPolicy,
}

impl EmbedGuard {
    /// Create a guard enforcing `policy`.
    pub const fn new(policy: TrustPolicy) -> Self {
        Self { policy }
    }

    /// The policy this guard enforces.
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Validate `raw`, returning the trimmed markup if every rule passes.
    ///
    /// # Errors
    ///
    /// Returns the [`RejectionReason`] of the first rule that fails.
    pub fn validate(&self, raw: &str) -> Result<String, RejectionReason> {
        let verdict = self.check(raw);
        if let Err(reason) = &verdict {
            debug!(reason = reason.code(), len = raw.len(), "embed markup rejected");
        }
        verdict
    }

    fn check(&self, raw: &str) -> Result<String, RejectionReason> {
        let html = raw.trim();
        if html.is_empty() {
            return Err(RejectionReason::Empty);
        }
        if html.chars().count() > self.policy.max_chars {
            return Err(RejectionReason::TooLarge);
        }

        let lowered = html.to_ascii_lowercase();
        if lowered.contains("<script") || lowered.contains("<style") {
            return Err(RejectionReason::ScriptOrStyle);
        }

        let tokens = tokenizer::tokenize(html);

        if attributes(&tokens).any(is_event_handler) {
            return Err(RejectionReason::InlineEventHandler);
        }

        if lowered.contains("javascript:")
            || attributes(&tokens).any(|a| hides_javascript_scheme(a.value_or_empty()))
        {
            return Err(RejectionReason::JavascriptUrl);
        }

        if !tokens.iter().all(|t| self.tag_allowed(t)) {
            return Err(RejectionReason::DisallowedTag);
        }

        if !attributes(&tokens).all(|a| self.policy.allows_attribute(&a.name)) {
            return Err(RejectionReason::DisallowedAttribute);
        }

        let container = self.policy.container_class;
        let has_container = attributes(&tokens)
            .filter(|a| a.name == "class" || a.name == "classname")
            .any(|a| a.value_or_empty().split_ascii_whitespace().any(|c| c == container));
        if !has_container {
            return Err(RejectionReason::MissingContainerClass);
        }

        let mut cites = attributes(&tokens).filter(|a| a.name == "cite").peekable();
        if cites.peek().is_none()
            || !cites.all(|a| self.policy.is_platform_url(a.value_or_empty()))
        {
            return Err(RejectionReason::UntrustedCite);
        }

        for attr in attributes(&tokens) {
            let trusted = match attr.name.as_str() {
                "href" => self.policy.is_platform_url(attr.value_or_empty()),
                "src" => self.policy.is_media_url(attr.value_or_empty()),
                "srcset" => srcset_urls(attr.value_or_empty()).all(|u| self.policy.is_media_url(u)),
                "ping" => attr
                    .value_or_empty()
                    .split_ascii_whitespace()
                    .all(|u| self.policy.is_platform_url(u)),
                "style" => self.style_is_trusted(attr.value_or_empty()),
                // Remaining allowed attributes carry no URLs.
                _ => true,
            };
            if !trusted {
                return Err(RejectionReason::UntrustedUrl);
            }
        }

        Ok(html.to_owned())
    }

    fn tag_allowed(&self, token: &Token) -> bool {
        match token {
            Token::Start { name, .. } | Token::End { name, .. } => self.policy.allows_tag(name),
            Token::Declaration | Token::ProcessingInstruction | Token::Unterminated => false,
        }
    }

    /// Every `url(...)` in an inline style must be a media URL. Constructs that
    /// can fetch or hide a URL without a plain `url(` are refused outright.
    fn style_is_trusted(&self, value: &str) -> bool {
        let lowered = value.to_ascii_lowercase();
        if ["\\", "image-set", "expression", "@import"]
            .iter()
            .any(|construct| lowered.contains(construct))
        {
            return false;
        }
        let mut rest = lowered.as_str();
        while let Some(idx) = rest.find("url(") {
            let after = &rest[idx + 4..];
            let Some(close) = after.find(')') else {
                return false;
            };
            let url = after[..close].trim().trim_matches(|c: char| c == '"' || c == '\'');
            if !self.policy.is_media_url(url) {
                return false;
            }
            rest = &after[close + 1..];
        }
        true
    }
}

/// Validate `raw` against [`TrustPolicy::TIKTOK`].
///
/// # Errors
///
/// See [`EmbedGuard::validate`].
pub fn validate(raw: &str) -> Result<String, RejectionReason> {
    EmbedGuard::default().validate(raw)
}

fn attributes(tokens: &[Token]) -> impl Iterator<Item = &Attribute> {
    tokens.iter().flat_map(|t| match t {
        Token::Start { attrs, .. } | Token::End { attrs, .. } => attrs.as_slice(),
        _ => &[],
    })
}

/// `on` followed by one or more word characters.
fn is_event_handler(attr: &Attribute) -> bool {
    attr.name
        .strip_prefix("on")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'))
}

/// Browsers drop ASCII whitespace and control characters inside a scheme,
/// so `java&Tab;script:` still runs.
fn hides_javascript_scheme(value: &str) -> bool {
    let squashed: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    squashed.contains("javascript:")
}

/// Candidate URLs of a `srcset` value (`url [descriptor], ...`).
fn srcset_urls(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_ascii_whitespace().next())
}
