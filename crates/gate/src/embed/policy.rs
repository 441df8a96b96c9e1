//! Static trust tables for platform embeds and the URL checks built on them.

/// Allow-lists applied to every embed.
///
/// Process-wide and immutable; [`TrustPolicy::TIKTOK`] is the only policy the
/// service ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Registrable domain of the platform. Any subdomain is also trusted.
    pub platform_domain: &'static str,
    /// Additional domains (and their subdomains) trusted for `src` only.
    pub cdn_suffixes: &'static [&'static str],
    /// Tag names permitted in opening and closing tags.
    pub allowed_tags: &'static [&'static str],
    /// Attribute names permitted on any allowed tag.
    pub allowed_attributes: &'static [&'static str],
    /// Attribute name prefixes permitted on any allowed tag (`data-*`).
    pub allowed_attribute_prefixes: &'static [&'static str],
    /// Class token that marks the embed container.
    pub container_class: &'static str,
    /// Maximum accepted length, in characters, after trimming.
    pub max_chars: usize,
}

impl TrustPolicy {
    /// Policy for TikTok's oEmbed `html` field.
    pub const TIKTOK: TrustPolicy = TrustPolicy {
        platform_domain: "tiktok.com",
        cdn_suffixes: &["tiktokcdn.com", "tiktokcdn-us.com", "ttwstatic.com", "ibyteimg.com"],
        allowed_tags: &[
            "blockquote",
            "section",
            "a",
            "p",
            "span",
            "strong",
            "em",
            "img",
            "cite",
            "iframe",
        ],
        allowed_attributes: &[
            "class",
            "classname",
            "id",
            "title",
            "lang",
            "dir",
            "cite",
            "style",
            "href",
            "target",
            "rel",
            "ping",
            "src",
            "srcset",
            "sizes",
            "alt",
            "width",
            "height",
            "loading",
            "decoding",
            "allow",
            "allowfullscreen",
            "frameborder",
            "scrolling",
            "referrerpolicy",
            "sandbox",
        ],
        allowed_attribute_prefixes: &["data-", "aria-"],
        container_class: "tiktok-embed",
        max_chars: 6000,
    };

    /// Whether `name` (already lowercased) may appear as a tag.
    pub fn allows_tag(&self, name: &str) -> bool {
        self.allowed_tags.contains(&name)
    }

    /// Whether `name` (already lowercased) may appear as an attribute.
    pub fn allows_attribute(&self, name: &str) -> bool {
        self.allowed_attributes.contains(&name)
            || self
                .allowed_attribute_prefixes
                .iter()
                .any(|prefix| name.len() > prefix.len() && name.starts_with(prefix))
    }

    /// HTTPS URL on the platform domain or one of its subdomains.
    pub fn is_platform_url(&self, url: &str) -> bool {
        https_host(url).is_some_and(|host| host_within(&host, self.platform_domain))
    }

    /// HTTPS URL on the platform or a recognised CDN. Only for `src`.
    pub fn is_media_url(&self, url: &str) -> bool {
        https_host(url).is_some_and(|host| {
            host_within(&host, self.platform_domain)
                || self.cdn_suffixes.iter().any(|cdn| host_within(&host, cdn))
        })
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::TIKTOK
    }
}

/// Extract the lowercased host of an absolute `https://` URL.
///
/// Returns `None` for any other scheme, relative or protocol-relative URLs,
/// URLs carrying credentials (`https://trusted@evil`), malformed ports, and
/// URLs containing whitespace or control characters, which browsers strip
/// before parsing.
pub fn https_host(url: &str) -> Option<String> {
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return None;
    }
    let scheme = url.get(..8)?;
    if !scheme.eq_ignore_ascii_case("https://") {
        return None;
    }
    let rest = &url[8..];
    let authority_end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#' | '\\'))
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    if authority.contains('@') {
        return None;
    }

    let host = match authority.rsplit_once(':') {
        Some((host, port)) => {
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            host
        }
        None => authority,
    };
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.starts_with('.') || host.contains("..") {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// `host` equals `domain` or is a subdomain of it.
fn host_within(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
