use std::sync::OnceLock;

use anyhow::{Context as _, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

static HOST_FROM_URL_REGEX: OnceLock<Regex> = OnceLock::new();
static SITE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_host_from_url_regex() -> &'static Regex {
    HOST_FROM_URL_REGEX.get_or_init(|| Regex::new(r"^https?://(.*?)(/|$)").unwrap())
}

fn get_site_name_regex() -> &'static Regex {
    SITE_NAME_REGEX.get_or_init(|| Regex::new(r"^(.*?).webex.com").unwrap())
}

/// Plugin configuration as read from the plugin spec, plus values derived
/// from it. Treated as immutable once built; changes install a new value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(default, alias = "sitehost")]
    pub site_host: String,

    /// Rewrite `/meet/` room links into `/join/` and `/start/` links.
    #[serde(default = "url_conversion_default")]
    pub url_conversion: bool,

    // Site host up to `.webex.com`, e.g. `testsite.my` for
    // `testsite.my.webex.com`.
    #[serde(skip)]
    site_name: String,
}

const fn url_conversion_default() -> bool {
    true
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            site_host: String::new(),
            url_conversion: url_conversion_default(),
            site_name: String::new(),
        }
    }
}

impl Configuration {
    #[must_use]
    pub fn new(site_host: &str) -> Self {
        Self {
            site_host: site_host.to_owned(),
            ..Self::default()
        }
        .normalized()
    }

    /// Parses the `config` value of a plugin spec. A missing config yields
    /// the (invalid) default.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_value(value).context("parsing webex plugin config")?;
        Ok(cfg.normalized())
    }

    fn normalized(mut self) -> Self {
        self.site_host = parse_host_from_url(&self.site_host);
        self.site_name = parse_site_name(&self.site_host);
        self
    }

    #[must_use]
    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    /// The site host is only usable if a site name can be read from it.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !parse_site_name(&self.site_host).is_empty()
    }
}

/// Reduces `https://host/path` to `host`; anything without a scheme is
/// only trimmed.
#[must_use]
pub fn parse_host_from_url(url: &str) -> String {
    get_host_from_url_regex()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| url.trim().to_owned(), |host| host.as_str().to_owned())
}

/// Everything before the first `<any char>webex.com`, or empty when the
/// host is not a Webex site.
#[must_use]
pub fn parse_site_name(site_host: &str) -> String {
    get_site_name_regex()
        .captures(site_host)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().to_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_name_requires_webex_suffix() {
        assert_eq!(parse_site_name("hostname.webex.com"), "hostname");
        assert_eq!(parse_site_name("testsite.my.webex.com"), "testsite.my");
        assert_eq!(parse_site_name("blah.blah.webex.co"), "");
        assert_eq!(parse_site_name(""), "");
        assert_eq!(parse_site_name("webex.com"), "");
        assert_eq!(parse_site_name("xwebex.com"), "");
        assert_eq!(parse_site_name("a-webex.com"), "a");
    }

    #[test]
    fn site_name_does_not_span_lines() {
        assert_eq!(parse_site_name("acme\nwebex.com"), "");
        assert_eq!(parse_site_name("ac\nme.webex.com"), "");
        assert!(!Configuration::new("acme\nx.webex.com").is_valid());
    }

    #[test]
    fn validity_follows_site_name() {
        assert!(Configuration::new("hostname.webex.com").is_valid());
        assert!(!Configuration::new("blah.blah.webex.co").is_valid());
        assert!(!Configuration::default().is_valid());
    }

    #[test]
    fn host_is_extracted_from_urls() {
        assert_eq!(parse_host_from_url("https://x.webex.com/meet/abc"), "x.webex.com");
        assert_eq!(parse_host_from_url("http://x.webex.com"), "x.webex.com");
        assert_eq!(parse_host_from_url("  x.webex.com "), "x.webex.com");
        assert_eq!(parse_host_from_url("https://"), "");
        assert_eq!(parse_host_from_url("ftp://x.webex.com/a"), "ftp://x.webex.com/a");
    }

    #[test]
    fn from_value_normalizes_and_defaults() {
        let value: serde_yaml::Value =
            serde_yaml::from_str("sitehost: https://acme.webex.com/\n").unwrap();
        let cfg = Configuration::from_value(value).unwrap();
        assert_eq!(cfg.site_host, "acme.webex.com");
        assert_eq!(cfg.site_name(), "acme");
        assert!(cfg.url_conversion);

        let value: serde_yaml::Value =
            serde_yaml::from_str("site_host: acme.webex.com\nurl_conversion: false\n").unwrap();
        let cfg = Configuration::from_value(value).unwrap();
        assert!(!cfg.url_conversion);

        let cfg = Configuration::from_value(serde_yaml::Value::Null).unwrap();
        assert!(!cfg.is_valid());
    }
}
