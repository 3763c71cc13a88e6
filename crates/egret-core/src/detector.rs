// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Block/challenge detector — anti-bot protection recognition from domain,
//! headers, and HTML. Ported from `original_source/detection.py`.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

struct SiteEntry {
    antibot: Option<&'static str>,
    tier: u8,
    proxy: bool,
    sticky: bool,
    ja4t: bool,
}

static SITE_PROFILES: &[(&str, SiteEntry)] = &[
    ("amazon.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: true, ja4t: true }),
    ("ebay.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("walmart.", SiteEntry { antibot: Some("perimeterx"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("target.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("bestbuy.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("linkedin.", SiteEntry { antibot: Some("datadome"), tier: 3, proxy: true, sticky: true, ja4t: true }),
    ("twitter.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("x.com", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("facebook.", SiteEntry { antibot: Some("custom"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("instagram.", SiteEntry { antibot: Some("custom"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("g2.com", SiteEntry { antibot: Some("datadome"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("trustpilot.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("glassdoor.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("booking.com", SiteEntry { antibot: Some("perimeterx"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("airbnb.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("expedia.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("zillow.", SiteEntry { antibot: Some("perimeterx"), tier: 3, proxy: true, sticky: false, ja4t: true }),
    ("redfin.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("realtor.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: false, ja4t: false }),
    ("indeed.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("monster.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("nytimes.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: false, sticky: false, ja4t: false }),
    ("wsj.", SiteEntry { antibot: Some("akamai"), tier: 2, proxy: false, sticky: false, ja4t: false }),
    ("bloomberg.", SiteEntry { antibot: Some("cloudflare"), tier: 2, proxy: false, sticky: false, ja4t: false }),
    ("google.", SiteEntry { antibot: Some("custom"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("youtube.", SiteEntry { antibot: Some("custom"), tier: 2, proxy: true, sticky: false, ja4t: false }),
    ("paypal.", SiteEntry { antibot: Some("custom"), tier: 3, proxy: true, sticky: true, ja4t: true }),
    ("chase.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: true, ja4t: true }),
    ("bankofamerica.", SiteEntry { antibot: Some("akamai"), tier: 3, proxy: true, sticky: true, ja4t: true }),
];

/// domain-substring → (ja4t_suspected_only, confidence)
static JA4T_SITES: &[(&str, f64, bool)] = &[
    ("linkedin.", 0.95, false),
    ("amazon.", 0.90, false),
    ("google.", 0.70, true),
    ("facebook.", 0.85, false),
    ("booking.com", 0.90, false),
    ("zillow.", 0.85, false),
    ("walmart.", 0.85, false),
];

static ANTIBOT_HEADERS: &[(&str, &str)] = &[
    ("cf-ray", "cloudflare"),
    ("cf-cache-status", "cloudflare"),
    ("x-datadome", "datadome"),
    ("x-datadome-cid", "datadome"),
    ("x-akamai-transformed", "akamai"),
    ("akamai-grn", "akamai"),
    ("x-px-", "perimeterx"),
];

static ANTIBOT_HTML_PATTERNS: LazyLock<Vec<(&'static str, Vec<regex::Regex>)>> = LazyLock::new(|| {
    let build = |pats: &[&str]| -> Vec<regex::Regex> {
        pats.iter().map(|p| regex::RegexBuilder::new(p).case_insensitive(true).build().unwrap()).collect()
    };
    vec![
        ("cloudflare", build(&[
            r"cf-browser-verification",
            r"cdn-cgi/challenge-platform",
            r"__cf_chl_",
            r"Cloudflare Ray ID",
            r"Just a moment\.\.\.",
        ])),
        ("cloudflare_uam", build(&[
            r"Checking your browser before accessing",
            r"This process is automatic",
            r"Please Wait\.\.\. \| Cloudflare",
        ])),
        ("datadome", build(&[r"datadome\.co", r"dd\.js", r"window\.ddjskey"])),
        ("akamai", build(&[r"_abck", r"bm_sz", r"ak_bmsc"])),
        ("perimeterx", build(&[r"_px3", r"_pxff_", r"px-captcha"])),
    ]
});

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Protection {
    pub domain: String,
    pub antibot: Option<String>,
    pub antibot_confidence: f64,
    pub uses_ja4t: bool,
    pub ja4t_confidence: f64,
    pub has_static_data: bool,
    pub detected_framework: Option<String>,
    pub recommended_tier: u8,
    pub needs_proxy: bool,
    pub needs_sticky: bool,
}

/// Detect site protection characteristics from URL, optional HTML body, and
/// optional response headers. Recommends a minimum stealth tier.
pub fn detect_protection(url: &str, html: Option<&str>, headers: Option<&[(String, String)]>) -> Protection {
    let domain = extract_domain(url);
    let mut p = Protection {
        domain: domain.clone(),
        recommended_tier: 1,
        ..Default::default()
    };

    for (pattern, entry) in SITE_PROFILES {
        if domain.contains(pattern) {
            p.antibot = entry.antibot.map(String::from);
            p.recommended_tier = entry.tier;
            p.needs_proxy = entry.proxy;
            p.needs_sticky = entry.sticky;
            p.antibot_confidence = 0.9;
            if entry.ja4t {
                p.uses_ja4t = true;
                p.ja4t_confidence = 0.9;
            }
            break;
        }
    }

    for (pattern, confidence, suspected_only) in JA4T_SITES {
        if domain.contains(pattern) {
            p.uses_ja4t = true;
            let c = if *suspected_only { *confidence } else { *confidence };
            p.ja4t_confidence = p.ja4t_confidence.max(c);
            break;
        }
    }

    if p.antibot.is_none() {
        if let Some(headers) = headers {
            'outer: for (header, antibot) in ANTIBOT_HEADERS {
                for (h, _) in headers {
                    if h.to_lowercase().contains(header) {
                        p.antibot = Some((*antibot).to_string());
                        p.antibot_confidence = 0.7;
                        break 'outer;
                    }
                }
            }
        }
    }

    if let Some(html) = html {
        if p.antibot.is_none() {
            'outer: for (antibot, patterns) in ANTIBOT_HTML_PATTERNS.iter() {
                for re in patterns {
                    if re.is_match(html) {
                        p.antibot = Some((*antibot).to_string());
                        p.antibot_confidence = 0.8;
                        break 'outer;
                    }
                }
            }
        }
        p.has_static_data = has_static_data(html);
        p.detected_framework = detect_framework(html);
    }

    if let Some(antibot) = &p.antibot {
        match antibot.as_str() {
            "akamai" | "datadome" | "perimeterx" | "cloudflare_uam" => {
                p.recommended_tier = 3;
                p.needs_proxy = true;
            }
            "cloudflare" => {
                p.recommended_tier = 2;
                p.needs_proxy = true;
            }
            _ => {
                p.recommended_tier = p.recommended_tier.max(2);
            }
        }
    }

    if p.uses_ja4t && p.ja4t_confidence > 0.5 {
        p.recommended_tier = p.recommended_tier.max(2);
        p.needs_proxy = true;
    }

    p
}

fn extract_domain(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_lowercase()
}

fn has_static_data(html: &str) -> bool {
    const INDICATORS: &[&str] = &[
        "__NEXT_DATA__",
        "__NUXT__",
        "application/ld+json",
        "__APOLLO_STATE__",
        "__INITIAL_STATE__",
        "__PRELOADED_STATE__",
    ];
    INDICATORS.iter().any(|i| html.contains(i))
}

fn detect_framework(html: &str) -> Option<String> {
    if html.contains("__NEXT_DATA__") {
        return Some("nextjs".to_string());
    }
    if html.contains("__NUXT__") {
        return Some("nuxt".to_string());
    }
    if html.contains("__remixContext") {
        return Some("remix".to_string());
    }
    if html.contains("__GATSBY") {
        return Some("gatsby".to_string());
    }
    if html.contains("ng-version") {
        return Some("angular".to_string());
    }
    if html.contains("data-reactroot") || html.contains("data-react-") {
        return Some("react".to_string());
    }
    None
}

/// Lightweight post-navigation check: does the page title/body look like a
/// block or challenge page? Returns the protection type string if so.
pub fn is_blocked(title: &str, url: &str, body_sample: &str) -> Option<&'static str> {
    let title = title.to_lowercase();
    let url = url.to_lowercase();
    let body = body_sample.to_lowercase();

    if title.contains("just a moment") || title.contains("attention required") {
        return Some("cloudflare");
    }
    if title.contains("datadome") {
        return Some("datadome");
    }
    if title.contains("access denied") || url.contains("px-captcha") {
        return Some("perimeterx");
    }
    if ["access denied", "403 forbidden", "blocked"].iter().any(|s| title.contains(s)) {
        return Some("generic");
    }
    if body.contains("captcha") || body.contains("verify you are human") {
        return Some("captcha");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_site_gets_matched_tier() {
        let p = detect_protection("https://www.linkedin.com/in/someone", None, None);
        assert_eq!(p.antibot.as_deref(), Some("datadome"));
        assert_eq!(p.recommended_tier, 3);
        assert!(p.needs_proxy && p.needs_sticky);
    }

    #[test]
    fn unknown_site_defaults_to_tier_one() {
        let p = detect_protection("https://example.com", None, None);
        assert!(p.antibot.is_none());
        assert_eq!(p.recommended_tier, 1);
        assert!(!p.needs_proxy);
    }

    #[test]
    fn header_detection_fills_in_unmatched_domain() {
        let headers = vec![("CF-Ray".to_string(), "abc123".to_string())];
        let p = detect_protection("https://unknown-cdn.example", None, Some(&headers));
        assert_eq!(p.antibot.as_deref(), Some("cloudflare"));
    }

    #[test]
    fn html_detection_finds_cloudflare_challenge() {
        let html = "<title>Just a moment...</title>";
        let p = detect_protection("https://unknown.example", Some(html), None);
        assert_eq!(p.antibot.as_deref(), Some("cloudflare"));
        assert_eq!(p.recommended_tier, 2);
    }

    #[test]
    fn detects_nextjs_framework_and_static_data() {
        let html = "<script>window.__NEXT_DATA__ = {}</script>";
        let p = detect_protection("https://example.com", Some(html), None);
        assert_eq!(p.detected_framework.as_deref(), Some("nextjs"));
        assert!(p.has_static_data);
    }

    #[test]
    fn is_blocked_detects_cloudflare_title() {
        assert_eq!(is_blocked("Just a moment...", "https://x.test", ""), Some("cloudflare"));
    }

    #[test]
    fn is_blocked_detects_captcha_in_body() {
        assert_eq!(
            is_blocked("Example", "https://x.test", "Please verify you are human"),
            Some("captcha")
        );
    }

    #[test]
    fn is_blocked_returns_none_for_normal_page() {
        assert_eq!(is_blocked("Example Domain", "https://example.com", "hello world"), None);
    }
}
