//! Sitemap service for sitemap.xml and robots.txt generation.

use url::Url;

/// Paths listed in the sitemap, in the order they are emitted.
const SITEMAP_PATHS: &[(&str, &str, &str)] = &[("/", "monthly", "1.0"), ("/dashboard", "weekly", "0.5")];

/// Service for generating sitemap.xml and robots.txt from the public site URL.
#[derive(Debug, Clone)]
pub struct SitemapService {
    public_url: Url,
}

impl SitemapService {
    pub fn new(public_url: Url) -> Self {
        Self { public_url }
    }

    /// Generate sitemap.xml content.
    pub fn sitemap_xml(&self) -> String {
        let base = normalize_public_site_url(self.public_url.as_str());

        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );
        for (path, changefreq, priority) in SITEMAP_PATHS {
            xml.push_str(&sitemap_entry(&base, path, changefreq, priority));
        }
        xml.push_str("</urlset>\n");
        xml
    }

    /// Generate robots.txt content.
    pub fn robots_txt(&self) -> String {
        let base = normalize_public_site_url(self.public_url.as_str());
        format!("User-agent: *\nAllow: /\n\nSitemap: {base}sitemap.xml\n")
    }
}

fn normalize_public_site_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    format!("{trimmed}/")
}

fn sitemap_entry(base: &str, path: &str, changefreq: &str, priority: &str) -> String {
    let loc = format!("{base}{}", path.trim_start_matches('/'));
    format!(
        "  <url><loc>{loc}</loc><changefreq>{changefreq}</changefreq><priority>{priority}</priority></url>\n"
    )
}
