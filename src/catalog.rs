//! Remote page listing downloadable checkpoints and configs.
//!
//! The page is fetched once per request and flattened into text lines with
//! selectable links. Failures are rendered as an inline error page.

use anyhow::{Context, Result};
use std::time::Duration;

pub const MODELS_URL: &str = "https://bascurtiz.x10.mx/models-checkpoint-config-urls.html";

pub fn build_client(user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("build http client")
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .error_for_status()?;
    resp.text().await.context("read response body")
}

/// HTML shown in place of the page when fetching fails.
pub fn error_page(err: &str) -> String {
    format!(
        "<html><body><p>An error occurred while fetching the content: {err}</p></body></html>"
    )
}

/// Fetch the page, substituting an error page on any failure. No retry.
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> String {
    match fetch(client, url).await {
        Ok(html) => html,
        Err(e) => {
            log::warn!("models page fetch failed: {e:#}");
            error_page(&format!("{e:#}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSpan {
    Text(String),
    /// Index into [`RenderedPage::links`].
    Link(usize),
}

pub type PageLine = Vec<PageSpan>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub lines: Vec<PageLine>,
    pub links: Vec<Link>,
}

impl RenderedPage {
    /// Line index holding link `idx`, for scrolling the selection into view.
    pub fn line_of_link(&self, idx: usize) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.iter().any(|s| *s == PageSpan::Link(idx)))
    }

    pub fn plain_line(&self, line: &PageLine) -> String {
        line.iter()
            .map(|s| match s {
                PageSpan::Text(t) => t.as_str(),
                PageSpan::Link(i) => self.links[*i].text.as_str(),
            })
            .collect()
    }
}

const SKIPPED: [&str; 4] = ["head", "title", "script", "style"];
const PARAGRAPHS: [&str; 14] = [
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "table", "ul", "ol", "hr", "pre", "blockquote", "dl",
];
const BREAKS: [&str; 7] = ["br", "li", "tr", "div", "dt", "dd", "section"];
const CELLS: [&str; 2] = ["td", "th"];

struct OpenLink {
    href: String,
    text: String,
}

#[derive(Default)]
struct Builder {
    page: RenderedPage,
    current: PageLine,
    link: Option<OpenLink>,
    pending_space: bool,
    skip_depth: usize,
}

impl Builder {
    fn line_has_content(&self) -> bool {
        !self.current.is_empty() || self.link.as_ref().is_some_and(|l| !l.text.is_empty())
    }

    fn push_char(&mut self, ch: char) {
        if let Some(link) = self.link.as_mut() {
            link.text.push(ch);
            return;
        }
        match self.current.last_mut() {
            Some(PageSpan::Text(t)) => t.push(ch),
            _ => self.current.push(PageSpan::Text(ch.to_string())),
        }
    }

    fn text(&mut self, raw: &str) {
        if self.skip_depth > 0 {
            return;
        }
        for ch in decode_entities(raw).chars() {
            // &nbsp; decodes to U+00A0, which is kept as a hard space.
            if ch.is_whitespace() && ch != '\u{a0}' {
                self.pending_space = true;
                continue;
            }
            let link_empty = self.link.as_ref().is_some_and(|l| l.text.is_empty());
            if self.pending_space && self.line_has_content() && !link_empty {
                self.push_char(' ');
            }
            self.pending_space = false;
            self.push_char(if ch == '\u{a0}' { ' ' } else { ch });
        }
    }

    fn break_line(&mut self, blank: bool) {
        self.pending_space = false;
        if !self.current.is_empty() {
            let line = std::mem::take(&mut self.current);
            self.page.lines.push(line);
        }
        if blank && self.page.lines.last().is_some_and(|l| !l.is_empty()) {
            self.page.lines.push(Vec::new());
        }
    }

    fn open_link(&mut self, href: String) {
        self.close_link();
        if self.pending_space && self.line_has_content() {
            self.push_char(' ');
        }
        self.pending_space = false;
        self.link = Some(OpenLink {
            href,
            text: String::new(),
        });
    }

    fn close_link(&mut self) {
        if let Some(OpenLink { href, text }) = self.link.take() {
            let text = if text.is_empty() { href.clone() } else { text };
            self.page.links.push(Link { text, href });
            self.current.push(PageSpan::Link(self.page.links.len() - 1));
        }
    }

    fn tag(&mut self, raw: &str) {
        let closing = raw.starts_with('/');
        let body = raw.trim_start_matches('/');
        let name: String = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let name = name.as_str();

        if SKIPPED.contains(&name) {
            if closing {
                self.skip_depth = self.skip_depth.saturating_sub(1);
            } else if !body.ends_with('/') {
                self.skip_depth += 1;
            }
            return;
        }
        if self.skip_depth > 0 {
            return;
        }

        match name {
            "a" if closing => self.close_link(),
            "a" => match attr(body, "href") {
                Some(href) => self.open_link(href),
                None => self.close_link(),
            },
            n if PARAGRAPHS.contains(&n) => {
                self.close_link();
                self.break_line(true);
            }
            n if BREAKS.contains(&n) => {
                self.close_link();
                self.break_line(false);
            }
            n if CELLS.contains(&n) => self.pending_space = true,
            _ => {}
        }
    }

    fn finish(mut self) -> RenderedPage {
        self.close_link();
        self.break_line(false);
        while self.page.lines.last().is_some_and(|l| l.is_empty()) {
            self.page.lines.pop();
        }
        self.page
    }
}

/// Value of attribute `name` inside a tag body such as `a href="x" class=y`.
fn attr(tag_body: &str, name: &str) -> Option<String> {
    let lower = tag_body.to_ascii_lowercase();
    let bytes = tag_body.as_bytes();
    let mut from = 0;
    while let Some(found) = lower[from..].find(name) {
        let start = from + found;
        from = start + name.len();
        if start == 0 || !bytes[start - 1].is_ascii_whitespace() {
            continue;
        }
        let rest = tag_body[from..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => rest[1..].split(q).next().unwrap_or(""),
            _ => rest
                .split(|c: char| c.is_whitespace() || c == '>')
                .next()
                .unwrap_or(""),
        };
        return Some(decode_entities(value));
    }
    None
}

/// Decode the named entities common in plain pages plus numeric references.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Flatten an HTML document into lines of text and links.
pub fn render(html: &str) -> RenderedPage {
    let mut b = Builder::default();
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        b.text(&rest[..lt]);
        rest = &rest[lt..];

        if let Some(after) = rest.strip_prefix("<!--") {
            rest = match after.find("-->") {
                Some(end) => &after[end + 3..],
                None => "",
            };
            continue;
        }

        let is_tag = rest[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        if !is_tag {
            b.text("<");
            rest = &rest[1..];
            continue;
        }

        match rest.find('>') {
            Some(gt) => {
                let inner = &rest[1..gt];
                if !inner.starts_with('!') {
                    b.tag(inner);
                }
                rest = &rest[gt + 1..];
            }
            None => {
                rest = "";
            }
        }
    }
    b.text(rest);
    b.finish()
}
