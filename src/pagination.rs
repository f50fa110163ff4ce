//! Cursor pagination over the board service's paged collections.
//!
//! Each response carries a bounded window of `items` and, when more data
//! exists, a continuation link. The link normally arrives in an RFC 8288
//! `Link` header; a `links.next` body field is accepted as well. Relative
//! links resolve against the URL of the response that carried them.

use reqwest::header::LINK;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{BoardError, Result};
use crate::http::ServiceClient;

/// Continuation links of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageLinks {
    /// Link to the next window, absent on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Deserialize)]
struct PageBody<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    links: PageLinks,
}

/// One window of a paged collection.
///
/// `next()` borrows the page, so it can be called again to re-fetch the same
/// following window; fetching the first page again restarts the sequence.
#[derive(Debug)]
pub struct Page<T> {
    /// Items in this window, in server order.
    pub items: Vec<T>,
    /// Continuation links.
    pub links: PageLinks,
    url: Url,
    client: ServiceClient,
}

impl<T: DeserializeOwned> Page<T> {
    pub(crate) async fn fetch(client: &ServiceClient, url: Url) -> Result<Self> {
        debug!("GET {} (page)", url);
        let response = client
            .send(client.request(Method::GET, url))
            .await?;

        let header_next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_next_link);
        let url = response.url().clone();

        let body: PageBody<T> = response.json().await?;

        Ok(Self {
            items: body.items,
            links: PageLinks {
                next: header_next.or(body.links.next),
            },
            url,
            client: client.clone(),
        })
    }

    /// URL this window was served from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the response carried a continuation link.
    pub fn has_next(&self) -> bool {
        self.links.next.is_some()
    }

    /// Fetch the following window.
    ///
    /// Returns `BoardError::Exhausted` on the last page.
    pub async fn next(&self) -> Result<Page<T>> {
        let Some(link) = self.links.next.as_deref() else {
            return Err(BoardError::Exhausted);
        };
        let url = self.url.join(link)?;
        Page::fetch(&self.client, url).await
    }

    /// Follow every continuation link and concatenate items in page order.
    pub async fn collect_all(self) -> Result<Vec<T>> {
        let Page {
            mut items,
            mut links,
            mut url,
            client,
        } = self;

        let mut pages = 1usize;
        while let Some(link) = links.next.take() {
            let page = Page::<T>::fetch(&client, url.join(&link)?).await?;
            items.extend(page.items);
            links = page.links;
            url = page.url;
            pages += 1;
        }

        debug!("collected {} items across {} pages", items.len(), pages);
        Ok(items)
    }
}

impl<T> Page<T> {
    /// Number of items in this window.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this window is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the page, keeping only its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Extract the `rel="next"` target from a `Link` header value.
pub fn parse_next_link(header: &str) -> Option<String> {
    link_values(header).into_iter().find_map(|entry| {
        let (target, params) = entry.trim().strip_prefix('<')?.split_once('>')?;

        let is_next = params.split(';').any(|param| {
            let Some((key, value)) = param.split_once('=') else {
                return false;
            };
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        });

        is_next.then(|| target.to_string())
    })
}

/// Split a `Link` header on the commas between link-values, skipping commas
/// inside `<...>` targets and quoted parameters.
fn link_values(header: &str) -> Vec<&str> {
    let mut values = Vec::new();
    let mut start = 0;
    let mut in_target = false;
    let mut in_quotes = false;
    for (i, c) in header.char_indices() {
        match c {
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            '"' if !in_target => in_quotes = !in_quotes,
            ',' if !in_target && !in_quotes => {
                values.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    values.push(&header[start..]);
    values
}
