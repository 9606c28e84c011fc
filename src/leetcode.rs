use anyhow::{anyhow, Context, Result};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::json;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LeetCodeConfig;
use crate::models::{Post, PostPage};

const GRAPHQL_URL: &str = "https://leetcode.com/graphql/";
const POST_URL_BASE: &str = "https://leetcode.com/discuss/post";
const REFERER: &str =
    "https://leetcode.com/discuss/interview-experience?currentPage=1&orderBy=hot&query=";

/// CSS path of the post body container on the detail page. Breaks when the
/// site restyles; the fetcher then degrades to summary text.
const CONTENT_REGION_SELECTOR: &str =
    "div.relative.mt-4.flex.w-full.flex-none.flex-col.overflow-auto.px-4.pb-8.gap-4";

const DISCUSSION_QUERY: &str = r#"
query discussPostItems($orderBy: ArticleOrderByEnum, $keywords: [String]!, $tagSlugs: [String!], $skip: Int, $first: Int) {
    ugcArticleDiscussionArticles(
        orderBy: $orderBy
        keywords: $keywords
        tagSlugs: $tagSlugs
        skip: $skip
        first: $first
    ) {
        pageInfo {
            hasNextPage
        }
        edges {
            node {
                uuid
                title
                slug
                summary
                topicId
            }
        }
    }
}
"#;

/// One named retrieval profile: a browser fingerprint the detail-page fetch
/// can present. Tried in order; see `AttemptOutcome` for the advance rule.
struct FetchProfile {
    name: &'static str,
    user_agent: &'static str,
}

const FETCH_PROFILES: &[FetchProfile] = &[
    FetchProfile {
        name: "chrome",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    },
    FetchProfile {
        name: "firefox",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    },
    FetchProfile {
        name: "safari",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.1 Safari/605.1.15",
    },
    FetchProfile {
        name: "opera",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 OPR/106.0.0.0",
    },
];

/// Classification of one profile attempt. Access-denied advances to the
/// next profile; everything else ends the chain.
enum AttemptOutcome {
    Success(String),
    NextProfile,
    Terminal,
}

/// Paged access to the discussion source. The pipeline drives this trait so
/// sweeps can run against a stub in tests.
pub trait PostSource {
    fn fetch_page(&self, limit: usize, skip: usize) -> Result<PostPage>;
    /// Full text of a post's detail page; empty on any failure (the caller
    /// falls back to the summary).
    fn fetch_post_content(&self, topic_id: i64) -> String;
}

pub struct LeetCodeClient {
    client: reqwest::blocking::Client,
    politeness_delay: Duration,
}

impl LeetCodeClient {
    pub fn new(config: &LeetCodeConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            politeness_delay: Duration::from_secs(config.politeness_delay_secs),
        })
    }

    pub fn post_url(topic_id: i64) -> String {
        format!("{}/{}/", POST_URL_BASE, topic_id)
    }

    /// Detail-page fetch for an arbitrary URL, same profile chain as
    /// `fetch_post_content`. Used by the one-off scrape command.
    pub fn fetch_url_content(&self, url: &str) -> String {
        for profile in FETCH_PROFILES {
            thread::sleep(self.politeness_delay);

            match self.attempt_fetch(url, profile) {
                AttemptOutcome::Success(text) => return text,
                AttemptOutcome::NextProfile => {
                    warn!(profile = profile.name, url, "access denied, trying next profile");
                }
                AttemptOutcome::Terminal => return String::new(),
            }
        }
        warn!(url, "all retrieval profiles exhausted");
        String::new()
    }

    fn attempt_fetch(&self, url: &str, profile: &FetchProfile) -> AttemptOutcome {
        let response = self
            .client
            .get(url)
            .header("User-Agent", profile.user_agent)
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Referer", REFERER)
            .send();

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(profile = profile.name, url, "detail fetch failed: {e}");
                return AttemptOutcome::Terminal;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return AttemptOutcome::NextProfile;
        }
        if !status.is_success() {
            warn!(profile = profile.name, url, %status, "detail fetch rejected");
            return AttemptOutcome::Terminal;
        }

        let body = match response.text() {
            Ok(b) => b,
            Err(e) => {
                warn!(url, "failed to read detail page body: {e}");
                return AttemptOutcome::Terminal;
            }
        };

        match extract_post_text(&body) {
            Some(text) => AttemptOutcome::Success(text),
            None => {
                warn!(url, "content region not found on detail page");
                AttemptOutcome::Success(String::new())
            }
        }
    }
}

impl PostSource for LeetCodeClient {
    fn fetch_page(&self, limit: usize, skip: usize) -> Result<PostPage> {
        let payload = json!({
            "query": DISCUSSION_QUERY,
            "variables": {
                "orderBy": "HOT",
                "keywords": [""],
                "tagSlugs": ["interview"],
                "skip": skip,
                "first": limit,
            },
            "operationName": "discussPostItems",
        });

        let response = self
            .client
            .post(GRAPHQL_URL)
            .header("Content-Type", "application/json")
            .header("User-Agent", FETCH_PROFILES[0].user_agent)
            .json(&payload)
            .send()
            .context("Failed to send discussion query")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Discussion query failed with status {}",
                response.status()
            ));
        }

        let body: GraphqlResponse = response
            .json()
            .context("Failed to parse discussion query response")?;

        let articles = body
            .data
            .and_then(|d| d.articles)
            .ok_or_else(|| anyhow!("Discussion query response missing article data"))?;

        debug!(posts = articles.edges.len(), "fetched discussion page");
        Ok(PostPage {
            posts: articles.edges.into_iter().map(|e| e.node).collect(),
            has_next_page: articles.page_info.has_next_page,
        })
    }

    fn fetch_post_content(&self, topic_id: i64) -> String {
        self.fetch_url_content(&Self::post_url(topic_id))
    }
}

/// Plain text of the primary content region: text nodes trimmed and
/// newline-joined. None when the region is absent.
pub fn extract_post_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(CONTENT_REGION_SELECTOR).ok()?;
    let region = document.select(&selector).next()?;

    let text = region
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Some(text)
}

// --- GraphQL response envelope ---

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<ArticlesData>,
}

#[derive(Deserialize)]
struct ArticlesData {
    #[serde(rename = "ugcArticleDiscussionArticles")]
    articles: Option<Articles>,
}

#[derive(Deserialize)]
struct Articles {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
}

#[derive(Deserialize)]
struct Edge {
    node: Post,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_url() {
        assert_eq!(
            LeetCodeClient::post_url(7460178),
            "https://leetcode.com/discuss/post/7460178/"
        );
    }

    #[test]
    fn test_extract_post_text_from_content_region() {
        let html = r#"
            <html><body>
            <div class="relative mt-4 flex w-full flex-none flex-col overflow-auto px-4 pb-8 gap-4">
                <p>Round 1: <b>coding</b></p>
                <p>  Round 2: system design  </p>
            </div>
            </body></html>
        "#;
        let text = extract_post_text(html).unwrap();
        assert_eq!(text, "Round 1:\ncoding\nRound 2: system design");
    }

    #[test]
    fn test_extract_post_text_missing_region() {
        let html = "<html><body><div class='other'>nope</div></body></html>";
        assert!(extract_post_text(html).is_none());
    }

    #[test]
    fn test_page_envelope_deserializes() {
        let raw = r#"{
            "data": {
                "ugcArticleDiscussionArticles": {
                    "pageInfo": { "hasNextPage": true },
                    "edges": [
                        {
                            "node": {
                                "uuid": "u1",
                                "title": "Acme interview",
                                "slug": "acme-interview",
                                "summary": "short",
                                "topicId": 42
                            }
                        }
                    ]
                }
            }
        }"#;
        let parsed: GraphqlResponse = serde_json::from_str(raw).unwrap();
        let articles = parsed.data.unwrap().articles.unwrap();
        assert!(articles.page_info.has_next_page);
        assert_eq!(articles.edges.len(), 1);
        assert_eq!(articles.edges[0].node.id, "u1");
    }
}
