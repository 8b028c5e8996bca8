//! Discovery of the latest published dataset
//!
//! The provider announces its monthly file on a download page. Two link
//! strategies are tried in order against that page:
//!
//! 1. [`ExpectedLinkStrategy`]: build the URL the provider uses for the
//!    current month and look for an anchor pointing at exactly that URL.
//! 2. [`PatternLinkStrategy`]: scan the raw page for the first URL matching
//!    the historical file template and take the month from the file name.
//!
//! Either strategy can be replaced through [`SourceLocator::with_strategies`]
//! if the provider changes its markup.

use chrono::{NaiveDate, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::http::HttpClient;
use crate::models::DatasetVersion;

/// File name stem of the free city-level dataset
pub const FILE_PREFIX: &str = "dbip-city-lite-";

/// Extension of the published files
pub const FILE_SUFFIX: &str = ".csv.gz";

/// Where the latest dataset can be downloaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedSource {
    pub url: String,
    pub filename: String,
    pub version: DatasetVersion,
}

/// File name the provider uses for a given release
pub fn expected_filename(version: DatasetVersion) -> String {
    format!("{FILE_PREFIX}{version}{FILE_SUFFIX}")
}

/// One way of finding the dataset link in the download page
pub trait LinkStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Look for a link in `page`; `Ok(None)` means this strategy found nothing
    fn find_link(&self, page: &str, today: NaiveDate) -> Result<Option<LocatedSource>>;
}

/// Fast path: the provider published this month's file on schedule
#[derive(Debug, Clone)]
pub struct ExpectedLinkStrategy {
    base_url: String,
}

impl ExpectedLinkStrategy {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn expected_url(&self, version: DatasetVersion) -> String {
        format!("{}/{}", self.base_url, expected_filename(version))
    }
}

impl LinkStrategy for ExpectedLinkStrategy {
    fn name(&self) -> &'static str {
        "expected"
    }

    fn find_link(&self, page: &str, today: NaiveDate) -> Result<Option<LocatedSource>> {
        let version = DatasetVersion::from_date(today);
        let expected = self.expected_url(version);

        let document = Html::parse_document(page);
        let anchors = Selector::parse("a[href]")
            .map_err(|e| IngestError::Config(format!("invalid anchor selector: {e}")))?;

        let found = document
            .select(&anchors)
            .filter_map(|element| element.value().attr("href"))
            .any(|href| href.trim() == expected);

        Ok(found.then(|| LocatedSource {
            url: expected,
            filename: expected_filename(version),
            version,
        }))
    }
}

/// Fallback: first link on the page that follows the provider's URL template
#[derive(Debug, Clone)]
pub struct PatternLinkStrategy {
    pattern: Regex,
}

impl PatternLinkStrategy {
    /// Match `{base_url}/dbip-city-lite-YYYY-MM.csv.gz` for years 2000-2099
    pub fn new(base_url: &str) -> Result<Self> {
        let base = regex::escape(base_url.trim_end_matches('/'));
        let pattern = Regex::new(&format!(
            r"{base}/({prefix}(20\d{{2}}-(?:0[1-9]|1[0-2])){suffix})",
            prefix = regex::escape(FILE_PREFIX),
            suffix = regex::escape(FILE_SUFFIX),
        ))?;

        Ok(Self { pattern })
    }

    pub fn from_regex(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl LinkStrategy for PatternLinkStrategy {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn find_link(&self, page: &str, _today: NaiveDate) -> Result<Option<LocatedSource>> {
        let Some(captures) = self.pattern.captures(page) else {
            return Ok(None);
        };

        let (Some(url), Some(filename), Some(month)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            return Err(IngestError::Config(
                "link pattern must capture the file name and its YYYY-MM component".to_string(),
            ));
        };

        Ok(Some(LocatedSource {
            url: url.as_str().to_string(),
            filename: filename.as_str().to_string(),
            version: month.as_str().parse()?,
        }))
    }
}

/// Finds the URL and version of the latest published dataset
pub struct SourceLocator {
    client: HttpClient,
    page_url: String,
    fast_path: Box<dyn LinkStrategy>,
    fallback: Box<dyn LinkStrategy>,
}

impl SourceLocator {
    /// Locator with the default expected-link / pattern pair
    pub fn new(client: HttpClient, page_url: impl Into<String>, base_url: &str) -> Result<Self> {
        Ok(Self::with_strategies(
            client,
            page_url,
            Box::new(ExpectedLinkStrategy::new(base_url)),
            Box::new(PatternLinkStrategy::new(base_url)?),
        ))
    }

    pub fn with_strategies(
        client: HttpClient,
        page_url: impl Into<String>,
        fast_path: Box<dyn LinkStrategy>,
        fallback: Box<dyn LinkStrategy>,
    ) -> Self {
        Self {
            client,
            page_url: page_url.into(),
            fast_path,
            fallback,
        }
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    /// Locate the latest dataset relative to today's date (UTC)
    pub async fn locate_latest(&self) -> Result<LocatedSource> {
        self.locate_latest_at(Utc::now().date_naive()).await
    }

    /// Fetch the download page once and resolve the dataset link in it
    pub async fn locate_latest_at(&self, today: NaiveDate) -> Result<LocatedSource> {
        info!(page = %self.page_url, "Fetching download page");
        let page = self.client.get_text(&self.page_url).await?;
        self.resolve(&page, today)
    }

    /// Apply the fast path, then the fallback, to an already fetched page
    pub fn resolve(&self, page: &str, today: NaiveDate) -> Result<LocatedSource> {
        for strategy in [&self.fast_path, &self.fallback] {
            if let Some(source) = strategy.find_link(page, today)? {
                info!(
                    strategy = strategy.name(),
                    url = %source.url,
                    version = %source.version,
                    "Found dataset link"
                );
                return Ok(source);
            }
            debug!(strategy = strategy.name(), "No dataset link matched");
        }

        Err(IngestError::SourceLocation {
            page_url: self.page_url.clone(),
        })
    }
}
