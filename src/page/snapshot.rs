use super::{RawLink, RawRow, JAVASCRIPT_PLACEHOLDER, SUBTITLE_CLASS};
use crate::{
    config::PageConfig,
    diagnostic::Snapshot,
    error::{ConfigError, CrawlerError, ExtractionError, FetchError},
    RawPayload, SourceReader,
};
use lazy_static::lazy_static;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::path::PathBuf;
use tracing::info;

const E: &str = "Invalid selector";
lazy_static! {
    static ref TR: Selector = Selector::parse("tr").expect(E);
    static ref TD: Selector = Selector::parse("td").expect(E);
    static ref A: Selector = Selector::parse("a").expect(E);
    static ref BODY: Selector = Selector::parse("body").expect(E);
    static ref TITLE: Selector = Selector::parse("title").expect(E);
}

/// Offline strategy: runs the row projection over a saved copy of the
/// rendered page.
#[derive(Debug)]
pub struct SnapshotSource {
    path: PathBuf,
    config: PageConfig,
    markup: Option<String>,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>, config: PageConfig) -> SnapshotSource {
        SnapshotSource {
            path: path.into(),
            config,
            markup: None,
        }
    }
}

fn text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn is_subtitle(row: ElementRef) -> bool {
    row.value()
        .attr("class")
        .map_or(false, |c| c.split_whitespace().any(|c| c == SUBTITLE_CLASS))
}

/// Projects every process row of the first element matching `table`.
/// The header row and subtitle rows are skipped; relative reference links
/// are resolved against `base` when given.
pub fn extract_rows(doc: &Html, table: &Selector, base: Option<&Url>) -> Vec<RawRow> {
    let Some(table) = doc.select(table).next() else {
        return vec![];
    };

    table
        .select(&TR)
        .skip(1)
        .filter(|row| !is_subtitle(*row))
        .filter_map(|row| {
            let cells: Vec<_> = row.select(&TD).collect();
            if cells.is_empty() {
                return None;
            }
            let cell = |i: usize| cells.get(i).map(|c| text(*c)).unwrap_or_default();
            let references = cells
                .get(6)
                .map(|c| {
                    c.select(&A)
                        .map(|a| {
                            let href = a.value().attr("href").unwrap_or_default().trim();
                            let url = match base.and_then(|b| b.join(href).ok()) {
                                Some(url) => url.to_string(),
                                None => href.to_string(),
                            };
                            RawLink { name: text(a), url }
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(RawRow {
                material: cell(1),
                reactant_a: cell(2),
                reactant_b: cell(3),
                reactant_c: cell(4),
                further_reactants: cell(5),
                references,
            })
        })
        .collect()
}

fn page_title(doc: &Html) -> String {
    doc.select(&TITLE).next().map(text).unwrap_or_default()
}

/// Applies the same checks the live strategy makes, in the same order.
fn parse_rows(markup: &str, config: &PageConfig) -> Result<Vec<RawRow>, CrawlerError> {
    let table = Selector::parse(&config.table_selector)
        .map_err(|_| ConfigError::InvalidSelector(config.table_selector.clone()))?;
    let doc = Html::parse_document(markup);

    let body = doc.select(&BODY).next().map(text).unwrap_or_default();
    if body.contains(JAVASCRIPT_PLACEHOLDER) {
        return Err(FetchError::JavascriptRequired.into());
    }
    if doc.select(&table).next().is_none() {
        return Err(FetchError::MissingElement {
            selector: config.table_selector.clone(),
        }
        .into());
    }

    let base = Url::parse(&config.url).ok();
    let rows = extract_rows(&doc, &table, base.as_ref());
    if rows.is_empty() {
        return Err(ExtractionError::NoRows.into());
    }
    Ok(rows)
}

#[async_trait::async_trait]
impl SourceReader for SnapshotSource {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&mut self) -> Result<RawPayload, CrawlerError> {
        let markup = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::Io {
                path: self.path.clone(),
                source,
            })?;
        let parsed = parse_rows(&markup, &self.config);
        self.markup = Some(markup);
        let rows = parsed?;
        info!("Extracted {} raw rows", rows.len());
        Ok(RawPayload::Rendered(rows))
    }

    async fn snapshot(&mut self) -> Result<Option<Snapshot>, CrawlerError> {
        Ok(self.markup.as_ref().map(|markup| Snapshot {
            url: self.path.display().to_string(),
            title: page_title(&Html::parse_document(markup)),
            markup: markup.clone(),
            markup_extension: "html",
            screenshot: None,
        }))
    }
}
