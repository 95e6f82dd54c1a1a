//! Links from the portal's known content and menu regions.

use crate::normalize::{anchor_text, navigable_href};
use crate::StaticFetcher;
use html_scraper::{Html, Selector};
use ifinder_core::{Config, Error, FetchBackend, LinkEntry, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main content column, side menu, and the strip above the content.
pub const NAVIGATION_REGIONS: [&str; 3] = [
    "#portal-column-content",
    "#portal-column-one",
    "#viewlet-above-content",
];
pub const MAX_NAVIGATION_LINKS: usize = 50;
/// Link texts this short ("ir", "›", "+") are chrome, not navigation.
const MIN_LINK_TEXT_CHARS: usize = 4;

/// Links found in the navigation regions of `html`, or `None` when no region exists.
///
/// Links are deduplicated on (text, target) in first-seen order and capped.
pub fn navigation_links(html: &str, page_url: &str) -> Option<Vec<LinkEntry>> {
    let doc = Html::parse_document(html);
    let base = url::Url::parse(page_url).ok();
    let anchors = Selector::parse("a[href]").ok()?;

    let mut any_region = false;
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for region in NAVIGATION_REGIONS {
        let Ok(sel) = Selector::parse(region) else {
            continue;
        };
        for el in doc.select(&sel) {
            any_region = true;
            for a in el.select(&anchors) {
                let Some(text) = anchor_text(&a) else {
                    continue;
                };
                if text.chars().count() < MIN_LINK_TEXT_CHARS {
                    continue;
                }
                let Some(target) = a
                    .value()
                    .attr("href")
                    .and_then(|h| navigable_href(base.as_ref(), h))
                else {
                    continue;
                };
                if !seen.insert((text.clone(), target.clone())) {
                    continue;
                }
                out.push(LinkEntry {
                    display_text: Some(text),
                    target,
                });
                if out.len() >= MAX_NAVIGATION_LINKS {
                    return Some(out);
                }
            }
        }
    }
    any_region.then_some(out)
}

/// One `[text](href)` per line.
pub fn links_to_markdown(links: &[LinkEntry]) -> String {
    links
        .iter()
        .map(LinkEntry::to_markdown)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone)]
pub struct NavigationExtractor {
    pages: StaticFetcher,
}

impl NavigationExtractor {
    pub fn new(config: Arc<Config>, backend: Arc<dyn FetchBackend>) -> Self {
        Self {
            pages: StaticFetcher::new(config, backend),
        }
    }

    pub async fn extract(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<LinkEntry>> {
        let (final_url, html) = self.pages.get_html(reference, cancel).await?;
        let links = navigation_links(&html, &final_url).ok_or_else(|| {
            Error::layout_mismatch(
                reference,
                NAVIGATION_REGIONS.join(", "),
                "A página não possui as regiões de navegação esperadas.",
            )
        })?;
        if links.is_empty() {
            return Err(Error::NoResults {
                term: reference.to_string(),
                message: "Nenhum link de navegação encontrado.".to_string(),
            });
        }
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_for, serve};
    use crate::HttpFetcher;
    use axum::{response::Html as Page, routing::get, Router};
    use ifinder_core::ErrorKind;

    #[test]
    fn links_come_from_regions_only_deduplicated_in_order() {
        let html = r#"
            <div id="portal-header"><a href="/fora">Fora da região</a></div>
            <div id="portal-column-one">
              <a href="/barbacena/cursos">Cursos</a>
              <a href="/barbacena/cursos#lista">Cursos</a>
              <a href="/x">ir</a>
              <a href="javascript:void(0)">Abrir menu</a>
            </div>
            <div id="portal-column-content">
              <a href="/barbacena/editais">Editais e processos</a>
              <a href="/barbacena/cursos">Cursos</a>
            </div>"#;
        let links = navigation_links(html, "https://x.test/barbacena").unwrap();
        let got: Vec<_> = links
            .iter()
            .map(|l| (l.display_text.as_deref().unwrap(), l.target.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Editais e processos", "https://x.test/barbacena/editais"),
                ("Cursos", "https://x.test/barbacena/cursos"),
            ]
        );
    }

    #[test]
    fn link_count_is_capped() {
        let anchors: String = (0..80)
            .map(|i| format!("<a href='/p{i}'>Página {i}</a>"))
            .collect();
        let html = format!("<div id='portal-column-content'>{anchors}</div>");
        let links = navigation_links(&html, "https://x.test/").unwrap();
        assert_eq!(links.len(), MAX_NAVIGATION_LINKS);
        assert_eq!(links[0].target, "https://x.test/p0");
    }

    #[test]
    fn missing_regions_are_distinguished_from_no_links() {
        let html = "<div id='main'><a href='/a'>Alguma</a></div>";
        assert!(navigation_links(html, "https://x.test/").is_none());
        assert_eq!(
            navigation_links("<div id='viewlet-above-content'></div>", "https://x.test/"),
            Some(Vec::new())
        );
    }

    #[test]
    fn markdown_listing_has_one_link_per_line() {
        let md = links_to_markdown(&[
            LinkEntry {
                display_text: Some("Cursos".to_string()),
                target: "https://x.test/cursos".to_string(),
            },
            LinkEntry {
                display_text: Some("Editais".to_string()),
                target: "https://x.test/editais".to_string(),
            },
        ]);
        assert_eq!(md, "[Cursos](https://x.test/cursos)\n[Editais](https://x.test/editais)");
    }

    #[tokio::test]
    async fn redesigned_page_is_a_layout_mismatch() {
        let app = Router::new().route(
            "/barbacena",
            get(|| async { Page("<main><nav><a href='/a'>Início do portal</a></nav></main>") }),
        );
        let addr = serve(app).await;
        let config = config_for(addr);
        let backend = Arc::new(HttpFetcher::new(&config).unwrap());
        let err = NavigationExtractor::new(Arc::new(config), backend)
            .extract("/barbacena", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LayoutMismatch);
    }
}
