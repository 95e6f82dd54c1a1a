//! The portal's own search view: query building and result-page parsing.

use crate::normalize::{anchor_text, navigable_href};
use crate::textprep::{contains_any, scrub};
use crate::StaticFetcher;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use html_scraper::{ElementRef, Html, Selector};
use ifinder_core::{
    clip_with_ellipsis, norm_ws, Config, DateRange, Error, FetchBackend, ItemType, Result,
    SearchFilter, SearchListing, SearchResultEntry, SortOrder,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entries kept from one result page.
pub const MAX_RESULTS: usize = 10;
/// Summary length (chars, ellipsis included).
pub const MAX_SUMMARY_CHARS: usize = 150;

const RESULT_CONTAINERS: [&str; 2] = ["#search-results", ".searchResults"];
const RESULT_COUNT: &str = "#search-results-number";

/// User words (scrubbed) accepted for each item type.
const ITEM_TYPE_KEYWORDS: &[(&str, ItemType)] = &[
    ("pagina", ItemType::Page),
    ("paginas", ItemType::Page),
    ("page", ItemType::Page),
    ("pages", ItemType::Page),
    ("documento", ItemType::Page),
    ("document", ItemType::Page),
    ("evento", ItemType::Event),
    ("eventos", ItemType::Event),
    ("event", ItemType::Event),
    ("events", ItemType::Event),
    ("arquivo", ItemType::File),
    ("arquivos", ItemType::File),
    ("file", ItemType::File),
    ("files", ItemType::File),
    ("noticia", ItemType::News),
    ("noticias", ItemType::News),
    ("news", ItemType::News),
    ("aviso", ItemType::Notice),
    ("avisos", ItemType::Notice),
    ("notice", ItemType::Notice),
    ("notices", ItemType::Notice),
    ("licitacao", ItemType::Bid),
    ("licitacoes", ItemType::Bid),
    ("edital", ItemType::Bid),
    ("editais", ItemType::Bid),
    ("bid", ItemType::Bid),
    ("bids", ItemType::Bid),
    ("oportunidade", ItemType::Opportunity),
    ("oportunidades", ItemType::Opportunity),
    ("opportunity", ItemType::Opportunity),
    ("opportunities", ItemType::Opportunity),
    ("midia", ItemType::Media),
    ("midias", ItemType::Media),
    ("media", ItemType::Media),
    ("video", ItemType::Media),
    ("videos", ItemType::Media),
    ("imagem", ItemType::Image),
    ("imagens", ItemType::Image),
    ("image", ItemType::Image),
    ("images", ItemType::Image),
    ("link", ItemType::Link),
    ("links", ItemType::Link),
    ("pasta", ItemType::Folder),
    ("pastas", ItemType::Folder),
    ("folder", ItemType::Folder),
    ("folders", ItemType::Folder),
];

/// Content-type token the search backend understands.
pub fn item_type_token(t: ItemType) -> &'static str {
    match t {
        ItemType::Page => "Document",
        ItemType::Event => "Event",
        ItemType::File => "File",
        ItemType::News => "collective.nitf.content",
        ItemType::Notice => "aviso",
        ItemType::Bid => "licitacao",
        ItemType::Opportunity => "oportunidade",
        ItemType::Media => "sc.embedder",
        ItemType::Image => "Image",
        ItemType::Link => "Link",
        ItemType::Folder => "Folder",
    }
}

/// Case- and accent-insensitive item type lookup; unknown words are `None`.
pub fn parse_item_type(raw: &str) -> Option<ItemType> {
    let key = scrub(raw);
    ITEM_TYPE_KEYWORDS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, t)| *t)
}

/// "ontem"/"yesterday", "semana"/"week", "mes"/"month"; anything else is no filter.
pub fn parse_date_range(raw: &str) -> DateRange {
    if contains_any(raw, &["ontem", "yesterday", "24h"]) {
        DateRange::Yesterday
    } else if contains_any(raw, &["semana", "week"]) {
        DateRange::LastWeek
    } else if contains_any(raw, &["mes", "month"]) {
        DateRange::LastMonth
    } else {
        DateRange::None
    }
}

/// Substring match on the sort wording; unknown values fall back to relevance.
pub fn parse_sort(raw: &str) -> SortOrder {
    if contains_any(raw, &["relev"]) {
        SortOrder::Relevance
    } else if contains_any(raw, &["data", "date", "recent", "novo", "newest", "ultim", "latest"]) {
        SortOrder::Date
    } else if contains_any(raw, &["alfab", "alpha", "titul", "title", "nome", "name"]) {
        SortOrder::Alphabetical
    } else {
        SortOrder::Relevance
    }
}

/// Build a filter from loosely worded inputs, silently dropping unknown item types.
pub fn filter_from_words(
    term: &str,
    item_types: &[String],
    date_range: Option<&str>,
    sort: Option<&str>,
) -> SearchFilter {
    SearchFilter {
        term: term.to_string(),
        item_types: item_types.iter().filter_map(|t| parse_item_type(t)).collect(),
        date_range: date_range.map(parse_date_range).unwrap_or_default(),
        sort: sort.map(parse_sort).unwrap_or_default(),
    }
}

/// Cutoff instant for a date range: `now` minus the range's fixed day offset.
pub fn date_cutoff(range: DateRange, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    range.days_back().map(|d| now - ChronoDuration::days(d))
}

pub fn simple_params(term: &str) -> Vec<(String, String)> {
    vec![("SearchableText".to_string(), term.to_string())]
}

/// Query parameters for a filtered search. `now` is injected so the cutoff is testable.
pub fn filtered_params(filter: &SearchFilter, now: DateTime<Utc>) -> Vec<(String, String)> {
    let mut params = simple_params(&filter.term);
    for t in &filter.item_types {
        params.push(("portal_type:list".to_string(), item_type_token(*t).to_string()));
    }
    if let Some(cutoff) = date_cutoff(filter.date_range, now) {
        params.push((
            "created.query:record:list:date".to_string(),
            cutoff.format("%Y-%m-%dT%H:%M:%S").to_string(),
        ));
        params.push(("created.range:record".to_string(), "min".to_string()));
    }
    match filter.sort {
        SortOrder::Relevance => {}
        SortOrder::Date => {
            params.push(("sort_on".to_string(), "Date".to_string()));
            params.push(("sort_order".to_string(), "reverse".to_string()));
        }
        SortOrder::Alphabetical => {
            params.push(("sort_on".to_string(), "sortable_title".to_string()));
        }
    }
    params
}

/// `search_url` with `params` appended as an encoded query.
pub fn search_request_url(search_url: &str, params: &[(String, String)]) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        ser.append_pair(k, v);
    }
    let sep = if search_url.contains('?') { '&' } else { '?' };
    format!("{search_url}{sep}{}", ser.finish())
}

fn select_first<'a>(scope: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        scope.select(&sel).next()
    })
}

fn parse_count(text: &str) -> Option<usize> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Top-level entries only: lists nested inside a result (tags, keywords) and the batch
/// navigation bar are not results.
fn is_result_item(item: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    for node in item.ancestors() {
        if node.id() == container.id() {
            return true;
        }
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        let v = el.value();
        if matches!(v.name(), "li" | "dt" | "dd" | "article" | "nav") {
            return false;
        }
        if v.classes().any(|c| matches!(c, "listingBar" | "pagination")) {
            return false;
        }
    }
    true
}

/// Where an entry's summary may live: the item itself, then, for a `dt`, its `dd`.
fn summary_scope(item: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut scopes = vec![item];
    if item.value().name() == "dt" {
        let dd = item
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|e| e.value().name() == "dd");
        scopes.extend(dd);
    }
    scopes
}

/// Parse a result page.
///
/// A page without a result container is treated like an empty result set.
pub fn parse_results(html: &str, term: &str, page_url: &str) -> Result<SearchListing> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let base = url::Url::parse(page_url).ok();

    let Some(container) = select_first(root, &RESULT_CONTAINERS) else {
        return Err(Error::no_results(term));
    };
    let Ok(item_sel) = Selector::parse("li, dt, article") else {
        return Err(Error::no_results(term));
    };

    let mut found = 0usize;
    let mut entries = Vec::new();
    for item in container
        .select(&item_sel)
        .filter(|item| is_result_item(*item, container))
    {
        let Some(anchor) = select_first(item, &[".result-title a[href]", "a[href]"]) else {
            continue;
        };
        let Some(url) = anchor
            .value()
            .attr("href")
            .and_then(|h| navigable_href(base.as_ref(), h))
        else {
            continue;
        };
        found += 1;
        if entries.len() >= MAX_RESULTS {
            continue;
        }
        let title = anchor_text(&anchor).unwrap_or_else(|| url.clone());
        let summary = summary_scope(item)
            .into_iter()
            .find_map(|scope| select_first(scope, &[".croppedDescription", ".description", "p"]))
            .map(|d| norm_ws(&d.text().collect::<Vec<_>>().join(" ")))
            .filter(|s| !s.is_empty())
            .map(|s| clip_with_ellipsis(&s, MAX_SUMMARY_CHARS));
        entries.push(SearchResultEntry {
            title,
            url,
            summary,
        });
    }

    if entries.is_empty() {
        return Err(Error::no_results(term));
    }
    let total = select_first(root, &[RESULT_COUNT])
        .and_then(|e| parse_count(&e.text().collect::<String>()))
        .unwrap_or(found);
    Ok(SearchListing {
        term: term.to_string(),
        total,
        entries,
    })
}

#[derive(Clone)]
pub struct SiteSearch {
    config: Arc<Config>,
    pages: StaticFetcher,
}

impl SiteSearch {
    pub fn new(config: Arc<Config>, backend: Arc<dyn FetchBackend>) -> Self {
        let pages = StaticFetcher::new(config.clone(), backend);
        Self { config, pages }
    }

    pub async fn search_simple(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchListing> {
        self.run(term, simple_params(term), cancel).await
    }

    pub async fn search_filtered(
        &self,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<SearchListing> {
        self.run(&filter.term, filtered_params(filter, Utc::now()), cancel)
            .await
    }

    async fn run(
        &self,
        term: &str,
        params: Vec<(String, String)>,
        cancel: &CancellationToken,
    ) -> Result<SearchListing> {
        let url = search_request_url(&self.config.search_url(), &params);
        let (final_url, html) = self.pages.get_html(&url, cancel).await?;
        parse_results(&html, term, &final_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config_for, serve};
    use crate::HttpFetcher;
    use axum::{extract::RawQuery, response::Html as Page, routing::get, Router};
    use chrono::TimeZone;
    use ifinder_core::{ErrorKind, NO_RESULTS_MESSAGE};
    use proptest::prelude::*;

    const RESULTS_PAGE: &str = r#"<html><body>
        <strong id="search-results-number">27</strong>
        <div id="search-results"><ol class="searchResults">
          <li><span class="result-title"><a href="/barbacena/editais/edital-01">Edital   01/2024</a></span>
              <span class="croppedDescription">Processo seletivo simplificado</span></li>
          <li><span class="result-title"><a href="https://x.test/barbacena/editais/edital-02#x">Edital 02/2024</a></span></li>
          <li>sem link</li>
        </ol></div></body></html>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 30, 0).unwrap()
    }

    #[test]
    fn results_are_parsed_in_backend_order_with_reported_total() {
        let page_url = "https://x.test/@@search?SearchableText=edital";
        let l = parse_results(RESULTS_PAGE, "edital", page_url).unwrap();
        assert_eq!(l.total, 27);
        assert_eq!(l.entries.len(), 2);
        assert_eq!(l.entries[0].title, "Edital 01/2024");
        assert_eq!(l.entries[0].url, "https://x.test/barbacena/editais/edital-01");
        assert_eq!(
            l.entries[0].summary.as_deref(),
            Some("Processo seletivo simplificado")
        );
        assert_eq!(l.entries[1].url, "https://x.test/barbacena/editais/edital-02");
        assert_eq!(l.entries[1].summary, None);
    }

    #[test]
    fn total_falls_back_to_counting_and_entries_cap_at_ten() {
        let items: String = (0..14)
            .map(|i| format!("<li><a href='/r{i}'>R{i}</a><p>{}</p></li>", "d".repeat(400)))
            .collect();
        let html = format!("<div class='searchResults'><ul>{items}</ul></div>");
        let l = parse_results(&html, "r", "https://x.test/@@search").unwrap();
        assert_eq!(l.entries.len(), MAX_RESULTS);
        assert_eq!(l.total, 14);
        let s = l.entries[0].summary.as_deref().unwrap();
        assert_eq!(s.chars().count(), MAX_SUMMARY_CHARS);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn definition_list_results_take_their_summary_from_the_following_dd() {
        let html = r#"<div id="search-results"><dl class="searchResults">
            <dt><a href="/barbacena/editais/edital-01">Edital 01</a></dt>
            <dd><span class="croppedDescription">Processo seletivo</span></dd>
            <dt><a href="/barbacena/editais/edital-02">Edital 02</a></dt>
            <dt><a href="/barbacena/editais/edital-03">Edital 03</a></dt>
            <dd><p>Resultado final</p></dd>
          </dl></div>"#;
        let l = parse_results(html, "edital", "https://x.test/@@search").unwrap();
        assert_eq!(l.entries.len(), 3);
        assert_eq!(l.entries[0].title, "Edital 01");
        assert_eq!(l.entries[0].summary.as_deref(), Some("Processo seletivo"));
        assert_eq!(l.entries[1].summary, None);
        assert_eq!(l.entries[2].summary.as_deref(), Some("Resultado final"));
    }

    #[test]
    fn nested_lists_and_batch_navigation_are_not_results() {
        let html = r#"<div id="search-results"><ol class="searchResults">
            <li><span class="result-title"><a href="/barbacena/editais/edital-01">Edital 01</a></span>
                <ul class="keywords"><li><a href="/tags/editais">editais</a></li></ul></li>
          </ol>
          <div class="listingBar"><ul><li><a href="/@@search?b_start:int=10">2</a></li></ul></div>
          </div>"#;
        let l = parse_results(html, "edital", "https://x.test/@@search").unwrap();
        assert_eq!(l.total, 1);
        assert_eq!(l.entries.len(), 1);
        assert_eq!(l.entries[0].url, "https://x.test/barbacena/editais/edital-01");
    }

    #[test]
    fn empty_or_missing_results_are_no_results_not_errors_of_transport() {
        let e =
            parse_results("<div id='search-results'></div>", "xyz", "https://x.test/").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NoResults);
        assert_eq!(e.to_string(), NO_RESULTS_MESSAGE);
        let e = parse_results("<p>outra coisa</p>", "xyz", "https://x.test/").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NoResults);
    }

    #[test]
    fn item_types_are_case_and_accent_insensitive() {
        assert_eq!(parse_item_type("Notícias"), Some(ItemType::News));
        assert_eq!(parse_item_type("LICITAÇÃO"), Some(ItemType::Bid));
        assert_eq!(parse_item_type("event"), Some(ItemType::Event));
        assert_eq!(parse_item_type("podcast"), None);
    }

    #[test]
    fn date_and_sort_words_are_permissive() {
        assert_eq!(parse_date_range("Última semana"), DateRange::LastWeek);
        assert_eq!(parse_date_range("último mês"), DateRange::LastMonth);
        assert_eq!(parse_date_range("ontem"), DateRange::Yesterday);
        assert_eq!(parse_date_range("sempre"), DateRange::None);
        assert_eq!(parse_sort("Mais recentes"), SortOrder::Date);
        assert_eq!(parse_sort("ordem alfabética"), SortOrder::Alphabetical);
        assert_eq!(parse_sort("relevância"), SortOrder::Relevance);
        assert_eq!(parse_sort("qualquer"), SortOrder::Relevance);
    }

    #[test]
    fn last_week_cutoff_is_exactly_seven_days_before_now() {
        let cutoff = date_cutoff(DateRange::LastWeek, now()).unwrap();
        assert_eq!(now() - cutoff, ChronoDuration::days(7));
        assert_eq!(date_cutoff(DateRange::None, now()), None);
    }

    #[test]
    fn filtered_params_carry_types_cutoff_and_sort() {
        let f = filter_from_words(
            "edital",
            &["notícias".to_string(), "licitações".to_string()],
            Some("semana"),
            Some("data"),
        );
        let p = filtered_params(&f, now());
        let has = |k: &str, v: &str| p.iter().any(|(a, b)| a == k && b == v);
        assert!(has("SearchableText", "edital"));
        assert!(has("portal_type:list", "collective.nitf.content"));
        assert!(has("portal_type:list", "licitacao"));
        assert!(has("created.query:record:list:date", "2024-05-08T12:30:00"));
        assert!(has("created.range:record", "min"));
        assert!(has("sort_on", "Date"));
    }

    #[test]
    fn relevance_sort_and_no_range_add_nothing() {
        let p = filtered_params(&SearchFilter::term("x"), now());
        assert_eq!(p, simple_params("x"));
    }

    #[test]
    fn request_url_encodes_params() {
        let u = search_request_url(
            "https://x.test/@@search",
            &[("SearchableText".to_string(), "matrícula 2024".to_string())],
        );
        assert_eq!(u, "https://x.test/@@search?SearchableText=matr%C3%ADcula+2024");
    }

    proptest! {
        #[test]
        fn unknown_item_types_are_dropped_silently(
            junk in proptest::collection::vec("[qwxz]{3,8}", 0..4)
        ) {
            let known = vec!["noticias".to_string(), "Eventos".to_string()];
            let mut mixed = known.clone();
            mixed.extend(junk);
            let a = filtered_params(&filter_from_words("t", &known, None, None), now());
            let b = filtered_params(&filter_from_words("t", &mixed, None, None), now());
            prop_assert_eq!(a, b);
        }
    }

    fn search(config: Config) -> SiteSearch {
        let backend = Arc::new(HttpFetcher::new(&config).unwrap());
        SiteSearch::new(Arc::new(config), backend)
    }

    #[tokio::test]
    async fn search_simple_hits_the_search_view() {
        let app = Router::new().route(
            "/@@search",
            get(|RawQuery(q): RawQuery| async move {
                if q.as_deref() == Some("SearchableText=edital") {
                    Page(RESULTS_PAGE.to_string())
                } else {
                    Page("<div id='search-results'></div>".to_string())
                }
            }),
        );
        let addr = serve(app).await;
        let l = search(config_for(addr))
            .search_simple("edital", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(l.total, 27);
        assert!(l.to_text().starts_with("Encontrados 27 resultados para 'edital':"));
        assert_eq!(l.entries[0].url, format!("http://{addr}/barbacena/editais/edital-01"));
    }

    #[tokio::test]
    async fn search_with_no_matches_is_no_results() {
        let app = Router::new().route(
            "/@@search",
            get(|| async { Page("<div id='search-results'><p>Nenhum item</p></div>") }),
        );
        let addr = serve(app).await;
        let err = search(config_for(addr))
            .search_filtered(&SearchFilter::term("zzz"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResults);
        assert_eq!(err.to_string(), NO_RESULTS_MESSAGE);
    }
}
