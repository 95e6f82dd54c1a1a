//! HTML normalization: visible text and the anchor graph.

use html_scraper::{ElementRef, Html, Selector};
use ifinder_core::{norm_ws, LinkEntry};

/// Elements whose contents never reach the caller.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Clone)]
pub struct NormalizedPage {
    pub text: String,
    pub links: Vec<LinkEntry>,
}

/// Strip non-content elements, keep one line per non-empty text node, and collect every anchor.
pub fn normalize_html(html: &str, page_url: &str) -> NormalizedPage {
    let doc = Html::parse_document(html);
    let base = url::Url::parse(page_url).ok();
    NormalizedPage {
        text: visible_text(&doc),
        links: anchor_graph(&doc, base.as_ref()),
    }
}

/// Visible text nodes, trimmed and joined by newlines.
pub fn visible_text(doc: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();
    for node in doc.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            parts.push(defang_tag_literals(t));
        }
    }
    parts.join("\n")
}

/// Escaped `&lt;script` in page text decodes to a literal tag opener; break it so the output
/// can never be mistaken for markup.
fn defang_tag_literals(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    if !lower.contains("<script") && !lower.contains("<style") {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 8);
    for (i, ch) in s.char_indices() {
        let rest = &lower[i..];
        if ch == '<' && (rest.starts_with("<script") || rest.starts_with("<style")) {
            out.push_str("< ");
        } else {
            out.push(ch);
        }
    }
    out
}

/// Every `a[href]` in document order, duplicates kept.
pub fn anchor_graph(doc: &Html, base: Option<&url::Url>) -> Vec<LinkEntry> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            let target = base
                .and_then(|b| b.join(href).ok())
                .map(|u| u.to_string())
                .unwrap_or_else(|| href.to_string());
            Some(LinkEntry {
                display_text: anchor_text(&a),
                target,
            })
        })
        .collect()
}

/// Whitespace-normalized text of an element; `None` when empty.
pub fn anchor_text(el: &ElementRef) -> Option<String> {
    let t = norm_ws(&el.text().collect::<Vec<_>>().join(" "));
    (!t.is_empty()).then_some(t)
}

/// Absolute, fragment-free form of `href` for navigable links.
///
/// Returns `None` for script, mail, phone and same-page anchors.
pub fn navigable_href(base: Option<&url::Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lc = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|p| lc.starts_with(p))
    {
        return None;
    }
    let mut u = match url::Url::parse(href) {
        Ok(u) => u,
        Err(_) => base?.join(href).ok()?,
    };
    u.set_fragment(None);
    Some(u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn script_style_and_noscript_contents_are_dropped() {
        let html = r#"<html><head><title>Campus</title><style>.a{color:red}</style></head>
            <body><script>var secret = 1;</script><noscript>ative o JS</noscript>
            <p>Secretaria   acadêmica</p><template><p>oculto</p></template><p>Horário</p></body></html>"#;
        let p = normalize_html(html, "https://x.test/");
        assert_eq!(p.text, "Campus\nSecretaria   acadêmica\nHorário");
        assert!(!p.text.contains("secret ="));
        assert!(!p.text.contains("color"));
        assert!(!p.text.contains("oculto"));
    }

    #[test]
    fn escaped_script_text_is_defanged() {
        let html = "<p>use &lt;script&gt; e &lt;STYLE&gt; com cuidado</p>";
        let p = normalize_html(html, "https://x.test/");
        assert!(!p.text.to_ascii_lowercase().contains("<script"));
        assert!(!p.text.to_ascii_lowercase().contains("<style"));
        assert!(p.text.contains("script"));
    }

    #[test]
    fn anchors_keep_document_order_and_duplicates() {
        let html = r#"<a href="/b">B</a><a href="/a"></a><a href="/b">B</a><a>no href</a>
            <a href="mailto:x@y.z">mail</a>"#;
        let p = normalize_html(html, "https://x.test/dir/page");
        let targets: Vec<_> = p.links.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(
            targets,
            vec![
                "https://x.test/b",
                "https://x.test/a",
                "https://x.test/b",
                "mailto:x@y.z"
            ]
        );
        assert_eq!(p.links[1].display_text, None);
        assert_eq!(p.links[0].display_text.as_deref(), Some("B"));
    }

    #[test]
    fn navigable_href_filters_and_absolutizes() {
        let base = url::Url::parse("https://x.test/barbacena/").unwrap();
        assert_eq!(
            navigable_href(Some(&base), "cursos#topo").as_deref(),
            Some("https://x.test/barbacena/cursos")
        );
        assert_eq!(navigable_href(Some(&base), "#conteudo"), None);
        assert_eq!(navigable_href(Some(&base), "javascript:void(0)"), None);
        assert_eq!(navigable_href(Some(&base), "MAILTO:a@b.c"), None);
        assert_eq!(navigable_href(None, "/relative"), None);
    }

    proptest! {
        #[test]
        fn normalized_text_never_contains_script_openers(
            parts in proptest::collection::vec(
                prop_oneof![
                    Just("<script>alert(1)</script>".to_string()),
                    Just("&lt;script&gt;".to_string()),
                    Just("&lt;ScRiPt src=x&gt;".to_string()),
                    Just("<style>p{}</style>".to_string()),
                    Just("&lt;&lt;style".to_string()),
                    Just("<p>".to_string()),
                    Just("</p>".to_string()),
                    "[a-zA-Z <>&;]{0,12}",
                ],
                0..16,
            )
        ) {
            let html = parts.concat();
            let p = normalize_html(&html, "https://x.test/");
            let lc = p.text.to_ascii_lowercase();
            prop_assert!(!lc.contains("<script"));
            prop_assert!(!lc.contains("<style"));
        }
    }
}
