//! Category and listing page expansion.
//!
//! Expanding one listing page yields the category-shaped links found on
//! it (including `/atozmedicine/` index pages, which surface categories
//! the navigation never links to), the product summary records from its
//! cards, and whether a further listing page exists. All URLs are
//! canonicalized here; dedup against the visited set happens at the
//! frontier.

use crate::crawler::url::{canonicalize, is_category_link, is_product_link, slug_from_url, with_page};
use crate::models::{CategoryNode, ProductRecord};
use crate::parser::clean;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Result of expanding one listing page.
#[derive(Debug, Default)]
pub struct Expansion {
    pub children: Vec<CategoryNode>,
    pub products: Vec<ProductRecord>,
    pub has_next_page: bool,
}

pub struct CategoryDiscoverer {
    base: Url,
    anchor_selector: Selector,
    img_selector: Selector,
}

impl CategoryDiscoverer {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            anchor_selector: Selector::parse("a[href]").unwrap(),
            img_selector: Selector::parse("img").unwrap(),
        }
    }

    /// Walk every link on the page and sort it into child categories,
    /// product cards and pagination.
    pub fn expand(&self, html: &str, node: &CategoryNode, page: u32) -> Expansion {
        let document = Html::parse_document(html);
        let mut expansion = Expansion::default();
        let mut seen: HashSet<String> = HashSet::new();
        let next_page_url = with_page(&node.url, page + 1);

        for anchor in document.select(&self.anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = canonicalize(href, &self.base) else {
                continue;
            };

            if url == next_page_url {
                expansion.has_next_page = true;
            }

            if !seen.insert(url.clone()) {
                continue;
            }

            if is_category_link(&url) && url != node.url {
                let slug = slug_from_url(&url);
                let name = self
                    .link_label(&anchor)
                    .unwrap_or_else(|| humanize(&slug));
                let mut child = node.child(url, name, slug);
                child.image_url = self.first_image(&anchor);
                expansion.children.push(child);
            } else if is_product_link(&url) {
                let slug = slug_from_url(&url);
                let name = self
                    .link_label(&anchor)
                    .unwrap_or_else(|| humanize(&slug));
                let mut record = ProductRecord::summary(url, name, slug, node.url.clone());
                let card = card_text(anchor);
                let (current, original) = clean::price_pair(&card);
                record.price_current = current;
                record.price_original = original;
                record.update_discount();
                if let Some(img) = self.first_image(&anchor) {
                    record.image_urls.push(img);
                }
                expansion.products.push(record);
            }
        }

        debug!(
            category = %node.url,
            page,
            children = expansion.children.len(),
            products = expansion.products.len(),
            has_next = expansion.has_next_page,
            "expanded listing page"
        );
        expansion
    }

    /// Human-readable label for a link: its text, then `title`, then the
    /// alt text of an embedded image.
    fn link_label(&self, anchor: &ElementRef) -> Option<String> {
        let text: String = anchor.text().collect::<Vec<_>>().join(" ");
        if let Some(label) = clean::sanitize_text(&clean::strip_prices(&text)) {
            return Some(label);
        }
        if let Some(title) = anchor.value().attr("title") {
            if let Some(label) = clean::sanitize_text(title) {
                return Some(label);
            }
        }
        anchor
            .select(&self.img_selector)
            .filter_map(|img| img.value().attr("alt"))
            .find_map(clean::sanitize_text)
    }

    fn first_image(&self, anchor: &ElementRef) -> Option<String> {
        anchor.select(&self.img_selector).find_map(|img| {
            let src = img
                .value()
                .attr("data-src")
                .or_else(|| img.value().attr("src"))?;
            self.base.join(src.trim()).ok().map(|u| u.to_string())
        })
    }
}

/// Text of the card surrounding a product link. Cards sometimes keep the
/// price outside the anchor, so climb a few ancestors until one mentions
/// a price.
fn card_text(anchor: ElementRef) -> String {
    let mut text: String = anchor.text().collect::<Vec<_>>().join(" ");
    let mut node = anchor.parent();
    for _ in 0..3 {
        if !clean::extract_prices(&text).is_empty() {
            break;
        }
        let Some(current) = node else { break };
        let Some(element) = ElementRef::wrap(current) else {
            break;
        };
        text = element.text().collect::<Vec<_>>().join(" ");
        node = current.parent();
    }
    text
}

fn humanize(slug: &str) -> String {
    slug.replace('-', " ")
}
