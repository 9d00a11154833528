//! Product detail-page extraction.
//!
//! Listing cards give a summary record (name, URL, prices); this module
//! enriches it from the product page: SKU, description, composition,
//! dosage, manufacturer, form, stock, prescription flag, rating, images,
//! related products and page metadata. Only the identity fields (name,
//! URL) can fail extraction; everything else stays absent when the page
//! does not carry it.

use crate::crawler::url::{canonicalize, is_product_link, slug_from_url};
use crate::error::ExtractionError;
use crate::models::ProductRecord;
use crate::parser::clean;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const MAX_IMAGES: usize = 10;
const MAX_RELATED: usize = 10;

struct FieldPatterns {
    sku: Regex,
    manufacturer: Regex,
    ingredients: Regex,
    dosage: Regex,
    form: Regex,
    form_keyword: Regex,
    stock_quantity: Regex,
    reviews: Regex,
    rating: Regex,
}

impl FieldPatterns {
    fn new() -> Self {
        Self {
            sku: Regex::new(r"(?i)(?:SKU|Product Code|Item Code)[:\s]+([A-Za-z0-9-]+)").unwrap(),
            manufacturer: Regex::new(
                r"(?i)(?:Manufacturer|Manufactured by|Marketed by|Made by)[:\s]+([^\n.]{2,80})",
            )
            .unwrap(),
            ingredients: Regex::new(
                r"(?i)(?:Active Ingredients|Ingredients|Composition|Contains)[:\s]+([^\n]{2,200})",
            )
            .unwrap(),
            dosage: Regex::new(r"(?i)(?:Dosage|Dose|How to use|Administration)[:\s]+([^\n]{2,200})")
                .unwrap(),
            form: Regex::new(r"(?i)\b(?:Form|Formulation)\b[:\s]+([A-Za-z ]{2,40})").unwrap(),
            form_keyword: Regex::new(
                r"(?i)\b(tablets?|capsules?|syrup|suspension|injection|vial|cream|ointment|gel|drops|sachets?|inhaler|lotion)\b",
            )
            .unwrap(),
            stock_quantity: Regex::new(r"(?i)(?:(\d+)\s*in stock|stock[:\s]+(\d+)|only\s+(\d+)\s+left)")
                .unwrap(),
            reviews: Regex::new(r"(?i)(\d[\d,]*)\s*(?:reviews?|ratings?)").unwrap(),
            rating: Regex::new(r"(\d+(?:\.\d+)?)").unwrap(),
        }
    }
}

pub struct ProductExtractor {
    base: Url,
    name_selectors: Vec<Selector>,
    description_selectors: Vec<Selector>,
    rating_selectors: Vec<Selector>,
    image_selector: Selector,
    anchor_selector: Selector,
    meta_selector: Selector,
    patterns: FieldPatterns,
}

impl ProductExtractor {
    pub fn new(base: Url) -> Self {
        let parse = |s: &str| Selector::parse(s).unwrap();
        Self {
            base,
            name_selectors: vec![
                parse("h1"),
                parse(".product-title"),
                parse(".product-name"),
                parse("[class*='product-title']"),
            ],
            description_selectors: vec![
                parse(".product-description"),
                parse(".description"),
                parse("[class*='description']"),
                parse(".product-details"),
            ],
            rating_selectors: vec![parse(".rating"), parse(".stars"), parse("[class*='rating']")],
            image_selector: parse("img"),
            anchor_selector: parse("a[href]"),
            meta_selector: parse("meta"),
            patterns: FieldPatterns::new(),
        }
    }

    /// Build a full record from a product page alone. The listing summary
    /// path goes through [`enrich`](Self::enrich) instead.
    pub fn extract(
        &self,
        page_url: &str,
        html: &str,
        category_url: &str,
    ) -> Result<ProductRecord, ExtractionError> {
        let mut record = ProductRecord::summary(
            page_url,
            String::new(),
            slug_from_url(page_url),
            category_url,
        );
        self.enrich(html, &mut record)?;
        Ok(record)
    }

    /// Merge everything the detail page knows into `record`. Fails only
    /// when no product name can be established at all.
    pub fn enrich(&self, html: &str, record: &mut ProductRecord) -> Result<(), ExtractionError> {
        let document = Html::parse_document(html);
        let text: String = document.root_element().text().collect::<Vec<_>>().join("\n");

        if let Some(name) = self.select_text(&document, &self.name_selectors) {
            record.name = name;
        }
        if record.name.trim().is_empty() {
            return Err(ExtractionError::missing("name"));
        }
        if record.url.trim().is_empty() {
            return Err(ExtractionError::missing("url"));
        }

        let (current, original) = clean::price_pair(&text);
        if current.is_some() {
            record.price_current = current;
            record.price_original = original;
        }
        record.update_discount();

        if let Some(caps) = self.patterns.sku.captures(&text) {
            record.sku = clean::sanitize_text(&caps[1]);
        }
        if record.description.is_none() {
            record.description = self.select_text(&document, &self.description_selectors);
        }
        if let Some(caps) = self.patterns.ingredients.captures(&text) {
            record.ingredients = clean::sanitize_text(&caps[1]);
        }
        if let Some(caps) = self.patterns.dosage.captures(&text) {
            record.dosage = clean::sanitize_text(&caps[1]);
        }
        if let Some(caps) = self.patterns.manufacturer.captures(&text) {
            record.manufacturer = clean::sanitize_text(&caps[1]);
            if record.brand.is_none() {
                record.brand = record.manufacturer.clone();
            }
        }
        record.form = self
            .patterns
            .form
            .captures(&text)
            .and_then(|c| clean::sanitize_text(&c[1]))
            .or_else(|| {
                // fall back to a keyword in the product name
                self.patterns
                    .form_keyword
                    .captures(&record.name)
                    .map(|c| c[1].to_lowercase())
            });

        let lower = text.to_lowercase();
        record.prescription_required = [
            "prescription required",
            "prescription needed",
            "rx required",
            "doctor's prescription",
            "prescribed medicine",
        ]
        .iter()
        .any(|k| lower.contains(k));

        record.in_stock = !["out of stock", "sold out", "not available", "unavailable", "stock finished"]
            .iter()
            .any(|k| lower.contains(k));
        if let Some(caps) = self.patterns.stock_quantity.captures(&lower) {
            record.stock_quantity = caps
                .iter()
                .skip(1)
                .flatten()
                .next()
                .and_then(|m| m.as_str().parse().ok());
        }

        if let Some(raw) = self.select_text(&document, &self.rating_selectors) {
            record.rating = self
                .patterns
                .rating
                .captures(&raw)
                .and_then(|c| clean::parse_rating(&c[1]));
        }
        if let Some(caps) = self.patterns.reviews.captures(&text) {
            record.reviews_count = clean::parse_count(&caps[1]);
        }

        self.collect_images(&document, record);
        self.collect_related(&document, record);
        self.collect_meta(&document, record);

        debug!(
            url = %record.url,
            sku = ?record.sku,
            price = ?record.price_current,
            "enriched product record"
        );
        Ok(())
    }

    fn select_text(&self, document: &Html, selectors: &[Selector]) -> Option<String> {
        selectors.iter().find_map(|sel| {
            document
                .select(sel)
                .next()
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .and_then(|t| clean::sanitize_text(&t))
        })
    }

    fn collect_images(&self, document: &Html, record: &mut ProductRecord) {
        for img in document.select(&self.image_selector) {
            if record.image_urls.len() >= MAX_IMAGES {
                break;
            }
            let Some(src) = img
                .value()
                .attr("data-src")
                .or_else(|| img.value().attr("src"))
            else {
                continue;
            };
            let src = src.trim();
            if src.is_empty() || src.starts_with("data:") {
                continue;
            }
            // only product imagery, not icons or banners
            let alt = img.value().attr("alt").unwrap_or_default().to_lowercase();
            let class = img.value().attr("class").unwrap_or_default().to_lowercase();
            let relevant = src.to_lowercase().contains("product")
                || class.contains("product")
                || alt.contains(&record.name.to_lowercase());
            if !relevant {
                continue;
            }
            if let Ok(resolved) = self.base.join(src) {
                let resolved = resolved.to_string();
                if !record.image_urls.contains(&resolved) {
                    record.image_urls.push(resolved);
                }
            }
        }
    }

    fn collect_related(&self, document: &Html, record: &mut ProductRecord) {
        for anchor in document.select(&self.anchor_selector) {
            if record.related_urls.len() >= MAX_RELATED {
                break;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = canonicalize(href, &self.base) else {
                continue;
            };
            if is_product_link(&url) && url != record.url && !record.related_urls.contains(&url) {
                record.related_urls.push(url);
            }
        }
    }

    fn collect_meta(&self, document: &Html, record: &mut ProductRecord) {
        for meta in document.select(&self.meta_selector) {
            let value = meta.value();
            match (value.attr("name"), value.attr("content")) {
                (Some("description"), Some(content)) => {
                    record.meta_description = clean::sanitize_text(content);
                }
                (Some("keywords"), Some(content)) => {
                    record.meta_keywords = clean::sanitize_text(content);
                }
                _ => {}
            }
        }
    }
}
