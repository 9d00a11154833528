//! XML export of the product catalogue.

use crate::error::StorageError;
use crate::models::ProductRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn esc(raw: &str) -> String {
    html_escape::encode_text(raw).into_owned()
}

fn tag(out: &mut impl Write, name: &str, value: &str) -> std::io::Result<()> {
    writeln!(out, "    <{name}>{}</{name}>", esc(value))
}

fn opt_tag(out: &mut impl Write, name: &str, value: &Option<impl ToString>) -> std::io::Result<()> {
    if let Some(v) = value {
        tag(out, name, &v.to_string())?;
    }
    Ok(())
}

pub fn write_products(path: &Path, products: &[ProductRecord]) -> Result<(), StorageError> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(out, r#"<products count="{}">"#, products.len())?;
    for p in products {
        writeln!(out, "  <product>")?;
        tag(&mut out, "name", &p.name)?;
        tag(&mut out, "url", &p.url)?;
        tag(&mut out, "slug", &p.slug)?;
        opt_tag(&mut out, "sku", &p.sku)?;
        opt_tag(&mut out, "price_current", &p.price_current)?;
        opt_tag(&mut out, "price_original", &p.price_original)?;
        opt_tag(&mut out, "discount_percentage", &p.discount_percentage)?;
        opt_tag(&mut out, "description", &p.description)?;
        opt_tag(&mut out, "ingredients", &p.ingredients)?;
        opt_tag(&mut out, "dosage", &p.dosage)?;
        opt_tag(&mut out, "form", &p.form)?;
        opt_tag(&mut out, "manufacturer", &p.manufacturer)?;
        opt_tag(&mut out, "brand", &p.brand)?;
        tag(&mut out, "category_url", &p.category_url)?;
        tag(&mut out, "in_stock", &p.in_stock.to_string())?;
        opt_tag(&mut out, "stock_quantity", &p.stock_quantity)?;
        tag(&mut out, "prescription_required", &p.prescription_required.to_string())?;
        opt_tag(&mut out, "rating", &p.rating)?;
        opt_tag(&mut out, "reviews_count", &p.reviews_count)?;
        if !p.image_urls.is_empty() {
            writeln!(out, "    <images>")?;
            for image in &p.image_urls {
                writeln!(out, "      <image>{}</image>", esc(image))?;
            }
            writeln!(out, "    </images>")?;
        }
        tag(&mut out, "scraped_at", &p.scraped_at.to_rfc3339())?;
        writeln!(out, "  </product>")?;
    }
    writeln!(out, "</products>")?;
    out.flush()?;
    Ok(())
}
