//! CSV export with RFC 4180 style quoting.

use crate::error::StorageError;
use crate::models::{CategoryNode, ProductRecord};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn opt(value: &Option<impl Display>) -> String {
    value
        .as_ref()
        .map(|v| field(&v.to_string()))
        .unwrap_or_default()
}

pub fn write_categories(path: &Path, categories: &[CategoryNode]) -> Result<(), StorageError> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "name,url,slug,parent_url,depth,image_url,discovered_at")?;
    for c in categories {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            field(&c.name),
            field(&c.url),
            field(&c.slug),
            opt(&c.parent_url),
            c.depth,
            opt(&c.image_url),
            c.discovered_at.to_rfc3339(),
        )?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_products(path: &Path, products: &[ProductRecord]) -> Result<(), StorageError> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(
        out,
        "name,url,slug,sku,price_current,price_original,discount_percentage,\
         form,manufacturer,brand,category_url,in_stock,stock_quantity,\
         prescription_required,rating,reviews_count,scraped_at"
    )?;
    for p in products {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            field(&p.name),
            field(&p.url),
            field(&p.slug),
            opt(&p.sku),
            opt(&p.price_current),
            opt(&p.price_original),
            opt(&p.discount_percentage),
            opt(&p.form),
            opt(&p.manufacturer),
            opt(&p.brand),
            field(&p.category_url),
            p.in_stock,
            opt(&p.stock_quantity),
            p.prescription_required,
            opt(&p.rating),
            opt(&p.reviews_count),
            p.scraped_at.to_rfc3339(),
        )?;
    }
    out.flush()?;
    Ok(())
}
