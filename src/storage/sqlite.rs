//! SQLite persistence for categories, products, brands and images.
//!
//! Categories and products are upserted by their unique canonical URL, so
//! a resumed run re-emitting a record it already wrote is idempotent.
//! Foreign keys (`parent_id`, `category_id`, `brand_id`) resolve against
//! rows inserted earlier in the same run or a previous one.

use crate::error::StorageError;
use crate::models::{CategoryNode, ProductRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    url         TEXT NOT NULL UNIQUE,
    slug        TEXT NOT NULL,
    image_url   TEXT,
    parent_id   INTEGER REFERENCES categories(id),
    depth       INTEGER NOT NULL DEFAULT 0,
    scraped_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS brands (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS products (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    name                  TEXT NOT NULL,
    url                   TEXT NOT NULL UNIQUE,
    slug                  TEXT NOT NULL,
    sku                   TEXT,
    price_current         REAL,
    price_original        REAL,
    discount_percentage   REAL,
    description           TEXT,
    ingredients           TEXT,
    dosage                TEXT,
    form                  TEXT,
    manufacturer          TEXT,
    brand_id              INTEGER REFERENCES brands(id),
    category_id           INTEGER REFERENCES categories(id),
    in_stock              INTEGER NOT NULL DEFAULT 1,
    stock_quantity        INTEGER,
    prescription_required INTEGER NOT NULL DEFAULT 0,
    rating                REAL,
    reviews_count         INTEGER,
    meta_description      TEXT,
    meta_keywords         TEXT,
    scraped_at            TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS product_images (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    image_url  TEXT NOT NULL,
    UNIQUE(product_id, image_url)
);

CREATE TABLE IF NOT EXISTS related_products (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id  INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    related_url TEXT NOT NULL,
    UNIQUE(product_id, related_url)
);

CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);
CREATE INDEX IF NOT EXISTS idx_products_sku ON products(sku);
CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);
"#;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn upsert_category(&self, node: &CategoryNode) -> Result<i64, StorageError> {
        let parent_id = match &node.parent_url {
            Some(url) => self.category_id_by_url(url)?,
            None => None,
        };
        self.conn.execute(
            "INSERT INTO categories (name, url, slug, image_url, parent_id, depth, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(url) DO UPDATE SET
                 name = excluded.name,
                 slug = excluded.slug,
                 image_url = COALESCE(excluded.image_url, categories.image_url),
                 parent_id = COALESCE(excluded.parent_id, categories.parent_id),
                 scraped_at = excluded.scraped_at",
            params![
                node.name,
                node.url,
                node.slug,
                node.image_url,
                parent_id,
                node.depth,
                node.discovered_at.to_rfc3339(),
            ],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM categories WHERE url = ?1",
            params![node.url],
            |row| row.get(0),
        )?;
        debug!(url = %node.url, id, "category stored");
        Ok(id)
    }

    pub fn upsert_product(&self, record: &ProductRecord) -> Result<i64, StorageError> {
        let category_id = self.category_id_by_url(&record.category_url)?;
        let brand_id = match &record.brand {
            Some(name) => Some(self.brand_id(name)?),
            None => None,
        };

        self.conn.execute(
            "INSERT INTO products (
                 name, url, slug, sku, price_current, price_original,
                 discount_percentage, description, ingredients, dosage, form,
                 manufacturer, brand_id, category_id, in_stock, stock_quantity,
                 prescription_required, rating, reviews_count,
                 meta_description, meta_keywords, scraped_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
             ON CONFLICT(url) DO UPDATE SET
                 name = excluded.name,
                 slug = excluded.slug,
                 sku = COALESCE(excluded.sku, products.sku),
                 price_current = excluded.price_current,
                 price_original = excluded.price_original,
                 discount_percentage = excluded.discount_percentage,
                 description = COALESCE(excluded.description, products.description),
                 ingredients = COALESCE(excluded.ingredients, products.ingredients),
                 dosage = COALESCE(excluded.dosage, products.dosage),
                 form = COALESCE(excluded.form, products.form),
                 manufacturer = COALESCE(excluded.manufacturer, products.manufacturer),
                 brand_id = COALESCE(excluded.brand_id, products.brand_id),
                 category_id = COALESCE(excluded.category_id, products.category_id),
                 in_stock = excluded.in_stock,
                 stock_quantity = excluded.stock_quantity,
                 prescription_required = excluded.prescription_required,
                 rating = COALESCE(excluded.rating, products.rating),
                 reviews_count = COALESCE(excluded.reviews_count, products.reviews_count),
                 meta_description = COALESCE(excluded.meta_description, products.meta_description),
                 meta_keywords = COALESCE(excluded.meta_keywords, products.meta_keywords),
                 scraped_at = excluded.scraped_at",
            params![
                record.name,
                record.url,
                record.slug,
                record.sku,
                record.price_current,
                record.price_original,
                record.discount_percentage,
                record.description,
                record.ingredients,
                record.dosage,
                record.form,
                record.manufacturer,
                brand_id,
                category_id,
                record.in_stock,
                record.stock_quantity,
                record.prescription_required,
                record.rating,
                record.reviews_count,
                record.meta_description,
                record.meta_keywords,
                record.scraped_at.to_rfc3339(),
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM products WHERE url = ?1",
            params![record.url],
            |row| row.get(0),
        )?;

        for image in &record.image_urls {
            self.conn.execute(
                "INSERT OR IGNORE INTO product_images (product_id, image_url) VALUES (?1, ?2)",
                params![id, image],
            )?;
        }
        for related in &record.related_urls {
            self.conn.execute(
                "INSERT OR IGNORE INTO related_products (product_id, related_url) VALUES (?1, ?2)",
                params![id, related],
            )?;
        }

        debug!(url = %record.url, id, "product stored");
        Ok(id)
    }

    fn brand_id(&self, name: &str) -> Result<i64, StorageError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO brands (name) VALUES (?1)",
            params![name],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM brands WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn category_id_by_url(&self, url: &str) -> Result<Option<i64>, StorageError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM categories WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn category_count(&self) -> Result<u64, StorageError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    pub fn product_count(&self) -> Result<u64, StorageError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// All categories, parents before children.
    pub fn categories(&self) -> Result<Vec<CategoryNode>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.name, c.url, c.slug, c.image_url, p.url, c.depth, c.scraped_at
             FROM categories c
             LEFT JOIN categories p ON c.parent_id = p.id
             ORDER BY c.depth, c.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CategoryNode {
                name: row.get(0)?,
                url: row.get(1)?,
                slug: row.get(2)?,
                image_url: row.get(3)?,
                parent_url: row.get(4)?,
                depth: row.get(5)?,
                discovered_at: parse_timestamp(row, 6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn products(&self) -> Result<Vec<ProductRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.url, p.slug, p.sku, p.price_current,
                    p.price_original, p.discount_percentage, p.description,
                    p.ingredients, p.dosage, p.form, p.manufacturer, b.name,
                    c.url, p.in_stock, p.stock_quantity, p.prescription_required,
                    p.rating, p.reviews_count, p.meta_description,
                    p.meta_keywords, p.scraped_at
             FROM products p
             LEFT JOIN brands b ON p.brand_id = b.id
             LEFT JOIN categories c ON p.category_id = c.id
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            Ok((
                id,
                ProductRecord {
                    name: row.get(1)?,
                    url: row.get(2)?,
                    slug: row.get(3)?,
                    sku: row.get(4)?,
                    price_current: row.get(5)?,
                    price_original: row.get(6)?,
                    discount_percentage: row.get(7)?,
                    description: row.get(8)?,
                    ingredients: row.get(9)?,
                    dosage: row.get(10)?,
                    form: row.get(11)?,
                    manufacturer: row.get(12)?,
                    brand: row.get(13)?,
                    category_url: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                    image_urls: Vec::new(),
                    in_stock: row.get(15)?,
                    stock_quantity: row.get(16)?,
                    prescription_required: row.get(17)?,
                    rating: row.get(18)?,
                    reviews_count: row.get(19)?,
                    related_urls: Vec::new(),
                    meta_description: row.get(20)?,
                    meta_keywords: row.get(21)?,
                    scraped_at: parse_timestamp(row, 22)?,
                },
            ))
        })?;

        let mut products = Vec::new();
        for row in rows {
            let (id, mut record) = row?;
            record.image_urls = self.strings_for(
                "SELECT image_url FROM product_images WHERE product_id = ?1 ORDER BY id",
                id,
            )?;
            record.related_urls = self.strings_for(
                "SELECT related_url FROM related_products WHERE product_id = ?1 ORDER BY id",
                id,
            )?;
            products.push(record);
        }
        Ok(products)
    }

    fn strings_for(&self, sql: &str, id: i64) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
