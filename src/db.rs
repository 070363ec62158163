use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::Serialize;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            id             INTEGER PRIMARY KEY,
            title          TEXT,
            color          TEXT,
            memory         TEXT,
            vendor         TEXT,
            price          TEXT,
            discount_price TEXT,
            photos         TEXT,
            code           TEXT,
            reviews_count  INTEGER,
            article        TEXT,
            diagonal       TEXT,
            resolution     TEXT,
            specifications TEXT,
            link           TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_code ON products(code);
        ",
    )?;
    Ok(())
}

// ── Records ──

/// One scraped product page, before it meets storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductRecord {
    pub link: String,
    pub title: Option<String>,
    pub full_name: Option<String>,
    pub color: Option<String>,
    pub memory: Option<String>,
    pub vendor: Option<String>,
    pub price: Option<Decimal>,
    pub discount_price: Option<Decimal>,
    pub photos: Vec<String>,
    pub code: Option<String>,
    pub reviews_count: u32,
    pub article: Option<String>,
    pub diagonal: Option<String>,
    pub resolution: Option<String>,
    pub specifications: BTreeMap<String, String>,
}

/// The persisted column set. `None` means "no value": NULL when read back,
/// "leave as is" when used as an update candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRow {
    pub title: Option<String>,
    pub color: Option<String>,
    pub memory: Option<String>,
    pub vendor: Option<String>,
    pub price: Option<Decimal>,
    pub discount_price: Option<Decimal>,
    pub photos: Option<Vec<String>>,
    pub code: Option<String>,
    pub reviews_count: Option<u32>,
    pub article: Option<String>,
    pub diagonal: Option<String>,
    pub resolution: Option<String>,
    pub specifications: Option<BTreeMap<String, String>>,
    pub link: Option<String>,
}

impl ProductRow {
    /// Fields a scrape actually found. Empty photo lists and spec maps count as
    /// not found so they never blank out stored data.
    pub fn from_record(r: &ProductRecord) -> Self {
        ProductRow {
            title: r.title.clone(),
            color: r.color.clone(),
            memory: r.memory.clone(),
            vendor: r.vendor.clone(),
            price: r.price,
            discount_price: r.discount_price,
            photos: Some(r.photos.clone()).filter(|p| !p.is_empty()),
            code: r.code.clone(),
            reviews_count: Some(r.reviews_count),
            article: r.article.clone(),
            diagonal: r.diagonal.clone(),
            resolution: r.resolution.clone(),
            specifications: Some(r.specifications.clone()).filter(|s| !s.is_empty()),
            link: Some(r.link.clone()),
        }
    }

    /// `self` with every present field of `update` written over it.
    pub fn overlay(&self, update: &ProductRow) -> ProductRow {
        fn pick<T: Clone>(new: &Option<T>, old: &Option<T>) -> Option<T> {
            new.as_ref().or(old.as_ref()).cloned()
        }
        ProductRow {
            title: pick(&update.title, &self.title),
            color: pick(&update.color, &self.color),
            memory: pick(&update.memory, &self.memory),
            vendor: pick(&update.vendor, &self.vendor),
            price: pick(&update.price, &self.price),
            discount_price: pick(&update.discount_price, &self.discount_price),
            photos: pick(&update.photos, &self.photos),
            code: pick(&update.code, &self.code),
            reviews_count: pick(&update.reviews_count, &self.reviews_count),
            article: pick(&update.article, &self.article),
            diagonal: pick(&update.diagonal, &self.diagonal),
            resolution: pick(&update.resolution, &self.resolution),
            specifications: pick(&update.specifications, &self.specifications),
            link: pick(&update.link, &self.link),
        }
    }
}

pub struct StoredProduct {
    pub id: i64,
    pub row: ProductRow,
    pub updated_at: String,
}

// ── Reads ──

const SELECT_PRODUCT: &str =
    "SELECT id, title, color, memory, vendor, price, discount_price, photos, code,
            reviews_count, article, diagonal, resolution, specifications, link, updated_at
     FROM products";

fn read_product(row: &Row) -> rusqlite::Result<StoredProduct> {
    Ok(StoredProduct {
        id: row.get(0)?,
        row: ProductRow {
            title: row.get(1)?,
            color: row.get(2)?,
            memory: row.get(3)?,
            vendor: row.get(4)?,
            price: decimal_column(row, 5)?,
            discount_price: decimal_column(row, 6)?,
            photos: json_column(row, 7)?,
            code: row.get(8)?,
            reviews_count: row.get(9)?,
            article: row.get(10)?,
            diagonal: row.get(11)?,
            resolution: row.get(12)?,
            specifications: json_column(row, 13)?,
            link: row.get(14)?,
        },
        updated_at: row.get(15)?,
    })
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Oldest row carrying `code`, if any.
pub fn find_by_code(conn: &Connection, code: &str) -> rusqlite::Result<Option<StoredProduct>> {
    conn.query_row(
        &format!("{} WHERE code = ?1 ORDER BY id LIMIT 1", SELECT_PRODUCT),
        [code],
        read_product,
    )
    .optional()
}

pub fn fetch_products(
    conn: &Connection,
    code: Option<&str>,
    limit: usize,
) -> rusqlite::Result<Vec<StoredProduct>> {
    let sql = match code {
        Some(_) => format!("{} WHERE code = ?1 ORDER BY id DESC LIMIT {}", SELECT_PRODUCT, limit),
        None => format!("{} ORDER BY id DESC LIMIT {}", SELECT_PRODUCT, limit),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = match code {
        Some(c) => stmt.query_map([c], read_product)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], read_product)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

// ── Writes ──

fn to_json<T: Serialize>(value: &Option<T>) -> rusqlite::Result<Option<String>> {
    value
        .as_ref()
        .map(|v| serde_json::to_string(v).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
        .transpose()
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn insert_product(conn: &Connection, p: &ProductRow) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO products
         (title, color, memory, vendor, price, discount_price, photos, code, reviews_count,
          article, diagonal, resolution, specifications, link, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        rusqlite::params![
            p.title, p.color, p.memory, p.vendor,
            p.price.map(|d| d.to_string()),
            p.discount_price.map(|d| d.to_string()),
            to_json(&p.photos)?, p.code, p.reviews_count,
            p.article, p.diagonal, p.resolution,
            to_json(&p.specifications)?, p.link, now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_product(conn: &Connection, id: i64, p: &ProductRow) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE products SET
            title = ?1, color = ?2, memory = ?3, vendor = ?4, price = ?5, discount_price = ?6,
            photos = ?7, code = ?8, reviews_count = ?9, article = ?10, diagonal = ?11,
            resolution = ?12, specifications = ?13, link = ?14, updated_at = ?15
         WHERE id = ?16",
        rusqlite::params![
            p.title, p.color, p.memory, p.vendor,
            p.price.map(|d| d.to_string()),
            p.discount_price.map(|d| d.to_string()),
            to_json(&p.photos)?, p.code, p.reviews_count,
            p.article, p.diagonal, p.resolution,
            to_json(&p.specifications)?, p.link, now(), id,
        ],
    )?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub with_code: usize,
    pub distinct_codes: usize,
    pub without_code: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
    let with_code: usize = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE code IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let distinct_codes: usize =
        conn.query_row("SELECT COUNT(DISTINCT code) FROM products", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        with_code,
        distinct_codes,
        without_code: total - with_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample_row() -> ProductRow {
        let mut specs = BTreeMap::new();
        specs.insert("Колір".to_string(), "Black".to_string());
        ProductRow {
            title: Some("Apple iPhone 15 128GB Black".into()),
            price: Some(Decimal::from_str("37999.00").unwrap()),
            photos: Some(vec!["https://cdn/a.jpg".into(), "https://cdn/b.jpg".into()]),
            code: Some("1044347".into()),
            reviews_count: Some(12),
            specifications: Some(specs),
            link: Some("https://brain.com.ua/p1044347.html".into()),
            ..Default::default()
        }
    }

    #[test]
    fn insert_then_find_roundtrips_columns() {
        let conn = memory_db();
        let row = sample_row();
        let id = insert_product(&conn, &row).unwrap();
        let stored = find_by_code(&conn, "1044347").unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.row, row);
        assert!(!stored.updated_at.is_empty());
    }

    #[test]
    fn find_missing_code() {
        let conn = memory_db();
        assert!(find_by_code(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn overlay_keeps_old_values_for_missing_fields() {
        let old = sample_row();
        let update = ProductRow {
            price: Some(Decimal::from(35999)),
            vendor: Some("Brain".into()),
            ..Default::default()
        };
        let merged = old.overlay(&update);
        assert_eq!(merged.price, Some(Decimal::from(35999)));
        assert_eq!(merged.vendor.as_deref(), Some("Brain"));
        assert_eq!(merged.title, old.title);
        assert_eq!(merged.photos, old.photos);
    }

    #[test]
    fn empty_collections_are_not_candidates() {
        let record = ProductRecord {
            link: "https://x/p.html".into(),
            ..Default::default()
        };
        let row = ProductRow::from_record(&record);
        assert_eq!(row.photos, None);
        assert_eq!(row.specifications, None);
        assert_eq!(row.reviews_count, Some(0));
        assert_eq!(row.link.as_deref(), Some("https://x/p.html"));
    }

    #[test]
    fn stats_counts() {
        let conn = memory_db();
        insert_product(&conn, &sample_row()).unwrap();
        insert_product(&conn, &sample_row()).unwrap();
        insert_product(&conn, &ProductRow::default()).unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 3);
        assert_eq!(s.with_code, 2);
        assert_eq!(s.distinct_codes, 1);
        assert_eq!(s.without_code, 1);
    }

    #[test]
    fn fetch_filters_by_code() {
        let conn = memory_db();
        insert_product(&conn, &sample_row()).unwrap();
        insert_product(&conn, &ProductRow::default()).unwrap();
        assert_eq!(fetch_products(&conn, None, 10).unwrap().len(), 2);
        assert_eq!(fetch_products(&conn, Some("1044347"), 10).unwrap().len(), 1);
    }
}
