use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::{self, ProductRecord, ProductRow};
use crate::error::PersistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(i64),
    Updated(i64),
    Unchanged(i64),
}

/// Create, update or leave alone the row for `record.code`.
///
/// Only fields the scrape found are written, so a field missing from a later
/// scrape keeps its stored value. Records without a code always insert.
pub fn upsert(conn: &Connection, record: &ProductRecord) -> Result<UpsertOutcome, PersistError> {
    let candidate = ProductRow::from_record(record);
    resolve(conn, &candidate).map_err(|source| PersistError {
        code: candidate.code.clone(),
        source,
    })
}

fn resolve(conn: &Connection, candidate: &ProductRow) -> rusqlite::Result<UpsertOutcome> {
    // IMMEDIATE takes the write lock up front so lookup and write can't interleave
    // with another writer on the same code.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let existing = match candidate.code.as_deref() {
        Some(code) => db::find_by_code(&tx, code)?,
        None => None,
    };

    let outcome = match existing {
        None => UpsertOutcome::Created(db::insert_product(&tx, candidate)?),
        Some(stored) => {
            let merged = stored.row.overlay(candidate);
            if merged == stored.row {
                UpsertOutcome::Unchanged(stored.id)
            } else {
                db::update_product(&tx, stored.id, &merged)?;
                UpsertOutcome::Updated(stored.id)
            }
        }
    };

    tx.commit()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn record() -> ProductRecord {
        let mut specs = BTreeMap::new();
        specs.insert("Артикул".to_string(), "MTP03RX/A".to_string());
        ProductRecord {
            link: "https://brain.com.ua/ukr/p1044347.html".into(),
            title: Some("Apple iPhone 15 128GB Black".into()),
            full_name: Some("Apple iPhone 15 128GB Black".into()),
            color: Some("Black".into()),
            price: Some(Decimal::from(41999)),
            discount_price: Some(Decimal::from_str("37999.00").unwrap()),
            photos: vec!["https://cdn/1.jpg".into(), "https://cdn/2.jpg".into()],
            code: Some("1044347".into()),
            reviews_count: 27,
            specifications: specs,
            ..Default::default()
        }
    }

    fn dump(conn: &Connection) -> Vec<Vec<Option<String>>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, title, color, price, discount_price, photos, code, reviews_count,
                        specifications, link, updated_at FROM products ORDER BY id",
            )
            .unwrap();
        stmt.query_map([], |row| {
            (0..11usize)
                .map(|i| {
                    row.get::<_, rusqlite::types::Value>(i).map(|v| match v {
                        rusqlite::types::Value::Null => None,
                        rusqlite::types::Value::Integer(n) => Some(n.to_string()),
                        rusqlite::types::Value::Text(s) => Some(s),
                        other => Some(format!("{:?}", other)),
                    })
                })
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
    }

    #[test]
    fn identical_record_is_unchanged() {
        let conn = memory_db();
        let first = upsert(&conn, &record()).unwrap();
        let id = match first {
            UpsertOutcome::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };
        let before = dump(&conn);

        assert_eq!(upsert(&conn, &record()).unwrap(), UpsertOutcome::Unchanged(id));
        assert_eq!(dump(&conn), before);
    }

    #[test]
    fn changed_price_updates_in_place() {
        let conn = memory_db();
        let UpsertOutcome::Created(id) = upsert(&conn, &record()).unwrap() else {
            panic!("expected Created");
        };

        let mut rescrape = record();
        rescrape.price = Some(Decimal::from(39999));
        rescrape.color = None;
        rescrape.photos.clear();
        assert_eq!(upsert(&conn, &rescrape).unwrap(), UpsertOutcome::Updated(id));

        let stored = db::find_by_code(&conn, "1044347").unwrap().unwrap();
        assert_eq!(stored.row.price, Some(Decimal::from(39999)));
        // Absent in the re-scrape, so the earlier values stay.
        assert_eq!(stored.row.color.as_deref(), Some("Black"));
        assert_eq!(stored.row.photos.as_ref().map(Vec::len), Some(2));
        assert_eq!(db::get_stats(&conn).unwrap().total, 1);
    }

    #[test]
    fn equal_decimal_with_other_scale_is_unchanged() {
        let conn = memory_db();
        let UpsertOutcome::Created(id) = upsert(&conn, &record()).unwrap() else {
            panic!("expected Created");
        };
        let mut rescrape = record();
        rescrape.price = Some(Decimal::from_str("41999.00").unwrap());
        assert_eq!(upsert(&conn, &rescrape).unwrap(), UpsertOutcome::Unchanged(id));
    }

    #[test]
    fn codeless_records_always_insert() {
        let conn = memory_db();
        let mut r = record();
        r.code = None;
        let a = upsert(&conn, &r).unwrap();
        let b = upsert(&conn, &r).unwrap();
        assert!(matches!(a, UpsertOutcome::Created(_)));
        assert!(matches!(b, UpsertOutcome::Created(_)));
        assert_ne!(a, b);
        assert_eq!(db::get_stats(&conn).unwrap().without_code, 2);
    }

    #[test]
    fn minimal_record_stores_nulls() {
        let conn = memory_db();
        let r = ProductRecord {
            link: "https://brain.com.ua/ukr/p1.html".into(),
            code: Some("1".into()),
            ..Default::default()
        };
        assert!(matches!(upsert(&conn, &r).unwrap(), UpsertOutcome::Created(_)));

        let stored = db::find_by_code(&conn, "1").unwrap().unwrap();
        assert_eq!(stored.row.title, None);
        assert_eq!(stored.row.price, None);
        assert_eq!(stored.row.photos, None);
        assert_eq!(stored.row.specifications, None);
        assert_eq!(stored.row.reviews_count, Some(0));
        assert_eq!(stored.row.link.as_deref(), Some("https://brain.com.ua/ukr/p1.html"));
    }

    #[test]
    fn storage_error_is_reported() {
        let conn = Connection::open_in_memory().unwrap();
        // No schema: lookup fails.
        let err = upsert(&conn, &record()).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("1044347"));
    }

    #[test]
    fn failed_insert_leaves_no_row() {
        let conn = memory_db();
        conn.execute_batch(
            "CREATE TRIGGER no_insert BEFORE INSERT ON products
             BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
        )
        .unwrap();

        let err = upsert(&conn, &record()).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("1044347"));
        assert_eq!(db::get_stats(&conn).unwrap().total, 0);

        // The failed transaction was rolled back, so the next one can start.
        conn.execute_batch("DROP TRIGGER no_insert;").unwrap();
        assert!(matches!(upsert(&conn, &record()).unwrap(), UpsertOutcome::Created(_)));
    }

    #[test]
    fn failed_update_keeps_stored_row() {
        let conn = memory_db();
        upsert(&conn, &record()).unwrap();
        let before = dump(&conn);
        conn.execute_batch(
            "CREATE TRIGGER no_update BEFORE UPDATE ON products
             BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
        )
        .unwrap();

        let mut rescrape = record();
        rescrape.price = Some(Decimal::from(39999));
        let err = upsert(&conn, &rescrape).unwrap_err();
        assert_eq!(err.code.as_deref(), Some("1044347"));
        assert_eq!(dump(&conn), before);
        assert!(conn.is_autocommit());
    }
}
