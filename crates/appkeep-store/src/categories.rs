//! Categories for organizing apps.
//!
//! A category owns nothing. Apps of either variant point at it through a
//! nullable `category_id`; deleting the category clears those pointers and
//! leaves the apps in place.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::apps::AppKind;
use crate::db::{self, from_db_timestamp, generate_uuid, to_db_timestamp};
use crate::error::StoreError;

/// Icon glyph given to categories created without one.
pub const DEFAULT_CATEGORY_ICON: &str = "folder.fill";

/// Color given to categories created without one.
pub const DEFAULT_CATEGORY_COLOR: &str = "blue";

/// Known color ids.
pub const CATEGORY_COLORS: &[&str] = &[
    "red", "orange", "yellow", "green", "mint", "teal", "cyan", "blue", "indigo", "purple",
    "pink", "brown", "gray",
];

/// Known icon glyphs, as (label, glyph id).
pub const CATEGORY_ICONS: &[(&str, &str)] = &[
    ("Folder", "folder.fill"),
    ("Games", "gamecontroller.fill"),
    ("Social", "bubble.left.and.bubble.right.fill"),
    ("Utilities", "wrench.and.screwdriver.fill"),
    ("Entertainment", "tv.fill"),
    ("Music", "music.note"),
    ("Photo", "photo.fill"),
    ("Video", "video.fill"),
    ("Productivity", "briefcase.fill"),
    ("Finance", "dollarsign.circle.fill"),
    ("Education", "book.fill"),
    ("Health", "heart.fill"),
    ("Travel", "airplane"),
    ("Food", "fork.knife"),
    ("Shopping", "cart.fill"),
    ("News", "newspaper.fill"),
    ("Sports", "sportscourt.fill"),
    ("Weather", "cloud.sun.fill"),
    ("Developer", "hammer.fill"),
    ("Star", "star.fill"),
    ("Flag", "flag.fill"),
    ("Bookmark", "bookmark.fill"),
];

/// A category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub uuid: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// A category with the number of apps filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListItem {
    #[serde(flatten)]
    pub category: CategoryRecord,
    pub app_count: u32,
}

/// Fields to change in [`update_category`]; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

const SELECT_COLUMNS: &str = "uuid, name, icon, color, created_at";

/// (uuid, name, icon, color, created_at) as stored.
type RawCategory = (String, String, String, String, String);

fn read_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCategory> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_record((uuid, name, icon, color, created_at): RawCategory) -> Result<CategoryRecord, StoreError> {
    Ok(CategoryRecord {
        uuid,
        name,
        icon,
        color,
        created_at: from_db_timestamp(&created_at)?,
    })
}

fn validated_name(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput("category name is empty".into()));
    }
    Ok(trimmed.to_string())
}

/// Create a category. Missing icon/color take the defaults.
///
/// # Errors
///
/// - [`StoreError::InvalidInput`] if `name` is blank
/// - [`StoreError::Database`] if the INSERT fails
pub fn add_category(
    conn: &Connection,
    name: &str,
    icon: Option<&str>,
    color: Option<&str>,
) -> Result<CategoryRecord, StoreError> {
    let record = CategoryRecord {
        uuid: generate_uuid(),
        name: validated_name(name)?,
        icon: icon.unwrap_or(DEFAULT_CATEGORY_ICON).to_string(),
        color: color.unwrap_or(DEFAULT_CATEGORY_COLOR).to_string(),
        created_at: db::now(),
    };

    conn.execute(
        "INSERT INTO categories (uuid, name, icon, color, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.uuid,
            record.name,
            record.icon,
            record.color,
            to_db_timestamp(&record.created_at)
        ],
    )
    .map_err(|e| StoreError::Database(format!("failed to create category: {e}")))?;

    Ok(record)
}

/// Look up a category by uuid.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn get_category_record(
    conn: &Connection,
    uuid: &str,
) -> Result<Option<CategoryRecord>, StoreError> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM categories WHERE uuid = ?1"),
        params![uuid],
        read_category,
    )
    .optional()
    .map_err(|e| StoreError::Database(format!("failed to fetch category: {e}")))?
    .map(into_record)
    .transpose()
}

/// All categories, sorted by name ascending.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the query fails.
pub fn fetch_categories(conn: &Connection) -> Result<Vec<CategoryRecord>, StoreError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM categories ORDER BY name ASC, created_at ASC"
        ))
        .map_err(|e| StoreError::Database(format!("failed to prepare category query: {e}")))?;

    let rows = stmt
        .query_map([], read_category)
        .map_err(|e| StoreError::Database(format!("failed to query categories: {e}")))?;

    let mut categories = Vec::new();
    for row in rows {
        let raw =
            row.map_err(|e| StoreError::Database(format!("failed to read category row: {e}")))?;
        categories.push(into_record(raw)?);
    }
    Ok(categories)
}

/// All categories with member counts across both app variants.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a query fails.
pub fn fetch_categories_with_counts(
    conn: &Connection,
) -> Result<Vec<CategoryListItem>, StoreError> {
    let categories = fetch_categories(conn)?;
    let mut items = Vec::with_capacity(categories.len());

    for category in categories {
        let mut app_count: u32 = 0;
        for kind in AppKind::ALL {
            let n: u32 = conn
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {} WHERE category_id = ?1",
                        kind.table()
                    ),
                    params![category.uuid],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Database(format!("failed to count category apps: {e}")))?;
            app_count = app_count.saturating_add(n);
        }
        items.push(CategoryListItem { category, app_count });
    }

    Ok(items)
}

/// Change a category's name, icon or color.
///
/// # Errors
///
/// - [`StoreError::CategoryNotFound`] if no category has this uuid
/// - [`StoreError::InvalidInput`] if a new name is blank
/// - [`StoreError::Database`] if the UPDATE fails
pub fn update_category(
    conn: &Connection,
    uuid: &str,
    update: &CategoryUpdate,
) -> Result<CategoryRecord, StoreError> {
    let Some(mut record) = get_category_record(conn, uuid)? else {
        return Err(StoreError::CategoryNotFound(uuid.to_string()));
    };

    if let Some(name) = &update.name {
        record.name = validated_name(name)?;
    }
    if let Some(icon) = &update.icon {
        record.icon.clone_from(icon);
    }
    if let Some(color) = &update.color {
        record.color.clone_from(color);
    }

    conn.execute(
        "UPDATE categories SET name = ?1, icon = ?2, color = ?3 WHERE uuid = ?4",
        params![record.name, record.icon, record.color, uuid],
    )
    .map_err(|e| StoreError::Database(format!("failed to update category: {e}")))?;

    Ok(record)
}

/// Delete a category.
///
/// Apps of both variants filed under it have their `category_id` set to
/// NULL in the same transaction; the apps themselves stay. Returns `false`
/// when no category had this uuid.
///
/// # Errors
///
/// Returns [`StoreError::Database`] or [`StoreError::Commit`] on failure.
pub fn delete_category(conn: &mut Connection, uuid: &str) -> Result<bool, StoreError> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Database(format!("failed to begin transaction: {e}")))?;

    for kind in AppKind::ALL {
        tx.execute(
            &format!(
                "UPDATE {} SET category_id = NULL WHERE category_id = ?1",
                kind.table()
            ),
            params![uuid],
        )
        .map_err(|e| StoreError::Database(format!("failed to unlink apps from category: {e}")))?;
    }

    let deleted = tx
        .execute("DELETE FROM categories WHERE uuid = ?1", params![uuid])
        .map_err(|e| StoreError::Database(format!("failed to delete category: {e}")))?;

    db::commit(tx)?;
    Ok(deleted > 0)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreDb;

    #[test]
    fn add_uses_defaults() {
        let db = StoreDb::open_in_memory().unwrap();
        let cat = add_category(db.connection(), "  Games ", None, None).unwrap();
        assert_eq!(cat.name, "Games");
        assert_eq!(cat.icon, DEFAULT_CATEGORY_ICON);
        assert_eq!(cat.color, DEFAULT_CATEGORY_COLOR);
    }

    #[test]
    fn blank_name_is_rejected() {
        let db = StoreDb::open_in_memory().unwrap();
        assert!(matches!(
            add_category(db.connection(), "   ", None, None),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn fetch_sorts_by_name() {
        let db = StoreDb::open_in_memory().unwrap();
        for name in ["Work", "Games", "Tools"] {
            add_category(db.connection(), name, None, None).unwrap();
        }
        let names: Vec<_> = fetch_categories(db.connection())
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Games", "Tools", "Work"]);
    }

    #[test]
    fn update_changes_only_given_fields() {
        let db = StoreDb::open_in_memory().unwrap();
        let cat = add_category(db.connection(), "Games", Some("star.fill"), Some("red")).unwrap();

        let updated = update_category(
            db.connection(),
            &cat.uuid,
            &CategoryUpdate {
                color: Some("green".into()),
                ..CategoryUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(updated.name, "Games");
        assert_eq!(updated.icon, "star.fill");
        assert_eq!(updated.color, "green");
        assert_eq!(
            get_category_record(db.connection(), &cat.uuid).unwrap(),
            Some(updated)
        );
    }

    #[test]
    fn update_unknown_category_fails() {
        let db = StoreDb::open_in_memory().unwrap();
        let err = update_category(db.connection(), "missing", &CategoryUpdate::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::CategoryNotFound(_)));
    }

    #[test]
    fn delete_missing_category_returns_false() {
        let mut db = StoreDb::open_in_memory().unwrap();
        assert!(!delete_category(db.connection_mut(), "missing").unwrap());
    }

    #[test]
    fn palettes_contain_defaults() {
        assert!(CATEGORY_COLORS.contains(&DEFAULT_CATEGORY_COLOR));
        assert!(CATEGORY_ICONS.iter().any(|(_, g)| *g == DEFAULT_CATEGORY_ICON));
    }
}
