#![cfg(feature = "rusqlite")]
#![allow(dead_code)]

use relq::prelude::*;
use serde_json::{Value, json};

pub type Db = Database<SqliteBackend>;

const SCHEMA: &str = "
CREATE TABLE user (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  first_name TEXT,
  last_name TEXT,
  age INTEGER
);
CREATE TABLE book (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  author_id INTEGER,
  title TEXT NOT NULL UNIQUE,
  release_date INTEGER
);
CREATE TABLE review (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  book_id INTEGER,
  link TEXT
);
CREATE TABLE profile (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  author_id INTEGER,
  bio TEXT
);
CREATE TABLE viaPrimary (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE viaSecondary (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE viaThrough (primary_id INTEGER, secondary_id INTEGER);

INSERT INTO user (id, first_name, last_name, age) VALUES
  (1, 'George', 'Saunders', 55),
  (2, 'Barry', 'Hannah', 67),
  (3, 'Kelly', 'Link', 45);
INSERT INTO book (id, author_id, title, release_date) VALUES
  (1, 1, 'CivilWarLand in Bad Decline', 1996),
  (2, 1, 'Pastoralia', 2000),
  (3, 3, 'Stranger Things Happen', 2000),
  (4, 3, 'Magic for Beginners', 2005),
  (5, 2, 'Airships', 1978),
  (6, 1, 'Tenth of December', 2013);
INSERT INTO review (id, book_id, link) VALUES
  (1, 1, 'http://example.com/review-1'),
  (2, 1, 'http://example.com/review-2'),
  (3, 2, 'http://example.com/review-3');
INSERT INTO profile (id, author_id, bio) VALUES
  (1, 1, 'Used to be a geophysical engineer');
INSERT INTO viaPrimary (id, name) VALUES (1, 'the'), (2, 'the'), (3, 'x');
INSERT INTO viaSecondary (id, name) VALUES (1, 'as'), (2, 'as'), (3, 'zz');
INSERT INTO viaThrough (primary_id, secondary_id) VALUES (1, 1), (2, 3), (3, 2);
";

/// Fresh in-memory database loaded with the library fixture. No tables are
/// registered.
pub async fn setup_db() -> Db {
    let backend = SqliteBackend::open_in_memory().expect("Failed to create in-memory database");
    backend
        .execute_batch(SCHEMA)
        .await
        .expect("Failed to load fixture");
    Database::new(backend)
}

pub struct Library {
    pub user: Table<SqliteBackend>,
    pub book: Table<SqliteBackend>,
    pub review: Table<SqliteBackend>,
    pub profile: Table<SqliteBackend>,
}

/// Registers `user`, `book`, `review` and `profile` with their relationships:
///
/// - user.books: hasMany book.author_id
/// - user.profile: optional hasOne profile.author_id
/// - book.author: hasOne user.id
/// - book.reviews: hasMany review.book_id
/// - review.book: hasOne book.id
pub fn register_library(db: &Db) -> Library {
    let user = db
        .register(
            "user",
            TableSpec::from_fields(["id", "first_name", "last_name", "age"])
                .method("fullName", |row| {
                    let first = str_field(row, "first_name");
                    json!(format!("{first} {}", str_field(row, "last_name")))
                })
                .relationship(
                    "books",
                    RelationshipSpec::has_many("book", "author_id").local("id"),
                )
                .relationship(
                    "profile",
                    RelationshipSpec::has_one("profile", "author_id")
                        .local("id")
                        .optional(true),
                ),
        )
        .expect("register user");
    let book = db
        .register(
            "book",
            TableSpec::from_fields(["id", "author_id", "title", "release_date"])
                .relationship(
                    "author",
                    RelationshipSpec::has_one("user", "id").local("author_id"),
                )
                .relationship(
                    "reviews",
                    RelationshipSpec::has_many("review", "book_id").local("id"),
                ),
        )
        .expect("register book");
    let review = db
        .register(
            "review",
            TableSpec::from_fields(["id", "book_id", "link"]).relationship(
                "book",
                RelationshipSpec::has_one("book", "id").local("book_id"),
            ),
        )
        .expect("register review");
    let profile = db
        .register("profile", TableSpec::from_fields(["id", "author_id", "bio"]))
        .expect("register profile");

    Library {
        user,
        book,
        review,
        profile,
    }
}

pub fn str_field<'a>(row: &'a Row, field: &str) -> &'a str {
    row.get(field).and_then(Value::as_str).unwrap_or_default()
}

pub fn fields(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|row| row.get("id").and_then(Value::as_i64).unwrap_or(-1))
        .collect()
}
