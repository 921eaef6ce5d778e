use relq_core::query::{
    SelectQuery, compile_delete, compile_insert, compile_raw, compile_select, compile_update,
    via_filter,
};
use relq_core::relation::expand;
use relq_core::{
    CompareOp, Conditions, Depth, Dialect, FieldMap, FieldSelection, Order, Registry,
    RelationshipSpec, TableSpec, Via,
};
use serde_json::{Value, json};

fn registry() -> Registry {
    let registry = Registry::new();
    registry
        .register("user", TableSpec::from_fields(["id", "last_name", "age"]))
        .unwrap();
    registry
        .register(
            "book",
            TableSpec::from_fields(["id", "author_id", "title"])
                .relationship(
                    "author",
                    RelationshipSpec::has_one("user", "id").local("author_id"),
                )
                .relationship(
                    "siblings",
                    RelationshipSpec::has_many("book", "author_id").local("author_id"),
                ),
        )
        .unwrap();
    registry
        .register(
            "person",
            TableSpec::from_fields(["id", "mother_id", "father_id"])
                .relationship(
                    "mother",
                    RelationshipSpec::has_one("person", "id")
                        .local("mother_id")
                        .optional(true),
                )
                .relationship(
                    "father",
                    RelationshipSpec::has_one("person", "id")
                        .local("father_id")
                        .optional(true),
                ),
        )
        .unwrap();
    registry
}

fn row(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        _ => FieldMap::new(),
    }
}

#[test]
fn plain_select() {
    let registry = registry();
    let book = registry.lookup("book").unwrap();

    let query = SelectQuery::new(book).conditions(Conditions::new().eq("id", 1));
    assert_eq!(
        compile_select(&registry, Dialect::MySQL, &query).unwrap(),
        "SELECT `id`, `author_id`, `title` FROM `book` WHERE `book`.`id` = 1"
    );
}

#[test]
fn select_with_order_limit_and_page() {
    let registry = registry();
    let book = registry.lookup("book").unwrap();

    let query = SelectQuery::new(book)
        .fields(FieldSelection::Include(vec!["title".into()]))
        .order(Some(Order::by("title").desc("id")))
        .limit(Some(2))
        .page(Some(2));
    assert_eq!(
        compile_select(&registry, Dialect::SQLite, &query).unwrap(),
        "SELECT `id`, `title` FROM `book` ORDER BY `book`.`title`, `book`.`id` DESC LIMIT 2, 2"
    );
}

#[test]
fn select_with_or_groups() {
    let registry = registry();
    let user = registry.lookup("user").unwrap();

    let conditions = Conditions::try_from(json!([
        {"last_name": "Link"},
        {"age": {"op": ">", "value": 60}, "last_name": {"op": "!=", "value": null}},
    ]))
    .unwrap();
    let query = SelectQuery::new(user).conditions(conditions);
    assert_eq!(
        compile_select(&registry, Dialect::MySQL, &query).unwrap(),
        "SELECT `id`, `last_name`, `age` FROM `user` WHERE ((`user`.`last_name` = 'Link') \
         OR (`user`.`age` > 60 AND `user`.`last_name` IS NOT NULL))"
    );
}

#[test]
fn has_one_join() {
    let registry = registry();
    let book = registry.lookup("book").unwrap();
    let specs = vec![(
        "author".to_string(),
        book.relationship("author").unwrap().clone(),
    )];
    let tree = expand(&registry, &book, &specs, Depth::Levels(1)).unwrap();

    let query = SelectQuery::new(book)
        .relationships(tree)
        .conditions(Conditions::new().eq("id", 2));
    assert_eq!(
        compile_select(&registry, Dialect::MySQL, &query).unwrap(),
        "SELECT `book`.`id` AS `book:@:id`, `book`.`author_id` AS `book:@:author_id`, \
         `book`.`title` AS `book:@:title`, `user`.`id` AS `user:@:id`, \
         `user`.`last_name` AS `user:@:last_name`, `user`.`age` AS `user:@:age` \
         FROM `book` INNER JOIN `user` AS `user` ON `book`.`author_id` = `user`.`id` \
         WHERE `book`.`id` = 2"
    );
}

#[test]
fn foreign_conditions_join_in_the_on_clause() {
    let registry = registry();
    let book = registry.lookup("book").unwrap();
    let specs = vec![(
        "elder".to_string(),
        RelationshipSpec::has_one("user", "id")
            .local("author_id")
            .alias("elder")
            .optional(true)
            .conditions(Conditions::new().compare("age", CompareOp::Gt, 60)),
    )];
    let tree = expand(&registry, &book, &specs, Depth::Levels(1)).unwrap();

    let query = SelectQuery::new(book)
        .fields(FieldSelection::Include(vec!["id".into()]))
        .relationships(tree);
    assert_eq!(
        compile_select(&registry, Dialect::MySQL, &query).unwrap(),
        "SELECT `book`.`id` AS `book:@:id`, `elder`.`id` AS `elder:@:id` FROM `book` \
         LEFT JOIN `user` AS `elder` ON `book`.`author_id` = `elder`.`id` AND `elder`.`age` > 60"
    );
}

#[test]
fn self_joins_get_unique_aliases() {
    let registry = registry();
    let person = registry.lookup("person").unwrap();
    let tree = expand(&registry, &person, person.relationships(), Depth::Levels(1)).unwrap();

    let query = SelectQuery::new(person)
        .fields(FieldSelection::Include(vec!["id".into()]))
        .relationships(tree);
    assert_eq!(
        compile_select(&registry, Dialect::SQLite, &query).unwrap(),
        "SELECT `person`.`id` AS `person:@:id`, `person_2`.`id` AS `person_2:@:id`, \
         `person_3`.`id` AS `person_3:@:id` FROM `person` \
         LEFT JOIN `person` AS `person_2` ON `person`.`mother_id` = `person_2`.`id` \
         LEFT JOIN `person` AS `person_3` ON `person`.`father_id` = `person_3`.`id`"
    );
}

#[test]
fn has_many_keeps_its_local_key_selected() {
    let registry = registry();
    let book = registry.lookup("book").unwrap();
    let specs = vec![(
        "siblings".to_string(),
        book.relationship("siblings").unwrap().clone(),
    )];
    let tree = expand(&registry, &book, &specs, Depth::Levels(1)).unwrap();

    let query = SelectQuery::new(book)
        .fields(FieldSelection::Include(vec!["title".into()]))
        .relationships(tree);
    assert_eq!(
        compile_select(&registry, Dialect::MySQL, &query).unwrap(),
        "SELECT `book`.`id` AS `book:@:id`, `book`.`title` AS `book:@:title`, \
         `book`.`author_id` AS `book:@:author_id` FROM `book`"
    );
}

#[test]
fn raw_templates() {
    let params = [json!("it's"), json!(3)];
    let template = "SELECT * FROM $table WHERE title = ? AND id > ?";

    assert_eq!(
        compile_raw(Dialect::MySQL, "book", template, &params).unwrap(),
        "SELECT * FROM `book` WHERE title = 'it\\'s' AND id > 3"
    );
    assert_eq!(
        compile_raw(Dialect::SQLite, "book", template, &params).unwrap(),
        "SELECT * FROM `book` WHERE title = 'it''s' AND id > 3"
    );
    assert!(compile_raw(Dialect::SQLite, "book", template, &params[..1]).is_err());
    assert!(compile_raw(Dialect::SQLite, "book", "SELECT 1", &params).is_err());
}

#[test]
fn raw_conditions_bypass_the_select_builder() {
    let registry = registry();
    let book = registry.lookup("book").unwrap();

    let query = SelectQuery::new(book)
        .conditions(Conditions::raw("SELECT id FROM $TABLE LIMIT ?", [json!(1)]))
        .limit(Some(10));
    assert_eq!(
        compile_select(&registry, Dialect::SQLite, &query).unwrap(),
        "SELECT id FROM `book` LIMIT 1"
    );
}

#[test]
fn inserts() {
    assert_eq!(
        compile_insert(
            Dialect::SQLite,
            "book",
            &row(json!({"title": "Airships", "release_date": 1978, "tags": ["a", "b"]}))
        ),
        "INSERT INTO `book` (`title`, `release_date`, `tags`) \
         VALUES ('Airships', 1978, '[\"a\",\"b\"]')"
    );
    assert_eq!(
        compile_insert(Dialect::SQLite, "book", &FieldMap::new()),
        "INSERT INTO `book` DEFAULT VALUES"
    );
    assert_eq!(
        compile_insert(Dialect::MySQL, "book", &FieldMap::new()),
        "INSERT INTO `book` () VALUES ()"
    );
}

#[test]
fn single_row_updates() {
    let row = row(json!({"id": 4, "first_name": "Sean"}));
    let keys = ["id".to_string()];

    assert_eq!(
        compile_update(Dialect::MySQL, "user", &row, &keys).unwrap(),
        "UPDATE `user` SET `id` = 4, `first_name` = 'Sean' WHERE `user`.`id` = 4 LIMIT 1"
    );
    assert_eq!(
        compile_update(Dialect::SQLite, "user", &row, &keys).unwrap(),
        "UPDATE `user` SET `id` = 4, `first_name` = 'Sean' WHERE rowid IN \
         (SELECT rowid FROM `user` WHERE `user`.`id` = 4 LIMIT 1)"
    );
    assert!(compile_update(Dialect::MySQL, "user", &row, &["email".to_string()]).is_err());
}

#[test]
fn deletes() {
    let conditions = Conditions::new().eq("author_id", 1);

    assert_eq!(
        compile_delete(Dialect::MySQL, "book", &conditions, Some(1)).unwrap(),
        "DELETE FROM `book` WHERE `book`.`author_id` = 1 LIMIT 1"
    );
    assert_eq!(
        compile_delete(Dialect::SQLite, "book", &conditions, Some(1)).unwrap(),
        "DELETE FROM `book` WHERE rowid IN \
         (SELECT rowid FROM `book` WHERE `book`.`author_id` = 1 LIMIT 1)"
    );
    assert_eq!(
        compile_delete(Dialect::SQLite, "book", &Conditions::new(), None).unwrap(),
        "DELETE FROM `book`"
    );
}

#[test]
fn bridge_table_filter() {
    let via = Via::new("viaThrough", "primary_id", "secondary_id");
    assert_eq!(
        via_filter(Dialect::SQLite, "viaSecondary", "id", &via, &json!(1)),
        "`viaSecondary`.`id` IN (SELECT `viaThrough`.`secondary_id` FROM `viaThrough` \
         WHERE `viaThrough`.`primary_id` = 1)"
    );
}
