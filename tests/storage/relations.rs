//! Integration tests for memory storage relations

use cadence_foundation::{Fields, Value, fields};
use cadence_storage::{ConceptStorage, MemoryStorage, WriteOutcome};

fn user(name: &str, role: &str) -> Fields {
    fields([("name", Value::from(name)), ("role", Value::from(role))])
}

#[test]
fn put_get_del() {
    let storage = MemoryStorage::new();
    assert_eq!(
        storage.put("users", "ann", user("ann", "admin")).unwrap(),
        WriteOutcome::Written
    );
    assert_eq!(
        storage.get("users", "ann").unwrap(),
        Some(user("ann", "admin"))
    );
    assert!(storage.get("users", "bob").unwrap().is_none());
    assert!(storage.get("groups", "ann").unwrap().is_none());

    assert!(storage.del("users", "ann").unwrap());
    assert!(!storage.del("users", "ann").unwrap());
    assert!(storage.get("users", "ann").unwrap().is_none());
}

#[test]
fn find_filters_on_every_field() {
    let storage = MemoryStorage::new();
    storage.put("users", "ann", user("ann", "admin")).unwrap();
    storage.put("users", "bob", user("bob", "member")).unwrap();
    storage.put("users", "cyd", user("cyd", "admin")).unwrap();

    assert_eq!(storage.find("users", None).unwrap().len(), 3);

    let admins = storage
        .find("users", Some(&fields([("role", Value::from("admin"))])))
        .unwrap();
    assert_eq!(admins.len(), 2);

    let nobody = storage
        .find(
            "users",
            Some(&fields([
                ("role", Value::from("admin")),
                ("name", Value::from("bob")),
            ])),
        )
        .unwrap();
    assert!(nobody.is_empty());
    assert!(storage.find("missing", None).unwrap().is_empty());
}

#[test]
fn without_handler_last_writer_wins() {
    let storage = MemoryStorage::new();
    storage.put("users", "ann", user("ann", "admin")).unwrap();
    assert_eq!(
        storage.put("users", "ann", user("ann", "member")).unwrap(),
        WriteOutcome::Written
    );
    assert_eq!(
        storage.get("users", "ann").unwrap(),
        Some(user("ann", "member"))
    );
}

#[test]
fn relations_and_counts() {
    let storage = MemoryStorage::new();
    storage.put("users", "ann", user("ann", "admin")).unwrap();
    storage.put("groups", "ops", Fields::new()).unwrap();
    storage.put("groups", "dev", Fields::new()).unwrap();

    assert_eq!(storage.relations().unwrap(), vec!["groups", "users"]);
    assert_eq!(storage.count("groups").unwrap(), 2);
    assert_eq!(storage.count("missing").unwrap(), 0);

    storage.del("users", "ann").unwrap();
    assert_eq!(storage.relations().unwrap(), vec!["groups"]);
}
