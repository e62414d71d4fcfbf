use halite::doc;
use halite::errors::HaliteResult;
use halite::store::{DataStore, StoreOptions};
use halite::Document;

/// Opens a fresh store backed by its own private in-memory journal.
pub fn create_test_store() -> HaliteResult<DataStore> {
    DataStore::open(StoreOptions::new())
}

/// A small set of heterogeneous documents used across tests.
pub fn create_test_docs() -> Vec<Document> {
    vec![
        doc! {
            "_id": "mercury",
            name: "Mercury",
            kind: "planet",
            moons: 0,
            radius_km: 2439.7
        },
        doc! {
            "_id": "earth",
            name: "Earth",
            kind: "planet",
            moons: 1,
            radius_km: 6371.0,
            tags: ["habitable", "wet"]
        },
        doc! {
            "_id": "mars",
            name: "Mars",
            kind: "planet",
            moons: 2,
            radius_km: 3389.5,
            tags: ["dusty"]
        },
    ]
}

/// Runs a test body against a fresh store, converting any returned error
/// into a test failure.
pub fn run_test<T>(test: T)
where
    T: FnOnce(DataStore) -> HaliteResult<()>,
{
    let store = create_test_store().expect("Failed to open test store");
    if let Err(err) = test(store) {
        panic!("Test failed: {:?}", err);
    }
}
