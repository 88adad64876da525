use chrono::{DateTime, TimeZone, Utc};
use docwire::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Contact {
    name: String,
    year: i64,
    #[serde(with = "docwire::timestamp")]
    birthday: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct City {
    name: String,
    state: String,
}

fn contact(name: &str, year: i64, tags: &[&str]) -> Contact {
    Contact {
        name: name.to_string(),
        year,
        birthday: Utc.with_ymd_and_hms(year as i32, 3, 1, 0, 0, 0).unwrap(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

fn names(docs: &[Doc<Contact>]) -> Vec<&str> {
    docs.iter().map(|doc| doc.data.name.as_str()).collect()
}

async fn contacts_store() -> (DocumentStore<InMemoryStore>, Collection<Contact>) {
    let store = DocumentStore::new(InMemoryStore::new());
    let contacts = collection::<Contact>("contacts");

    store.set((&contacts, "sasha"), &contact("Sasha", 1987, &["friend"])).await.unwrap();
    store.set((&contacts, "tati"), &contact("Tati", 1989, &["family", "friend"])).await.unwrap();
    store.set((&contacts, "lesha"), &contact("Lesha", 1995, &[])).await.unwrap();

    (store, contacts)
}

#[tokio::test(flavor = "current_thread")]
async fn orders_limits_and_resumes_after_a_value() {
    let (store, contacts) = contacts_store().await;

    let first = store
        .query(&contacts, Query::from(vec![order("year", Direction::Asc, []), limit(2)]))
        .await
        .unwrap();
    assert_eq!(names(&first), vec!["Sasha", "Tati"]);

    let second = store
        .query(
            &contacts,
            Query::from(vec![order("year", Direction::Asc, [start_after(1989)]), limit(2)]),
        )
        .await
        .unwrap();
    assert_eq!(names(&second), vec!["Lesha"]);
}

#[tokio::test(flavor = "current_thread")]
async fn rejects_inequalities_on_two_fields() {
    let (store, contacts) = contacts_store().await;
    let cutoff = Utc.with_ymd_and_hms(1988, 1, 1, 0, 0, 0).unwrap();

    let result = store
        .query(
            &contacts,
            Query::from(vec![Filter::gt("year", 1989), Filter::gt("birthday", cutoff)]),
        )
        .await;

    assert!(matches!(result, Err(DocumentStoreError::QueryExecution(_))));
}

#[tokio::test(flavor = "current_thread")]
async fn pages_enumerate_every_document_once() {
    let store = DocumentStore::new(InMemoryStore::new());
    let contacts = collection::<Contact>("contacts");
    for (index, year) in [1991, 1984, 1999, 1987, 1993, 1980, 1996].into_iter().enumerate() {
        store
            .set((&contacts, format!("c{index}")), &contact(&format!("c{index}"), year, &[]))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut page = store
        .query(
            &contacts,
            Query::from(vec![order("year", Direction::Asc, [start_at(1984)]), limit(3)]),
        )
        .await
        .unwrap();
    while !page.is_empty() {
        let last_year = page[page.len() - 1].data.year;
        seen.extend(page.iter().map(|doc| doc.data.year));
        page = store
            .query(
                &contacts,
                Query::from(vec![
                    order("year", Direction::Asc, [start_after(last_year)]),
                    limit(3),
                ]),
            )
            .await
            .unwrap();
    }

    assert_eq!(seen, vec![1984, 1987, 1991, 1993, 1996, 1999]);
}

#[tokio::test(flavor = "current_thread")]
async fn query_page_handles_equal_values() {
    let store = DocumentStore::new(InMemoryStore::new());
    let contacts = collection::<Contact>("contacts");
    for (id, year) in [("a", 1990), ("b", 1990), ("c", 1990), ("d", 1985), ("e", 1995)] {
        store.set((&contacts, id), &contact(id, year, &[])).await.unwrap();
    }

    let mut ids = Vec::new();
    let mut query = Some(Query::from(order_by("year")));
    let mut pages = 0;
    while let Some(current) = query {
        let page = store.query_page(&contacts, current, 2).await.unwrap();
        pages += 1;
        ids.extend(page.items.iter().map(|doc| doc.id().to_string()));
        query = page.next_query().cloned();
    }

    assert_eq!(ids, vec!["d", "a", "b", "c", "e"]);
    assert_eq!(pages, 3);
}

#[tokio::test(flavor = "current_thread")]
async fn query_page_rejects_empty_pages() {
    let (store, contacts) = contacts_store().await;

    let result = store.query_page(&contacts, Query::new(), 0).await;

    assert!(matches!(result, Err(DocumentStoreError::InvalidQuery(_))));
}

#[tokio::test(flavor = "current_thread")]
async fn cursors_from_documents() {
    let (store, contacts) = contacts_store().await;
    let all = store.query(&contacts, Query::from(order_by("year"))).await.unwrap();

    let after_sasha = store
        .query(
            &contacts,
            Query::from(order("year", Direction::Asc, [Cursor::start_after_doc(&all[0])])),
        )
        .await
        .unwrap();
    let until_tati = store
        .query(&contacts, Query::from(order("year", Direction::Asc, [Cursor::end_at_doc(&all[1])])))
        .await
        .unwrap();

    assert_eq!(names(&after_sasha), vec!["Tati", "Lesha"]);
    assert_eq!(names(&until_tati), vec!["Sasha", "Tati"]);
}

#[tokio::test(flavor = "current_thread")]
async fn unbounded_cursor_applies_no_bound() {
    let (store, contacts) = contacts_store().await;

    let docs = store
        .query(
            &contacts,
            Query::from(vec![
                order(
                    "year",
                    Direction::Asc,
                    [Cursor::optional(CursorKind::StartAfter, None::<i64>)],
                ),
                limit(2),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(names(&docs), vec!["Sasha", "Tati"]);
}

#[tokio::test(flavor = "current_thread")]
async fn cursors_span_several_orderings() {
    let store = DocumentStore::new(InMemoryStore::new());
    let cities = collection::<City>("cities");
    for (id, name, state) in [
        ("sf-ma", "Springfield", "Massachusetts"),
        ("sf-mo", "Springfield", "Missouri"),
        ("sf-wi", "Springfield", "Wisconsin"),
        ("jc-mo", "Jefferson City", "Missouri"),
        ("bos-ma", "Boston", "Massachusetts"),
    ] {
        store
            .set((&cities, id), &City { name: name.to_string(), state: state.to_string() })
            .await
            .unwrap();
    }

    let docs = store
        .query(
            &cities,
            Query::from(vec![
                order("state", Direction::Asc, [start_at("Missouri")]),
                order("name", Direction::Asc, [start_at("Springfield")]),
            ]),
        )
        .await
        .unwrap();

    let ids: Vec<&str> = docs.iter().map(|doc| doc.id()).collect();
    assert_eq!(ids, vec!["sf-mo", "sf-wi"]);
}

#[tokio::test(flavor = "current_thread")]
async fn mixed_cursor_kinds_are_invalid() {
    let (store, contacts) = contacts_store().await;

    let result = store
        .query(
            &contacts,
            Query::from(vec![
                order("year", Direction::Asc, [start_at(1987)]),
                order("name", Direction::Asc, [start_after("Sasha")]),
            ]),
        )
        .await;

    assert!(matches!(result, Err(DocumentStoreError::InvalidQuery(_))));
}

#[tokio::test(flavor = "current_thread")]
async fn descending_order_with_end_cursor() {
    let (store, contacts) = contacts_store().await;

    let docs = store
        .query(&contacts, Query::from(order("year", Direction::Desc, [end_before(1987)])))
        .await
        .unwrap();

    assert_eq!(names(&docs), vec!["Lesha", "Tati"]);
}

#[tokio::test(flavor = "current_thread")]
async fn filters_on_arrays_and_sets() {
    let (store, contacts) = contacts_store().await;

    let friends = store
        .query(
            &contacts,
            Query::from(vec![Filter::array_contains("tags", "friend"), order_by("year")]),
        )
        .await
        .unwrap();
    let chosen = store
        .query(
            &contacts,
            Query::from(vec![Filter::is_in("name", ["Lesha", "Sasha"]), order_by("year")]),
        )
        .await
        .unwrap();
    let any = store
        .query(
            &contacts,
            Query::from(vec![Filter::array_contains_any("tags", ["family", "work"])]),
        )
        .await
        .unwrap();

    assert_eq!(names(&friends), vec!["Sasha", "Tati"]);
    assert_eq!(names(&chosen), vec!["Sasha", "Lesha"]);
    assert_eq!(names(&any), vec!["Tati"]);
}

#[tokio::test(flavor = "current_thread")]
async fn filters_by_timestamp_and_document_id() {
    let (store, contacts) = contacts_store().await;
    let cutoff = Utc.with_ymd_and_hms(1988, 1, 1, 0, 0, 0).unwrap();

    let younger = store
        .query(&contacts, Query::from(Filter::gt("birthday", cutoff)))
        .await
        .unwrap();
    let tati = store
        .query(&contacts, Query::from(Filter::eq(FieldPath::document_id(), "tati")))
        .await
        .unwrap();

    assert_eq!(names(&younger), vec!["Tati", "Lesha"]);
    assert_eq!(names(&tati), vec!["Tati"]);
}

#[tokio::test(flavor = "current_thread")]
async fn filter_order_is_preserved_in_combined_queries() {
    let (store, contacts) = contacts_store().await;

    let query = Query::builder()
        .filter("year", WhereOp::Gte, 1989)
        .order_by("year")
        .build()
        .and(Filter::array_contains("tags", "friend"));

    let docs = store.query(&contacts, query).await.unwrap();

    assert_eq!(names(&docs), vec!["Tati"]);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Address {
    city: String,
    zip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Resident {
    name: String,
    address: Address,
}

#[tokio::test(flavor = "current_thread")]
async fn filters_and_orders_on_nested_fields() {
    let store = DocumentStore::new(InMemoryStore::new());
    let residents = collection::<Resident>("residents");
    let resident = |name: &str, city: &str, zip: &str| Resident {
        name: name.to_string(),
        address: Address { city: city.to_string(), zip: zip.to_string() },
    };

    store.set((&residents, "a"), &resident("Homer", "Springfield", "49007")).await.unwrap();
    store.set((&residents, "b"), &resident("Ned", "Shelbyville", "49008")).await.unwrap();
    store.set((&residents, "c"), &resident("Marge", "Springfield", "49001")).await.unwrap();

    let springfield = store
        .query(
            &residents,
            Query::from(vec![
                Filter::eq(["address", "city"], "Springfield"),
                order_by(["address", "zip"]),
            ]),
        )
        .await
        .unwrap();
    let names: Vec<&str> = springfield.iter().map(|doc| doc.data.name.as_str()).collect();

    assert_eq!(names, vec!["Marge", "Homer"]);
}

#[tokio::test(flavor = "current_thread")]
async fn field_operations_are_not_query_values() {
    let (store, contacts) = contacts_store().await;

    let cleared = store.query(&contacts, Query::from(Filter::eq("name", Value::clear()))).await;
    let incremented = store
        .query(&contacts, Query::from(Filter::eq("year", Value::increment(1))))
        .await;
    let cursor = store
        .query(
            &contacts,
            Query::from(order("year", Direction::Asc, [start_at(Value::increment(0))])),
        )
        .await;

    assert!(matches!(cleared, Err(DocumentStoreError::InvalidQuery(_))));
    assert!(matches!(incremented, Err(DocumentStoreError::InvalidQuery(_))));
    assert!(matches!(cursor, Err(DocumentStoreError::InvalidQuery(_))));
}
