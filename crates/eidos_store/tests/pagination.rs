use std::collections::HashSet;

use eidos_store::{
    CreateSubmodelInput, EidosError, EidosResult, EidosStore, ElementPayload, ElementReadApi,
    ElementWriteApi, ListElementsInput, Property, SubmodelApi, SubmodelElement,
};
use tempfile::tempdir;

fn property(id_short: &str) -> SubmodelElement {
    SubmodelElement::new(
        id_short,
        ElementPayload::Property(Property {
            value_type: "xs:string".to_string(),
            value: Some(id_short.to_string()),
        }),
    )
}

#[tokio::test]
async fn paging_visits_every_root_once_in_id_short_order() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;

    // Insertion order deliberately differs from idShort order.
    for name in ["delta", "alpha", "echo", "charlie", "bravo"] {
        store.create_element("sm1", property(name)).await?;
    }

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store
            .list_elements(ListElementsInput {
                submodel: "sm1".to_string(),
                limit: 2,
                cursor: cursor.clone(),
            })
            .await?;
        if page.elements.is_empty() {
            assert_eq!(page.next_cursor, None);
            break;
        }
        for element in &page.elements {
            seen.push(element.id_short.clone());
        }
        cursor = page.next_cursor;
        assert!(cursor.is_some());
    }

    assert_eq!(seen, ["alpha", "bravo", "charlie", "delta", "echo"]);
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(unique.len(), seen.len());
    Ok(())
}

#[tokio::test]
async fn paged_roots_carry_their_subtrees() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;

    store
        .create_element(
            "sm1",
            SubmodelElement::new(
                "machine",
                ElementPayload::Collection(vec![property("state"), property("vendor")]),
            ),
        )
        .await?;

    let page = store
        .list_elements(ListElementsInput {
            submodel: "sm1".to_string(),
            limit: 10,
            cursor: None,
        })
        .await?;
    assert_eq!(page.elements.len(), 1);
    let children = page.elements[0].children();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].id_short, "state");
    assert_eq!(children[1].id_short, "vendor");
    Ok(())
}

#[tokio::test]
async fn missing_submodel_is_not_found() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;

    let err = store
        .list_elements(ListElementsInput {
            submodel: "missing-sm".to_string(),
            limit: 10,
            cursor: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn unknown_cursor_is_a_bad_request() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;
    store.create_element("sm1", property("p1")).await?;

    let err = store
        .list_elements(ListElementsInput {
            submodel: "sm1".to_string(),
            limit: 10,
            cursor: Some("not-a-real-idshort".to_string()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::BadRequest { .. }));
    Ok(())
}
