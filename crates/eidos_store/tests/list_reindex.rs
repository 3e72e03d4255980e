use eidos_store::{
    CreateSubmodelInput, EidosError, EidosResult, EidosStore, ElementDeleteApi, ElementPayload,
    ElementReadApi, ElementWriteApi, ListElement, Property, SubmodelApi, SubmodelElement,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::tempdir;

fn property(id_short: &str, value: &str) -> SubmodelElement {
    SubmodelElement::new(
        id_short,
        ElementPayload::Property(Property {
            value_type: "xs:int".to_string(),
            value: Some(value.to_string()),
        }),
    )
}

fn list_of(id_short: &str, children: Vec<SubmodelElement>) -> SubmodelElement {
    SubmodelElement::new(
        id_short,
        ElementPayload::List(ListElement {
            order_relevant: true,
            type_value_list_element: None,
            value_type_list_element: None,
            value: children,
        }),
    )
}

async fn list_member_rows(store: &EidosStore, prefix: &str) -> EidosResult<Vec<(i32, String)>> {
    let rows = store
        .connection()
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT position, idshort_path FROM eidos_submodel_element \
             WHERE idshort_path LIKE ? ORDER BY position",
            [format!("{prefix}[%").into()],
        ))
        .await
        .map_err(eidos_store::EidosError::from)?;
    let mut members = Vec::new();
    for row in rows {
        let position: i32 = row
            .try_get("", "position")
            .map_err(eidos_store::EidosError::from)?;
        let path: String = row
            .try_get("", "idshort_path")
            .map_err(eidos_store::EidosError::from)?;
        members.push((position, path));
    }
    Ok(members)
}

#[tokio::test]
async fn deleting_the_first_member_shifts_the_rest_down() -> EidosResult<()> {
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
            list_of("lst", vec![property("a", "0"), property("b", "1")]),
        )
        .await?;

    store.delete_element("sm1", "lst[0]").await?;

    let loaded = store.get_element("sm1", "lst").await?;
    assert_eq!(loaded.children().len(), 1);
    assert_eq!(loaded.children()[0].id_short, "b");

    // The survivor now answers at index 0 and nothing answers at index 1.
    assert_eq!(store.get_element("sm1", "lst[0]").await?.id_short, "b");
    let err = store.get_element("sm1", "lst[1]").await.unwrap_err();
    assert!(matches!(err, EidosError::NotFound { .. }));

    assert_eq!(
        list_member_rows(&store, "lst").await?,
        vec![(0, "lst[0]".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn deleting_a_middle_member_renumbers_contiguously() -> EidosResult<()> {
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
            list_of(
                "lst",
                vec![
                    property("a", "0"),
                    property("b", "1"),
                    property("c", "2"),
                    property("d", "3"),
                ],
            ),
        )
        .await?;

    store.delete_element("sm1", "lst[1]").await?;

    let loaded = store.get_element("sm1", "lst").await?;
    let names: Vec<&str> = loaded
        .children()
        .iter()
        .map(|child| child.id_short.as_str())
        .collect();
    assert_eq!(names, ["a", "c", "d"]);

    assert_eq!(
        list_member_rows(&store, "lst").await?,
        vec![
            (0, "lst[0]".to_string()),
            (1, "lst[1]".to_string()),
            (2, "lst[2]".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn renumbering_rewrites_descendant_paths_too() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;

    let collection = |name: &str, value: &str| {
        SubmodelElement::new(
            name,
            ElementPayload::Collection(vec![property("p", value)]),
        )
    };
    store
        .create_element(
            "sm1",
            list_of(
                "lst",
                vec![
                    collection("c0", "0"),
                    collection("c1", "1"),
                    collection("c2", "2"),
                ],
            ),
        )
        .await?;

    store.delete_element("sm1", "lst[1]").await?;

    // What used to live at lst[2].p is addressable at lst[1].p now.
    let moved = store.get_element("sm1", "lst[1].p").await?;
    match &moved.payload {
        ElementPayload::Property(property) => {
            assert_eq!(property.value.as_deref(), Some("2"));
        }
        other => panic!("expected a property payload, got {other:?}"),
    }
    let err = store.get_element("sm1", "lst[2].p").await.unwrap_err();
    assert!(matches!(err, EidosError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn deleting_the_last_member_needs_no_renumbering() -> EidosResult<()> {
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
            list_of("lst", vec![property("a", "0"), property("b", "1")]),
        )
        .await?;

    store.delete_element("sm1", "lst[1]").await?;

    assert_eq!(
        list_member_rows(&store, "lst").await?,
        vec![(0, "lst[0]".to_string())]
    );
    assert_eq!(store.get_element("sm1", "lst[0]").await?.id_short, "a");
    Ok(())
}
