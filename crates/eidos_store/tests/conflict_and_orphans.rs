use eidos_store::{
    CreateSubmodelInput, EidosError, EidosResult, EidosStore, ElementDeleteApi, ElementPayload,
    ElementReadApi, ElementWriteApi, Property, SubmodelApi, SubmodelElement,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::tempdir;

fn property(id_short: &str) -> SubmodelElement {
    SubmodelElement::new(
        id_short,
        ElementPayload::Property(Property {
            value_type: "xs:string".to_string(),
            value: Some("v".to_string()),
        }),
    )
}

async fn store_with_submodel(path: &std::path::Path) -> EidosResult<(EidosStore, i64)> {
    let store = EidosStore::connect_sqlite(&path.join("eidos.sqlite")).await?;
    let submodel_id = store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;
    Ok((store, submodel_id))
}

#[tokio::test]
async fn duplicate_paths_conflict_instead_of_overwriting() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let (store, _) = store_with_submodel(dir.path()).await?;

    store.create_element("sm1", property("p1")).await?;
    let err = store
        .create_element("sm1", property("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::Conflict { .. }));

    // Nested duplicates collide on the materialized path as well.
    store
        .create_element(
            "sm1",
            SubmodelElement::new("box", ElementPayload::Collection(vec![property("inner")])),
        )
        .await?;
    let err = store
        .create_element_at("sm1", "box", property("inner"))
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::Conflict { .. }));
    Ok(())
}

#[tokio::test]
async fn duplicate_submodel_identifiers_conflict() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let (store, _) = store_with_submodel(dir.path()).await?;

    let err = store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::Conflict { .. }));
    Ok(())
}

#[tokio::test]
async fn leaf_elements_never_adopt_orphan_rows() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let (store, submodel_id) = store_with_submodel(dir.path()).await?;

    let property_id = store.create_element("sm1", property("p1")).await?;

    // A stray row pointing at a leaf parent, as forward-incompatible or
    // corrupted data might leave behind.
    store
        .connection()
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "INSERT INTO eidos_submodel_element \
             (submodel_id, parent_sme_id, root_sme_id, position, id_short, model_type, idshort_path) \
             VALUES (?, ?, ?, 0, 'orphan', 9, 'p1.orphan')",
            [submodel_id.into(), property_id.into(), property_id.into()],
        ))
        .await
        .map_err(EidosError::from)?;

    let loaded = store.get_element("sm1", "p1").await?;
    assert_eq!(loaded, property("p1"));
    assert!(loaded.children().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_model_type_rows_are_skipped_not_fatal() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let (store, submodel_id) = store_with_submodel(dir.path()).await?;

    store.create_element("sm1", property("p1")).await?;
    store
        .connection()
        .execute(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "INSERT INTO eidos_submodel_element \
             (submodel_id, position, id_short, model_type, idshort_path) \
             VALUES (?, 1, 'future', 99, 'future')",
            [submodel_id.into()],
        ))
        .await
        .map_err(EidosError::from)?;

    let page = store
        .list_elements(eidos_store::ListElementsInput {
            submodel: "sm1".to_string(),
            limit: 10,
            cursor: None,
        })
        .await?;
    let names: Vec<&str> = page
        .elements
        .iter()
        .map(|element| element.id_short.as_str())
        .collect();
    assert_eq!(names, ["p1"]);
    Ok(())
}

#[tokio::test]
async fn leaf_parents_reject_children_on_create() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let (store, _) = store_with_submodel(dir.path()).await?;

    store.create_element("sm1", property("p1")).await?;
    let err = store
        .create_element_at("sm1", "p1", property("child"))
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::BadRequest { .. }));
    Ok(())
}

#[tokio::test]
async fn empty_id_short_is_rejected_outside_lists() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let (store, _) = store_with_submodel(dir.path()).await?;

    let err = store.create_element("sm1", property("")).await.unwrap_err();
    assert!(matches!(err, EidosError::BadRequest { .. }));
    Ok(())
}

#[tokio::test]
async fn delete_error_taxonomy() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let (store, _) = store_with_submodel(dir.path()).await?;

    let err = store.delete_element("sm1", "nope").await.unwrap_err();
    assert!(matches!(err, EidosError::NotFound { .. }));

    // A ]-terminated path whose tail is not a well-formed index fails before
    // any row is touched.
    let err = store.delete_element("sm1", "lst[x]").await.unwrap_err();
    assert!(matches!(err, EidosError::BadRequest { .. }));
    Ok(())
}
