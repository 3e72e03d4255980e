use eidos_store::{
    CreateSubmodelInput, EidosError, EidosResult, EidosStore, ElementPayload, ElementReadApi,
    ElementWriteApi, Key, Property, RangeElement, Reference, SubmodelApi, SubmodelElement,
};
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

#[tokio::test]
async fn update_replaces_payload_and_head_fields() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;
    store.create_element("sm1", property("p1", "5")).await?;

    let mut updated = property("p1", "42");
    updated.category = Some("VARIABLE".to_string());
    updated.semantic_id = Some(Reference {
        reference_type: "ExternalReference".to_string(),
        keys: vec![Key {
            key_type: "GlobalReference".to_string(),
            value: "urn:example:p1".to_string(),
        }],
    });
    store.update_element("sm1", "p1", updated.clone()).await?;

    let loaded = store.get_element("sm1", "p1").await?;
    assert_eq!(loaded, updated);
    Ok(())
}

#[tokio::test]
async fn update_rejects_model_type_changes() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;
    store.create_element("sm1", property("p1", "5")).await?;

    let replacement = SubmodelElement::new(
        "p1",
        ElementPayload::Range(RangeElement {
            value_type: "xs:int".to_string(),
            min: Some("0".to_string()),
            max: Some("9".to_string()),
        }),
    );
    let err = store
        .update_element("sm1", "p1", replacement)
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::BadRequest { .. }));
    Ok(())
}

#[tokio::test]
async fn update_of_a_missing_path_is_not_found() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = EidosStore::connect_sqlite(&dir.path().join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: "sm1".to_string(),
            id_short: None,
            category: None,
        })
        .await?;

    let err = store
        .update_element("sm1", "ghost", property("ghost", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, EidosError::NotFound { .. }));
    Ok(())
}
