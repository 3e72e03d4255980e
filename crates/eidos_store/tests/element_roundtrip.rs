use eidos_store::{
    BlobElement, CreateSubmodelInput, EidosResult, EidosStore, ElementDeleteApi, ElementPayload,
    ElementReadApi, ElementWriteApi, Key, LangString, ListElement, MultiLanguageProperty,
    Property, RangeElement, Reference, SubmodelApi, SubmodelElement,
};
use tempfile::tempdir;

async fn store_with_submodel(path: &std::path::Path, submodel: &str) -> EidosResult<EidosStore> {
    let store = EidosStore::connect_sqlite(&path.join("eidos.sqlite")).await?;
    store
        .create_submodel(CreateSubmodelInput {
            identifier: submodel.to_string(),
            id_short: None,
            category: None,
        })
        .await?;
    Ok(store)
}

fn int_property(id_short: &str, value: &str) -> SubmodelElement {
    SubmodelElement::new(
        id_short,
        ElementPayload::Property(Property {
            value_type: "xs:int".to_string(),
            value: Some(value.to_string()),
        }),
    )
}

#[tokio::test]
async fn root_property_round_trips() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = store_with_submodel(dir.path(), "sm1").await?;

    store
        .create_element("sm1", int_property("p1", "5"))
        .await?;

    let loaded = store.get_element("sm1", "p1").await?;
    assert_eq!(loaded.id_short, "p1");
    match &loaded.payload {
        ElementPayload::Property(property) => {
            assert_eq!(property.value.as_deref(), Some("5"));
            assert_eq!(property.value_type, "xs:int");
        }
        other => panic!("expected a property payload, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn nested_tree_round_trips_structurally() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = store_with_submodel(dir.path(), "sm1").await?;

    let mut labels = SubmodelElement::new(
        "labels",
        ElementPayload::MultiLanguageProperty(MultiLanguageProperty {
            value: vec![
                LangString {
                    language: "en".to_string(),
                    text: "Sensors".to_string(),
                },
                LangString {
                    language: "de".to_string(),
                    text: "Sensoren".to_string(),
                },
            ],
        }),
    );
    labels.category = Some("PARAMETER".to_string());

    let mut temperature = int_property("temperature", "21");
    temperature.semantic_id = Some(Reference {
        reference_type: "ExternalReference".to_string(),
        keys: vec![Key {
            key_type: "GlobalReference".to_string(),
            value: "urn:example:temperature".to_string(),
        }],
    });

    let tree = SubmodelElement::new(
        "sensors",
        ElementPayload::Collection(vec![
            labels,
            temperature,
            SubmodelElement::new(
                "window",
                ElementPayload::Range(RangeElement {
                    value_type: "xs:int".to_string(),
                    min: Some("0".to_string()),
                    max: Some("100".to_string()),
                }),
            ),
            SubmodelElement::new(
                "firmware",
                ElementPayload::Blob(BlobElement {
                    content_type: "application/octet-stream".to_string(),
                    value: vec![0xde, 0xad, 0xbe, 0xef],
                }),
            ),
            SubmodelElement::new(
                "readings",
                ElementPayload::List(ListElement {
                    order_relevant: true,
                    type_value_list_element: Some("Property".to_string()),
                    value_type_list_element: Some("xs:int".to_string()),
                    value: vec![int_property("r0", "1"), int_property("r1", "2")],
                }),
            ),
        ]),
    );

    store.create_element("sm1", tree.clone()).await?;

    let loaded = store.get_element("sm1", "sensors").await?;
    assert_eq!(loaded, tree);

    // Subtree fetch of a nested list member.
    let second = store.get_element("sm1", "sensors.readings[1]").await?;
    assert_eq!(second, int_property("r1", "2"));
    Ok(())
}

#[tokio::test]
async fn deleted_subtree_is_gone_entirely() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = store_with_submodel(dir.path(), "sm1").await?;

    let tree = SubmodelElement::new(
        "plant",
        ElementPayload::Collection(vec![SubmodelElement::new(
            "line",
            ElementPayload::Collection(vec![int_property("speed", "30")]),
        )]),
    );
    store.create_element("sm1", tree).await?;
    store.create_element("sm1", int_property("other", "1")).await?;

    store.delete_element("sm1", "plant").await?;

    for path in ["plant", "plant.line", "plant.line.speed"] {
        let err = store.get_element("sm1", path).await.unwrap_err();
        assert!(
            matches!(err, eidos_store::EidosError::NotFound { .. }),
            "expected NotFound for '{path}', got {err:?}"
        );
    }
    // Sibling subtrees are untouched.
    assert_eq!(store.get_element("sm1", "other").await?.id_short, "other");
    Ok(())
}
