use eidos_store::{DatabaseConfig, EidosConfig, ElementPayload, ModelType, SubmodelElement};

#[test]
fn reexports_core_and_store_types() {
    let config = EidosConfig::default_sqlite("memory");
    match config.database {
        DatabaseConfig::Sqlite { .. } => {}
        _ => panic!("expected sqlite config"),
    }

    let element = SubmodelElement::new("cap", ElementPayload::Capability);
    assert_eq!(element.model_type(), ModelType::Capability);
    assert!(!element.model_type().is_container());
}
