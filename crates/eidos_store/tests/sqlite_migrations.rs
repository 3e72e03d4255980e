use std::collections::HashSet;

use eidos_store::{EidosConfig, EidosResult, EidosStore};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::tempdir;

async fn list_tables(store: &EidosStore) -> EidosResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        ))
        .await
        .map_err(eidos_store::EidosError::from)?;
    let mut tables = HashSet::new();
    for row in rows {
        let name: String = row
            .try_get("", "name")
            .map_err(eidos_store::EidosError::from)?;
        tables.insert(name);
    }
    Ok(tables)
}

#[tokio::test]
async fn sqlite_migrations_create_core_tables() -> EidosResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = EidosConfig::default_sqlite(base.join("eidos.sqlite").to_string_lossy());
    let store = EidosStore::connect(&config, base).await?;
    let tables = list_tables(&store).await?;
    for table in [
        "eidos_schema_version",
        "eidos_submodel",
        "eidos_submodel_element",
        "eidos_property",
        "eidos_mlp_value",
        "eidos_blob",
        "eidos_file",
        "eidos_range",
        "eidos_reference_element",
        "eidos_relationship",
        "eidos_entity",
        "eidos_basic_event",
        "eidos_list",
        "eidos_operation",
    ] {
        assert!(tables.contains(table), "expected table '{table}' to exist");
    }
    // Idempotency check.
    let _store = EidosStore::connect(&config, base).await?;
    Ok(())
}
