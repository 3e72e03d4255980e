use std::time::{SystemTime, UNIX_EPOCH};

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{DatabaseBackend, Statement};
use sea_orm_migration::sea_query::{
    MysqlQueryBuilder, PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder,
    Value as SeaValue,
};

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(EidosSchemaVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EidosSchemaVersion::Version)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EidosSchemaVersion::AppliedAtMicros)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EidosSchemaVersion::Checksum)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EidosSchemaVersion::AppVersion).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EidosSubmodel::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EidosSubmodel::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EidosSubmodel::Identifier)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EidosSubmodel::IdShort).string())
                    .col(ColumnDef::new(EidosSubmodel::Category).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EidosSubmodelElement::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EidosSubmodelElement::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EidosSubmodelElement::SubmodelId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EidosSubmodelElement::ParentSmeId).big_integer())
                    .col(ColumnDef::new(EidosSubmodelElement::RootSmeId).big_integer())
                    .col(ColumnDef::new(EidosSubmodelElement::Position).integer())
                    .col(
                        ColumnDef::new(EidosSubmodelElement::IdShort)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EidosSubmodelElement::Category).string())
                    .col(
                        ColumnDef::new(EidosSubmodelElement::ModelType)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EidosSubmodelElement::SemanticId).text())
                    .col(
                        ColumnDef::new(EidosSubmodelElement::IdshortPath)
                            .string_len(512)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_eidos_sme_submodel")
                            .from(EidosSubmodelElement::Table, EidosSubmodelElement::SubmodelId)
                            .to(EidosSubmodel::Table, EidosSubmodel::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_eidos_sme_parent")
                            .from(EidosSubmodelElement::Table, EidosSubmodelElement::ParentSmeId)
                            .to(EidosSubmodelElement::Table, EidosSubmodelElement::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Uniqueness of (submodel_id, idshort_path) backs the writer's
        // check-then-insert against concurrent transactions.
        manager
            .create_index(
                Index::create()
                    .name("ux_eidos_sme_submodel_path")
                    .table(EidosSubmodelElement::Table)
                    .col(EidosSubmodelElement::SubmodelId)
                    .col(EidosSubmodelElement::IdshortPath)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("ux_eidos_submodel_identifier")
                    .table(EidosSubmodel::Table)
                    .col(EidosSubmodel::Identifier)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_eidos_sme_parent_position")
                    .table(EidosSubmodelElement::Table)
                    .col(EidosSubmodelElement::ParentSmeId)
                    .col(EidosSubmodelElement::Position)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_eidos_sme_submodel_root")
                    .table(EidosSubmodelElement::Table)
                    .col(EidosSubmodelElement::SubmodelId)
                    .col(EidosSubmodelElement::RootSmeId)
                    .to_owned(),
            )
            .await?;

        create_satellite_table(
            manager,
            EidosProperty::Table,
            EidosProperty::SmeId,
            "fk_eidos_property_sme",
            [
                ColumnDef::new(EidosProperty::ValueType).string().not_null().to_owned(),
                ColumnDef::new(EidosProperty::Value).text().to_owned(),
            ],
        )
        .await?;

        manager
            .create_table(
                Table::create()
                    .table(EidosMlpValue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EidosMlpValue::SmeId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EidosMlpValue::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EidosMlpValue::Language)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EidosMlpValue::Text).text().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_eidos_mlp_value")
                            .col(EidosMlpValue::SmeId)
                            .col(EidosMlpValue::Position),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_eidos_mlp_value_sme")
                            .from(EidosMlpValue::Table, EidosMlpValue::SmeId)
                            .to(EidosSubmodelElement::Table, EidosSubmodelElement::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        create_satellite_table(
            manager,
            EidosBlob::Table,
            EidosBlob::SmeId,
            "fk_eidos_blob_sme",
            [
                ColumnDef::new(EidosBlob::ContentType).string().not_null().to_owned(),
                ColumnDef::new(EidosBlob::Value).blob().not_null().to_owned(),
            ],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosFile::Table,
            EidosFile::SmeId,
            "fk_eidos_file_sme",
            [
                ColumnDef::new(EidosFile::ContentType).string().not_null().to_owned(),
                ColumnDef::new(EidosFile::Value).text().to_owned(),
            ],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosRange::Table,
            EidosRange::SmeId,
            "fk_eidos_range_sme",
            [
                ColumnDef::new(EidosRange::ValueType).string().not_null().to_owned(),
                ColumnDef::new(EidosRange::MinValue).text().to_owned(),
                ColumnDef::new(EidosRange::MaxValue).text().to_owned(),
            ],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosReferenceElement::Table,
            EidosReferenceElement::SmeId,
            "fk_eidos_reference_element_sme",
            [ColumnDef::new(EidosReferenceElement::Value).text().to_owned()],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosRelationship::Table,
            EidosRelationship::SmeId,
            "fk_eidos_relationship_sme",
            [
                ColumnDef::new(EidosRelationship::First).text().not_null().to_owned(),
                ColumnDef::new(EidosRelationship::Second).text().not_null().to_owned(),
            ],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosEntity::Table,
            EidosEntity::SmeId,
            "fk_eidos_entity_sme",
            [
                ColumnDef::new(EidosEntity::EntityType).string().not_null().to_owned(),
                ColumnDef::new(EidosEntity::GlobalAssetId).string().to_owned(),
            ],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosBasicEvent::Table,
            EidosBasicEvent::SmeId,
            "fk_eidos_basic_event_sme",
            [
                ColumnDef::new(EidosBasicEvent::Direction).string().not_null().to_owned(),
                ColumnDef::new(EidosBasicEvent::State).string().not_null().to_owned(),
                ColumnDef::new(EidosBasicEvent::MessageTopic).string().to_owned(),
                ColumnDef::new(EidosBasicEvent::Observed).text().not_null().to_owned(),
                ColumnDef::new(EidosBasicEvent::MessageBroker).text().to_owned(),
                ColumnDef::new(EidosBasicEvent::LastUpdate).string().to_owned(),
                ColumnDef::new(EidosBasicEvent::MinInterval).string().to_owned(),
                ColumnDef::new(EidosBasicEvent::MaxInterval).string().to_owned(),
            ],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosList::Table,
            EidosList::SmeId,
            "fk_eidos_list_sme",
            [
                ColumnDef::new(EidosList::OrderRelevant).boolean().not_null().to_owned(),
                ColumnDef::new(EidosList::TypeValueListElement).string().to_owned(),
                ColumnDef::new(EidosList::ValueTypeListElement).string().to_owned(),
            ],
        )
        .await?;

        create_satellite_table(
            manager,
            EidosOperation::Table,
            EidosOperation::SmeId,
            "fk_eidos_operation_sme",
            [
                ColumnDef::new(EidosOperation::InputVariables).text().not_null().to_owned(),
                ColumnDef::new(EidosOperation::OutputVariables).text().not_null().to_owned(),
                ColumnDef::new(EidosOperation::InoutputVariables).text().not_null().to_owned(),
            ],
        )
        .await?;

        let checksum = blake3::hash(self.name().as_bytes()).to_hex().to_string();
        let applied_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64;
        let insert = Query::insert()
            .into_table(EidosSchemaVersion::Table)
            .columns([
                EidosSchemaVersion::Version,
                EidosSchemaVersion::AppliedAtMicros,
                EidosSchemaVersion::Checksum,
                EidosSchemaVersion::AppVersion,
            ])
            .values_panic([
                self.name().to_string().into(),
                applied_at.into(),
                checksum.into(),
                SeaValue::String(None).into(),
            ])
            .to_owned();
        let (sql, values) = build_stmt(backend, &insert);
        manager
            .get_connection()
            .execute(Statement::from_sql_and_values(backend, sql, values))
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Table::drop().table(EidosOperation::Table).if_exists().to_owned(),
            Table::drop().table(EidosList::Table).if_exists().to_owned(),
            Table::drop().table(EidosBasicEvent::Table).if_exists().to_owned(),
            Table::drop().table(EidosEntity::Table).if_exists().to_owned(),
            Table::drop().table(EidosRelationship::Table).if_exists().to_owned(),
            Table::drop()
                .table(EidosReferenceElement::Table)
                .if_exists()
                .to_owned(),
            Table::drop().table(EidosRange::Table).if_exists().to_owned(),
            Table::drop().table(EidosFile::Table).if_exists().to_owned(),
            Table::drop().table(EidosBlob::Table).if_exists().to_owned(),
            Table::drop().table(EidosMlpValue::Table).if_exists().to_owned(),
            Table::drop().table(EidosProperty::Table).if_exists().to_owned(),
            Table::drop()
                .table(EidosSubmodelElement::Table)
                .if_exists()
                .to_owned(),
            Table::drop().table(EidosSubmodel::Table).if_exists().to_owned(),
            Table::drop()
                .table(EidosSchemaVersion::Table)
                .if_exists()
                .to_owned(),
        ] {
            manager.drop_table(table).await?;
        }
        Ok(())
    }
}

/// Create a one-row-per-element satellite table keyed by the element id.
async fn create_satellite_table<const N: usize>(
    manager: &SchemaManager<'_>,
    table: impl Iden + Clone + 'static,
    sme_id_col: impl Iden + Clone + 'static,
    fk_name: &str,
    payload_cols: [ColumnDef; N],
) -> Result<(), DbErr> {
    let mut create = Table::create();
    create
        .table(table.clone())
        .if_not_exists()
        .col(
            ColumnDef::new(sme_id_col.clone())
                .big_integer()
                .not_null()
                .primary_key(),
        )
        .foreign_key(
            ForeignKey::create()
                .name(fk_name)
                .from(table, sme_id_col)
                .to(EidosSubmodelElement::Table, EidosSubmodelElement::Id)
                .on_delete(ForeignKeyAction::Cascade),
        );
    for col in payload_cols {
        create.col(col);
    }
    manager.create_table(create.to_owned()).await?;
    Ok(())
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm_migration::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}
