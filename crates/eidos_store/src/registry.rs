use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, ExprTrait, Query};
use sea_orm::DatabaseTransaction;
use serde::Serialize;

use eidos_core::{ElementPayload, ModelType, SubmodelElement};

use crate::db::*;
use crate::error::{EidosError, EidosResult};
use crate::store::{col_name, exec, query_one};

/// Persistence boundary for one element variant: the base row plus the
/// variant's satellite rows. New variants are wired up in
/// [`ElementRegistry::new`], nowhere else.
#[async_trait]
pub trait ElementCodec: Send + Sync {
    /// Insert a root-level node. The path is the element's own idShort.
    async fn create(
        &self,
        tx: &DatabaseTransaction,
        submodel_db_id: i64,
        element: &SubmodelElement,
        position: i32,
    ) -> EidosResult<i64>;

    /// Insert a nested node with a caller-resolved path and position.
    async fn create_nested(
        &self,
        tx: &DatabaseTransaction,
        submodel_db_id: i64,
        parent_id: i64,
        root_id: i64,
        idshort_path: &str,
        element: &SubmodelElement,
        position: i32,
    ) -> EidosResult<i64>;

    /// Replace head fields and payload of the node at `id_short_or_path`,
    /// leaving identity and children untouched.
    async fn update(
        &self,
        tx: &DatabaseTransaction,
        submodel_db_id: i64,
        id_short_or_path: &str,
        element: &SubmodelElement,
    ) -> EidosResult<()>;

    /// Remove the variant's satellite rows for one node.
    async fn delete(&self, tx: &DatabaseTransaction, sme_id: i64) -> EidosResult<()>;
}

/// Maps a model-type tag to its codec. Unknown tags fail closed instead of
/// being skipped, so new variants surface here at one auditable boundary.
#[derive(Clone)]
pub struct ElementRegistry {
    codecs: HashMap<i16, Arc<dyn ElementCodec>>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        let mut codecs: HashMap<i16, Arc<dyn ElementCodec>> = HashMap::new();
        for model_type in ModelType::ALL {
            codecs.insert(
                model_type.as_i16(),
                Arc::new(SqlElementCodec { model_type }),
            );
        }
        Self { codecs }
    }

    pub fn handler_for(&self, tag: i16) -> EidosResult<&dyn ElementCodec> {
        self.codecs.get(&tag).map(|codec| codec.as_ref()).ok_or_else(|| {
            EidosError::unsupported(format!("no codec registered for model type tag {tag}"))
        })
    }

    pub fn handler_for_type(&self, model_type: ModelType) -> EidosResult<&dyn ElementCodec> {
        self.handler_for(model_type.as_i16())
    }
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The one concrete codec. Variant differences live in a single exhaustive
/// match over the payload enum rather than one handler type per variant.
struct SqlElementCodec {
    model_type: ModelType,
}

#[async_trait]
impl ElementCodec for SqlElementCodec {
    async fn create(
        &self,
        tx: &DatabaseTransaction,
        submodel_db_id: i64,
        element: &SubmodelElement,
        position: i32,
    ) -> EidosResult<i64> {
        self.check_type(element)?;
        let id = insert_base_row(
            tx,
            submodel_db_id,
            None,
            None,
            &element.id_short,
            position,
            element,
        )
        .await?;
        insert_payload(tx, id, element).await?;
        Ok(id)
    }

    async fn create_nested(
        &self,
        tx: &DatabaseTransaction,
        submodel_db_id: i64,
        parent_id: i64,
        root_id: i64,
        idshort_path: &str,
        element: &SubmodelElement,
        position: i32,
    ) -> EidosResult<i64> {
        self.check_type(element)?;
        let id = insert_base_row(
            tx,
            submodel_db_id,
            Some(parent_id),
            Some(root_id),
            idshort_path,
            position,
            element,
        )
        .await?;
        insert_payload(tx, id, element).await?;
        Ok(id)
    }

    async fn update(
        &self,
        tx: &DatabaseTransaction,
        submodel_db_id: i64,
        id_short_or_path: &str,
        element: &SubmodelElement,
    ) -> EidosResult<()> {
        self.check_type(element)?;

        let select = Query::select()
            .from(EidosSubmodelElement::Table)
            .columns([
                EidosSubmodelElement::Id,
                EidosSubmodelElement::ModelType,
                EidosSubmodelElement::IdShort,
            ])
            .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
            .and_where(Expr::col(EidosSubmodelElement::IdshortPath).eq(id_short_or_path))
            .limit(1)
            .to_owned();
        let row = query_one(tx, &select).await?.ok_or_else(|| {
            EidosError::not_found(format!("element at path '{id_short_or_path}' not found"))
        })?;
        let id: i64 = row.try_get("", &col_name(EidosSubmodelElement::Id))?;
        let tag: i16 = row.try_get("", &col_name(EidosSubmodelElement::ModelType))?;
        let id_short: String = row.try_get("", &col_name(EidosSubmodelElement::IdShort))?;

        if tag != self.model_type.as_i16() {
            return Err(EidosError::bad_request(format!(
                "element at path '{id_short_or_path}' is not a {}",
                self.model_type.as_str()
            )));
        }
        if element.id_short != id_short {
            return Err(EidosError::bad_request(
                "idShort of an existing element cannot change",
            ));
        }

        let semantic_id = element
            .semantic_id
            .as_ref()
            .map(to_json)
            .transpose()?;
        let update = Query::update()
            .table(EidosSubmodelElement::Table)
            .value(EidosSubmodelElement::Category, element.category.clone())
            .value(EidosSubmodelElement::SemanticId, semantic_id)
            .and_where(Expr::col(EidosSubmodelElement::Id).eq(id))
            .to_owned();
        exec(tx, &update).await?;

        self.delete(tx, id).await?;
        insert_payload(tx, id, element).await
    }

    async fn delete(&self, tx: &DatabaseTransaction, sme_id: i64) -> EidosResult<()> {
        let stmt = match self.model_type {
            ModelType::Property => Some(
                Query::delete()
                    .from_table(EidosProperty::Table)
                    .and_where(Expr::col(EidosProperty::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::MultiLanguageProperty => Some(
                Query::delete()
                    .from_table(EidosMlpValue::Table)
                    .and_where(Expr::col(EidosMlpValue::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::Blob => Some(
                Query::delete()
                    .from_table(EidosBlob::Table)
                    .and_where(Expr::col(EidosBlob::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::File => Some(
                Query::delete()
                    .from_table(EidosFile::Table)
                    .and_where(Expr::col(EidosFile::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::Range => Some(
                Query::delete()
                    .from_table(EidosRange::Table)
                    .and_where(Expr::col(EidosRange::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::ReferenceElement => Some(
                Query::delete()
                    .from_table(EidosReferenceElement::Table)
                    .and_where(Expr::col(EidosReferenceElement::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::RelationshipElement | ModelType::AnnotatedRelationshipElement => Some(
                Query::delete()
                    .from_table(EidosRelationship::Table)
                    .and_where(Expr::col(EidosRelationship::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::Entity => Some(
                Query::delete()
                    .from_table(EidosEntity::Table)
                    .and_where(Expr::col(EidosEntity::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::BasicEventElement => Some(
                Query::delete()
                    .from_table(EidosBasicEvent::Table)
                    .and_where(Expr::col(EidosBasicEvent::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::Operation => Some(
                Query::delete()
                    .from_table(EidosOperation::Table)
                    .and_where(Expr::col(EidosOperation::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::SubmodelElementList => Some(
                Query::delete()
                    .from_table(EidosList::Table)
                    .and_where(Expr::col(EidosList::SmeId).eq(sme_id))
                    .to_owned(),
            ),
            ModelType::Capability | ModelType::SubmodelElementCollection => None,
        };
        if let Some(stmt) = stmt {
            exec(tx, &stmt).await?;
        }
        Ok(())
    }
}

impl SqlElementCodec {
    fn check_type(&self, element: &SubmodelElement) -> EidosResult<()> {
        if element.model_type() != self.model_type {
            return Err(EidosError::bad_request(format!(
                "element is not of type {}",
                self.model_type.as_str()
            )));
        }
        Ok(())
    }
}

async fn insert_base_row(
    tx: &DatabaseTransaction,
    submodel_db_id: i64,
    parent_id: Option<i64>,
    root_id: Option<i64>,
    idshort_path: &str,
    position: i32,
    element: &SubmodelElement,
) -> EidosResult<i64> {
    let semantic_id = element.semantic_id.as_ref().map(to_json).transpose()?;
    let insert = Query::insert()
        .into_table(EidosSubmodelElement::Table)
        .columns([
            EidosSubmodelElement::SubmodelId,
            EidosSubmodelElement::ParentSmeId,
            EidosSubmodelElement::RootSmeId,
            EidosSubmodelElement::Position,
            EidosSubmodelElement::IdShort,
            EidosSubmodelElement::Category,
            EidosSubmodelElement::ModelType,
            EidosSubmodelElement::SemanticId,
            EidosSubmodelElement::IdshortPath,
        ])
        .values_panic([
            submodel_db_id.into(),
            parent_id.into(),
            root_id.into(),
            position.into(),
            element.id_short.clone().into(),
            element.category.clone().into(),
            element.model_type().as_i16().into(),
            semantic_id.into(),
            idshort_path.to_string().into(),
        ])
        .to_owned();
    exec(tx, &insert).await?;

    // The surrogate id is assigned by the database; fetch it back through the
    // unique (submodel_id, idshort_path) key, which works on every backend.
    let select = Query::select()
        .from(EidosSubmodelElement::Table)
        .column(EidosSubmodelElement::Id)
        .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
        .and_where(Expr::col(EidosSubmodelElement::IdshortPath).eq(idshort_path))
        .limit(1)
        .to_owned();
    let row = query_one(tx, &select)
        .await?
        .ok_or_else(|| EidosError::storage("inserted element row not found"))?;
    let id: i64 = row.try_get("", &col_name(EidosSubmodelElement::Id))?;

    // Roots point at themselves so descendant fetches can filter on one column.
    if root_id.is_none() {
        let update = Query::update()
            .table(EidosSubmodelElement::Table)
            .value(EidosSubmodelElement::RootSmeId, id)
            .and_where(Expr::col(EidosSubmodelElement::Id).eq(id))
            .to_owned();
        exec(tx, &update).await?;
    }
    Ok(id)
}

async fn insert_payload(
    tx: &DatabaseTransaction,
    sme_id: i64,
    element: &SubmodelElement,
) -> EidosResult<()> {
    match &element.payload {
        ElementPayload::Property(property) => {
            let insert = Query::insert()
                .into_table(EidosProperty::Table)
                .columns([
                    EidosProperty::SmeId,
                    EidosProperty::ValueType,
                    EidosProperty::Value,
                ])
                .values_panic([
                    sme_id.into(),
                    property.value_type.clone().into(),
                    property.value.clone().into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::MultiLanguageProperty(mlp) => {
            if mlp.value.is_empty() {
                return Ok(());
            }
            let mut insert = Query::insert()
                .into_table(EidosMlpValue::Table)
                .columns([
                    EidosMlpValue::SmeId,
                    EidosMlpValue::Position,
                    EidosMlpValue::Language,
                    EidosMlpValue::Text,
                ])
                .to_owned();
            for (index, lang_string) in mlp.value.iter().enumerate() {
                insert.values_panic([
                    sme_id.into(),
                    (index as i32).into(),
                    lang_string.language.clone().into(),
                    lang_string.text.clone().into(),
                ]);
            }
            exec(tx, &insert).await?;
        }
        ElementPayload::Blob(blob) => {
            let insert = Query::insert()
                .into_table(EidosBlob::Table)
                .columns([EidosBlob::SmeId, EidosBlob::ContentType, EidosBlob::Value])
                .values_panic([
                    sme_id.into(),
                    blob.content_type.clone().into(),
                    blob.value.clone().into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::File(file) => {
            let insert = Query::insert()
                .into_table(EidosFile::Table)
                .columns([EidosFile::SmeId, EidosFile::ContentType, EidosFile::Value])
                .values_panic([
                    sme_id.into(),
                    file.content_type.clone().into(),
                    file.value.clone().into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::Range(range) => {
            let insert = Query::insert()
                .into_table(EidosRange::Table)
                .columns([
                    EidosRange::SmeId,
                    EidosRange::ValueType,
                    EidosRange::MinValue,
                    EidosRange::MaxValue,
                ])
                .values_panic([
                    sme_id.into(),
                    range.value_type.clone().into(),
                    range.min.clone().into(),
                    range.max.clone().into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::ReferenceElement(reference_element) => {
            let value = reference_element.value.as_ref().map(to_json).transpose()?;
            let insert = Query::insert()
                .into_table(EidosReferenceElement::Table)
                .columns([EidosReferenceElement::SmeId, EidosReferenceElement::Value])
                .values_panic([sme_id.into(), value.into()])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::RelationshipElement(relationship)
        | ElementPayload::AnnotatedRelationshipElement(relationship) => {
            let insert = Query::insert()
                .into_table(EidosRelationship::Table)
                .columns([
                    EidosRelationship::SmeId,
                    EidosRelationship::First,
                    EidosRelationship::Second,
                ])
                .values_panic([
                    sme_id.into(),
                    to_json(&relationship.first)?.into(),
                    to_json(&relationship.second)?.into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::Entity(entity) => {
            let insert = Query::insert()
                .into_table(EidosEntity::Table)
                .columns([
                    EidosEntity::SmeId,
                    EidosEntity::EntityType,
                    EidosEntity::GlobalAssetId,
                ])
                .values_panic([
                    sme_id.into(),
                    entity.entity_type.clone().into(),
                    entity.global_asset_id.clone().into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::BasicEventElement(event) => {
            let message_broker = event.message_broker.as_ref().map(to_json).transpose()?;
            let insert = Query::insert()
                .into_table(EidosBasicEvent::Table)
                .columns([
                    EidosBasicEvent::SmeId,
                    EidosBasicEvent::Direction,
                    EidosBasicEvent::State,
                    EidosBasicEvent::MessageTopic,
                    EidosBasicEvent::Observed,
                    EidosBasicEvent::MessageBroker,
                    EidosBasicEvent::LastUpdate,
                    EidosBasicEvent::MinInterval,
                    EidosBasicEvent::MaxInterval,
                ])
                .values_panic([
                    sme_id.into(),
                    event.direction.clone().into(),
                    event.state.clone().into(),
                    event.message_topic.clone().into(),
                    to_json(&event.observed)?.into(),
                    message_broker.into(),
                    event.last_update.clone().into(),
                    event.min_interval.clone().into(),
                    event.max_interval.clone().into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::Operation(operation) => {
            let insert = Query::insert()
                .into_table(EidosOperation::Table)
                .columns([
                    EidosOperation::SmeId,
                    EidosOperation::InputVariables,
                    EidosOperation::OutputVariables,
                    EidosOperation::InoutputVariables,
                ])
                .values_panic([
                    sme_id.into(),
                    to_json(&operation.input_variables)?.into(),
                    to_json(&operation.output_variables)?.into(),
                    to_json(&operation.inoutput_variables)?.into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::List(list) => {
            let insert = Query::insert()
                .into_table(EidosList::Table)
                .columns([
                    EidosList::SmeId,
                    EidosList::OrderRelevant,
                    EidosList::TypeValueListElement,
                    EidosList::ValueTypeListElement,
                ])
                .values_panic([
                    sme_id.into(),
                    list.order_relevant.into(),
                    list.type_value_list_element.clone().into(),
                    list.value_type_list_element.clone().into(),
                ])
                .to_owned();
            exec(tx, &insert).await?;
        }
        ElementPayload::Capability | ElementPayload::Collection(_) => {}
    }
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> EidosResult<String> {
    serde_json::to_string(value).map_err(|err| EidosError::storage(err.to_string()))
}
