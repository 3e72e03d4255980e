use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Alias, Cond, Expr, ExprTrait, Func, MysqlQueryBuilder, Order, PostgresQueryBuilder, Query,
    QueryStatementWriter, SelectStatement, SqliteQueryBuilder,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, QueryResult, Statement, TransactionTrait,
};
use serde::de::DeserializeOwned;

use eidos_core::{
    child_path, parse_trailing_index, BasicEventElement, BlobElement, ContainerKind,
    ElementPayload, EntityElement, FileElement, LangString, ListElement, ModelType,
    MultiLanguageProperty, OperationElement, Property, RangeElement, ReferenceElement,
    RelationshipElement, SubmodelElement,
};

use crate::api::{
    CreateSubmodelInput, ElementDeleteApi, ElementPage, ElementReadApi, ElementWriteApi,
    ListElementsInput, SubmodelApi,
};
use crate::config::{DatabaseConfig, EidosConfig};
use crate::db::*;
use crate::error::{EidosError, EidosResult};
use crate::migration::Migrator;
use crate::registry::ElementRegistry;
use sea_orm_migration::MigratorTrait;

const DEFAULT_PAGE_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct EidosStore {
    conn: DatabaseConnection,
    registry: ElementRegistry,
}

impl EidosStore {
    pub async fn connect(config: &EidosConfig, base_dir: &Path) -> EidosResult<Self> {
        let url = build_connection_url(config, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(EidosError::from)?;
        Migrator::up(&conn, None).await.map_err(EidosError::from)?;
        info!("eidos store connected ({})", config.backend_name());
        Ok(Self {
            conn,
            registry: ElementRegistry::new(),
        })
    }

    pub async fn connect_sqlite(path: &Path) -> EidosResult<Self> {
        let config = EidosConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }
}

// ---------------------------------------------------------------------------
// Submodel lookups

pub(crate) async fn submodel_db_id<C: ConnectionTrait>(
    conn: &C,
    identifier: &str,
) -> EidosResult<i64> {
    let select = Query::select()
        .from(EidosSubmodel::Table)
        .column(EidosSubmodel::Id)
        .and_where(Expr::col(EidosSubmodel::Identifier).eq(identifier))
        .limit(1)
        .to_owned();
    let row = query_one(conn, &select)
        .await?
        .ok_or_else(|| EidosError::not_found(format!("submodel '{identifier}' not found")))?;
    let id: i64 = row.try_get("", &col_name(EidosSubmodel::Id))?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Subtree writer

/// Resolved container context for nested creation.
pub(crate) struct ParentRef {
    pub id: i64,
    pub root_id: i64,
    pub path: String,
    pub kind: ContainerKind,
}

pub(crate) async fn resolve_parent(
    tx: &DatabaseTransaction,
    submodel_db_id: i64,
    parent_path: &str,
) -> EidosResult<ParentRef> {
    let select = Query::select()
        .from(EidosSubmodelElement::Table)
        .columns([
            EidosSubmodelElement::Id,
            EidosSubmodelElement::RootSmeId,
            EidosSubmodelElement::ModelType,
        ])
        .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
        .and_where(Expr::col(EidosSubmodelElement::IdshortPath).eq(parent_path))
        .limit(1)
        .to_owned();
    let row = query_one(tx, &select).await?.ok_or_else(|| {
        EidosError::not_found(format!("parent element at path '{parent_path}' not found"))
    })?;
    let id: i64 = row.try_get("", &col_name(EidosSubmodelElement::Id))?;
    let root_id: Option<i64> = row.try_get("", &col_name(EidosSubmodelElement::RootSmeId))?;
    let tag: i16 = row.try_get("", &col_name(EidosSubmodelElement::ModelType))?;

    let kind = match ModelType::from_i16(tag) {
        Some(ModelType::SubmodelElementCollection) => ContainerKind::Collection,
        Some(ModelType::SubmodelElementList) => ContainerKind::List,
        Some(_) => {
            return Err(EidosError::bad_request(format!(
                "element at path '{parent_path}' does not support child elements"
            )))
        }
        None => {
            return Err(EidosError::unsupported(format!(
                "unknown model type tag {tag} at path '{parent_path}'"
            )))
        }
    };
    Ok(ParentRef {
        id,
        root_id: root_id.unwrap_or(id),
        path: parent_path.to_string(),
        kind,
    })
}

struct PendingInsert<'a> {
    element: &'a SubmodelElement,
    parent_id: i64,
    path: String,
    position: i32,
}

/// Insert `element` and its whole payload subtree, strictly parent before
/// child. Paths are built with the path-addressing rules; list children get
/// contiguous positions from their payload order.
pub(crate) async fn insert_element_tree(
    tx: &DatabaseTransaction,
    registry: &ElementRegistry,
    submodel_db_id: i64,
    parent: Option<&ParentRef>,
    element: &SubmodelElement,
    position: i32,
) -> EidosResult<i64> {
    let path = match parent {
        None => {
            require_id_short(element)?;
            element.id_short.clone()
        }
        Some(parent) => {
            if parent.kind == ContainerKind::Collection {
                require_id_short(element)?;
            }
            child_path(&parent.path, &element.id_short, parent.kind, position)
        }
    };

    ensure_path_free(tx, submodel_db_id, &path).await?;
    let codec = registry.handler_for_type(element.model_type())?;
    let inserted_id = match parent {
        None => codec.create(tx, submodel_db_id, element, position).await?,
        Some(parent) => {
            codec
                .create_nested(
                    tx,
                    submodel_db_id,
                    parent.id,
                    parent.root_id,
                    &path,
                    element,
                    position,
                )
                .await?
        }
    };
    let root_id = parent.map(|parent| parent.root_id).unwrap_or(inserted_id);

    let mut queue: VecDeque<PendingInsert> = VecDeque::new();
    enqueue_children(&mut queue, element, inserted_id, &path)?;
    while let Some(item) = queue.pop_front() {
        ensure_path_free(tx, submodel_db_id, &item.path).await?;
        let codec = registry.handler_for_type(item.element.model_type())?;
        let id = codec
            .create_nested(
                tx,
                submodel_db_id,
                item.parent_id,
                root_id,
                &item.path,
                item.element,
                item.position,
            )
            .await?;
        enqueue_children(&mut queue, item.element, id, &item.path)?;
    }
    Ok(inserted_id)
}

fn enqueue_children<'a>(
    queue: &mut VecDeque<PendingInsert<'a>>,
    element: &'a SubmodelElement,
    parent_id: i64,
    parent_path: &str,
) -> EidosResult<()> {
    match &element.payload {
        ElementPayload::Collection(children) => {
            for (index, child) in children.iter().enumerate() {
                require_id_short(child)?;
                queue.push_back(PendingInsert {
                    element: child,
                    parent_id,
                    path: child_path(
                        parent_path,
                        &child.id_short,
                        ContainerKind::Collection,
                        index as i32,
                    ),
                    position: index as i32,
                });
            }
        }
        ElementPayload::List(list) => {
            for (index, child) in list.value.iter().enumerate() {
                queue.push_back(PendingInsert {
                    element: child,
                    parent_id,
                    path: child_path(
                        parent_path,
                        &child.id_short,
                        ContainerKind::List,
                        index as i32,
                    ),
                    position: index as i32,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn require_id_short(element: &SubmodelElement) -> EidosResult<()> {
    if element.id_short.is_empty() {
        return Err(EidosError::bad_request(
            "idShort must not be empty outside of list children",
        ));
    }
    Ok(())
}

async fn ensure_path_free(
    tx: &DatabaseTransaction,
    submodel_db_id: i64,
    idshort_path: &str,
) -> EidosResult<()> {
    let select = Query::select()
        .from(EidosSubmodelElement::Table)
        .expr_as(
            Func::count(Expr::col(EidosSubmodelElement::Id)),
            Alias::new("cnt"),
        )
        .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
        .and_where(Expr::col(EidosSubmodelElement::IdshortPath).eq(idshort_path))
        .to_owned();
    let row = query_one(tx, &select)
        .await?
        .ok_or_else(|| EidosError::storage("count query returned no row"))?;
    let count: i64 = row.try_get("", "cnt")?;
    if count > 0 {
        return Err(EidosError::conflict(format!(
            "element with path '{idshort_path}' already exists"
        )));
    }
    Ok(())
}

/// 1 + max(position) among the children of `parent_id`, or 0 for the first.
pub(crate) async fn next_position<C: ConnectionTrait>(
    conn: &C,
    parent_id: i64,
) -> EidosResult<i32> {
    let select = Query::select()
        .from(EidosSubmodelElement::Table)
        .expr_as(
            Func::max(Expr::col(EidosSubmodelElement::Position)),
            Alias::new("max_pos"),
        )
        .and_where(Expr::col(EidosSubmodelElement::ParentSmeId).eq(parent_id))
        .to_owned();
    let row = query_one(conn, &select)
        .await?
        .ok_or_else(|| EidosError::storage("aggregate query returned no row"))?;
    let max: Option<i32> = row.try_get("", "max_pos")?;
    Ok(max.map(|value| value + 1).unwrap_or(0))
}

async fn next_root_position<C: ConnectionTrait>(
    conn: &C,
    submodel_db_id: i64,
) -> EidosResult<i32> {
    let select = Query::select()
        .from(EidosSubmodelElement::Table)
        .expr_as(
            Func::max(Expr::col(EidosSubmodelElement::Position)),
            Alias::new("max_pos"),
        )
        .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
        .and_where(Expr::col(EidosSubmodelElement::ParentSmeId).is_null())
        .to_owned();
    let row = query_one(conn, &select)
        .await?
        .ok_or_else(|| EidosError::storage("aggregate query returned no row"))?;
    let max: Option<i32> = row.try_get("", "max_pos")?;
    Ok(max.map(|value| value + 1).unwrap_or(0))
}

// ---------------------------------------------------------------------------
// Subtree loader

struct RawNode {
    id: i64,
    parent_id: Option<i64>,
    position: Option<i32>,
    path: String,
    element: SubmodelElement,
}

/// Read entry point with the two retrieval modes: an empty path pages the
/// root siblings (with a cursor), a non-empty path fetches that one subtree.
pub(crate) async fn load_elements<C: ConnectionTrait>(
    conn: &C,
    submodel_db_id: i64,
    id_short_or_path: &str,
    limit: u32,
    cursor: Option<&str>,
) -> EidosResult<(Vec<SubmodelElement>, Option<String>)> {
    if id_short_or_path.is_empty() {
        return load_root_page(conn, submodel_db_id, limit, cursor).await;
    }
    let element = load_subtree(conn, submodel_db_id, id_short_or_path).await?;
    Ok((element.into_iter().collect(), None))
}

/// Load one element with its whole subtree attached, or None when no row
/// carries the requested path.
pub(crate) async fn load_subtree<C: ConnectionTrait>(
    conn: &C,
    submodel_db_id: i64,
    id_short_or_path: &str,
) -> EidosResult<Option<SubmodelElement>> {
    let rows = query_all(conn, &subtree_select(submodel_db_id, id_short_or_path)).await?;
    let mut raw = parse_rows(rows)?;
    if raw.is_empty() {
        return Ok(None);
    }
    hydrate_mlp_values(conn, &mut raw).await?;
    let mut forest = index_rows(raw);
    let target = forest
        .roots
        .iter()
        .find(|(_, path)| path.as_str() == id_short_or_path)
        .map(|(id, _)| *id);
    Ok(target.and_then(|id| assemble(&mut forest, id)))
}

/// Load one page of root elements ordered by idShort, each with its full
/// subtree, in a single additional round trip. The cursor is the idShort of
/// the last root of the previous page.
pub(crate) async fn load_root_page<C: ConnectionTrait>(
    conn: &C,
    submodel_db_id: i64,
    limit: u32,
    cursor: Option<&str>,
) -> EidosResult<(Vec<SubmodelElement>, Option<String>)> {
    let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
    let offset = match cursor {
        Some(cursor) if !cursor.is_empty() => {
            root_cursor_offset(conn, submodel_db_id, cursor).await?
        }
        _ => 0,
    };

    let page_select = Query::select()
        .from(EidosSubmodelElement::Table)
        .columns([EidosSubmodelElement::Id, EidosSubmodelElement::IdShort])
        .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
        .and_where(Expr::col(EidosSubmodelElement::ParentSmeId).is_null())
        .order_by(EidosSubmodelElement::IdShort, Order::Asc)
        .limit(limit as u64)
        .offset(offset)
        .to_owned();
    let page_rows = query_all(conn, &page_select).await?;
    if page_rows.is_empty() {
        return Ok((Vec::new(), None));
    }

    let mut root_ids = Vec::with_capacity(page_rows.len());
    let mut last_id_short = String::new();
    for row in &page_rows {
        root_ids.push(row.try_get::<i64>("", &col_name(EidosSubmodelElement::Id))?);
        last_id_short = row.try_get("", &col_name(EidosSubmodelElement::IdShort))?;
    }

    let bulk_rows = query_all(conn, &roots_select(submodel_db_id, &root_ids)).await?;
    let mut raw = parse_rows(bulk_rows)?;
    hydrate_mlp_values(conn, &mut raw).await?;
    let mut forest = index_rows(raw);

    let mut elements = Vec::with_capacity(root_ids.len());
    for root_id in root_ids {
        match assemble(&mut forest, root_id) {
            Some(element) => elements.push(element),
            None => warn!("root element {root_id} was skipped during reconstruction"),
        }
    }
    Ok((elements, Some(last_id_short)))
}

/// Ordinal of the cursor idShort among all roots, used as the page offset.
async fn root_cursor_offset<C: ConnectionTrait>(
    conn: &C,
    submodel_db_id: i64,
    cursor: &str,
) -> EidosResult<u64> {
    let select = Query::select()
        .from(EidosSubmodelElement::Table)
        .expr_as(
            Expr::cust("ROW_NUMBER() OVER (ORDER BY id_short)"),
            Alias::new("rn"),
        )
        .column(EidosSubmodelElement::IdShort)
        .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
        .and_where(Expr::col(EidosSubmodelElement::ParentSmeId).is_null())
        .to_owned();
    for row in query_all(conn, &select).await? {
        let id_short: String = row.try_get("", &col_name(EidosSubmodelElement::IdShort))?;
        if id_short == cursor {
            let ordinal: i64 = row.try_get("", "rn")?;
            return Ok(ordinal as u64);
        }
    }
    Err(EidosError::bad_request(format!("invalid cursor '{cursor}'")))
}

fn path_scope_cond(idshort_path: &str) -> Cond {
    let col = (
        EidosSubmodelElement::Table,
        EidosSubmodelElement::IdshortPath,
    );
    Cond::any()
        .add(Expr::col(col).eq(idshort_path))
        .add(Expr::col(col).like(format!("{idshort_path}.%")))
        .add(Expr::col(col).like(format!("{idshort_path}[%")))
}

fn subtree_select(submodel_db_id: i64, idshort_path: &str) -> SelectStatement {
    let mut select = element_select();
    select
        .cond_where(
            Cond::all()
                .add(
                    Expr::col((
                        EidosSubmodelElement::Table,
                        EidosSubmodelElement::SubmodelId,
                    ))
                    .eq(submodel_db_id),
                )
                .add(path_scope_cond(idshort_path)),
        )
        .order_by(
            (
                EidosSubmodelElement::Table,
                EidosSubmodelElement::IdshortPath,
            ),
            Order::Asc,
        )
        .order_by(
            (EidosSubmodelElement::Table, EidosSubmodelElement::Position),
            Order::Asc,
        );
    select
}

fn roots_select(submodel_db_id: i64, root_ids: &[i64]) -> SelectStatement {
    let sme = EidosSubmodelElement::Table;
    let mut select = element_select();
    select
        .and_where(Expr::col((sme, EidosSubmodelElement::SubmodelId)).eq(submodel_db_id))
        .and_where(
            Expr::expr(Func::coalesce([
                Expr::col((sme, EidosSubmodelElement::RootSmeId)).into(),
                Expr::col((sme, EidosSubmodelElement::Id)).into(),
            ]))
            .is_in(root_ids.iter().copied()),
        )
        .order_by((sme, EidosSubmodelElement::IdshortPath), Order::Asc)
        .order_by((sme, EidosSubmodelElement::Position), Order::Asc);
    select
}

/// The one bulk query: the element table LEFT JOINed with every single-row
/// satellite table, satellite columns aliased per variant. Multi-row MLP
/// values are hydrated separately.
fn element_select() -> SelectStatement {
    let sme = EidosSubmodelElement::Table;
    Query::select()
        .columns([
            (sme, EidosSubmodelElement::Id),
            (sme, EidosSubmodelElement::ParentSmeId),
            (sme, EidosSubmodelElement::Position),
            (sme, EidosSubmodelElement::IdShort),
            (sme, EidosSubmodelElement::Category),
            (sme, EidosSubmodelElement::ModelType),
            (sme, EidosSubmodelElement::SemanticId),
            (sme, EidosSubmodelElement::IdshortPath),
        ])
        .expr_as(
            Expr::col((EidosProperty::Table, EidosProperty::ValueType)),
            Alias::new("prop_value_type"),
        )
        .expr_as(
            Expr::col((EidosProperty::Table, EidosProperty::Value)),
            Alias::new("prop_value"),
        )
        .expr_as(
            Expr::col((EidosBlob::Table, EidosBlob::ContentType)),
            Alias::new("blob_content_type"),
        )
        .expr_as(
            Expr::col((EidosBlob::Table, EidosBlob::Value)),
            Alias::new("blob_value"),
        )
        .expr_as(
            Expr::col((EidosFile::Table, EidosFile::ContentType)),
            Alias::new("file_content_type"),
        )
        .expr_as(
            Expr::col((EidosFile::Table, EidosFile::Value)),
            Alias::new("file_value"),
        )
        .expr_as(
            Expr::col((EidosRange::Table, EidosRange::ValueType)),
            Alias::new("range_value_type"),
        )
        .expr_as(
            Expr::col((EidosRange::Table, EidosRange::MinValue)),
            Alias::new("range_min"),
        )
        .expr_as(
            Expr::col((EidosRange::Table, EidosRange::MaxValue)),
            Alias::new("range_max"),
        )
        .expr_as(
            Expr::col((EidosReferenceElement::Table, EidosReferenceElement::Value)),
            Alias::new("ref_value"),
        )
        .expr_as(
            Expr::col((EidosRelationship::Table, EidosRelationship::First)),
            Alias::new("rel_first"),
        )
        .expr_as(
            Expr::col((EidosRelationship::Table, EidosRelationship::Second)),
            Alias::new("rel_second"),
        )
        .expr_as(
            Expr::col((EidosEntity::Table, EidosEntity::EntityType)),
            Alias::new("entity_type"),
        )
        .expr_as(
            Expr::col((EidosEntity::Table, EidosEntity::GlobalAssetId)),
            Alias::new("entity_global_asset_id"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::Direction)),
            Alias::new("bee_direction"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::State)),
            Alias::new("bee_state"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::MessageTopic)),
            Alias::new("bee_message_topic"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::Observed)),
            Alias::new("bee_observed"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::MessageBroker)),
            Alias::new("bee_message_broker"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::LastUpdate)),
            Alias::new("bee_last_update"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::MinInterval)),
            Alias::new("bee_min_interval"),
        )
        .expr_as(
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::MaxInterval)),
            Alias::new("bee_max_interval"),
        )
        .expr_as(
            Expr::col((EidosList::Table, EidosList::OrderRelevant)),
            Alias::new("list_order_relevant"),
        )
        .expr_as(
            Expr::col((EidosList::Table, EidosList::TypeValueListElement)),
            Alias::new("list_type_value_list_element"),
        )
        .expr_as(
            Expr::col((EidosList::Table, EidosList::ValueTypeListElement)),
            Alias::new("list_value_type_list_element"),
        )
        .expr_as(
            Expr::col((EidosOperation::Table, EidosOperation::InputVariables)),
            Alias::new("op_input_variables"),
        )
        .expr_as(
            Expr::col((EidosOperation::Table, EidosOperation::OutputVariables)),
            Alias::new("op_output_variables"),
        )
        .expr_as(
            Expr::col((EidosOperation::Table, EidosOperation::InoutputVariables)),
            Alias::new("op_inoutput_variables"),
        )
        .from(sme)
        .left_join(
            EidosProperty::Table,
            Expr::col((EidosProperty::Table, EidosProperty::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosBlob::Table,
            Expr::col((EidosBlob::Table, EidosBlob::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosFile::Table,
            Expr::col((EidosFile::Table, EidosFile::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosRange::Table,
            Expr::col((EidosRange::Table, EidosRange::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosReferenceElement::Table,
            Expr::col((EidosReferenceElement::Table, EidosReferenceElement::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosRelationship::Table,
            Expr::col((EidosRelationship::Table, EidosRelationship::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosEntity::Table,
            Expr::col((EidosEntity::Table, EidosEntity::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosBasicEvent::Table,
            Expr::col((EidosBasicEvent::Table, EidosBasicEvent::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosList::Table,
            Expr::col((EidosList::Table, EidosList::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .left_join(
            EidosOperation::Table,
            Expr::col((EidosOperation::Table, EidosOperation::SmeId))
                .equals((sme, EidosSubmodelElement::Id)),
        )
        .to_owned()
}

fn parse_rows(rows: Vec<QueryResult>) -> EidosResult<Vec<RawNode>> {
    let mut nodes = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(node) = read_row(&row)? {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Materialize one row into a typed node. Rows with a model-type tag this
/// build does not know are skipped so newer data does not break readers.
fn read_row(row: &QueryResult) -> EidosResult<Option<RawNode>> {
    let id: i64 = row.try_get("", &col_name(EidosSubmodelElement::Id))?;
    let parent_id: Option<i64> = row.try_get("", &col_name(EidosSubmodelElement::ParentSmeId))?;
    let position: Option<i32> = row.try_get("", &col_name(EidosSubmodelElement::Position))?;
    let path: String = row.try_get("", &col_name(EidosSubmodelElement::IdshortPath))?;
    let tag: i16 = row.try_get("", &col_name(EidosSubmodelElement::ModelType))?;

    let Some(model_type) = ModelType::from_i16(tag) else {
        warn!("skipping element row at path '{path}' with unknown model type tag {tag}");
        return Ok(None);
    };

    let id_short: String = row.try_get("", &col_name(EidosSubmodelElement::IdShort))?;
    let category: Option<String> = row.try_get("", &col_name(EidosSubmodelElement::Category))?;
    let semantic_raw: Option<String> =
        row.try_get("", &col_name(EidosSubmodelElement::SemanticId))?;
    let semantic_id = semantic_raw.as_deref().map(from_json).transpose()?;

    let payload = decode_payload(model_type, row)?;
    Ok(Some(RawNode {
        id,
        parent_id,
        position,
        path,
        element: SubmodelElement {
            id_short,
            category,
            semantic_id,
            payload,
        },
    }))
}

fn decode_payload(model_type: ModelType, row: &QueryResult) -> EidosResult<ElementPayload> {
    let payload = match model_type {
        ModelType::Property => ElementPayload::Property(Property {
            value_type: row
                .try_get::<Option<String>>("", "prop_value_type")?
                .unwrap_or_default(),
            value: row.try_get("", "prop_value")?,
        }),
        ModelType::MultiLanguageProperty => {
            ElementPayload::MultiLanguageProperty(MultiLanguageProperty::default())
        }
        ModelType::Blob => ElementPayload::Blob(BlobElement {
            content_type: row
                .try_get::<Option<String>>("", "blob_content_type")?
                .unwrap_or_default(),
            value: row
                .try_get::<Option<Vec<u8>>>("", "blob_value")?
                .unwrap_or_default(),
        }),
        ModelType::File => ElementPayload::File(FileElement {
            content_type: row
                .try_get::<Option<String>>("", "file_content_type")?
                .unwrap_or_default(),
            value: row.try_get("", "file_value")?,
        }),
        ModelType::Range => ElementPayload::Range(RangeElement {
            value_type: row
                .try_get::<Option<String>>("", "range_value_type")?
                .unwrap_or_default(),
            min: row.try_get("", "range_min")?,
            max: row.try_get("", "range_max")?,
        }),
        ModelType::ReferenceElement => {
            let raw: Option<String> = row.try_get("", "ref_value")?;
            ElementPayload::ReferenceElement(ReferenceElement {
                value: raw.as_deref().map(from_json).transpose()?,
            })
        }
        ModelType::RelationshipElement | ModelType::AnnotatedRelationshipElement => {
            let relationship = RelationshipElement {
                first: json_or_default(row.try_get("", "rel_first")?)?,
                second: json_or_default(row.try_get("", "rel_second")?)?,
            };
            if model_type == ModelType::AnnotatedRelationshipElement {
                ElementPayload::AnnotatedRelationshipElement(relationship)
            } else {
                ElementPayload::RelationshipElement(relationship)
            }
        }
        ModelType::Entity => ElementPayload::Entity(EntityElement {
            entity_type: row
                .try_get::<Option<String>>("", "entity_type")?
                .unwrap_or_default(),
            global_asset_id: row.try_get("", "entity_global_asset_id")?,
        }),
        ModelType::BasicEventElement => {
            let message_broker: Option<String> = row.try_get("", "bee_message_broker")?;
            ElementPayload::BasicEventElement(BasicEventElement {
                direction: row
                    .try_get::<Option<String>>("", "bee_direction")?
                    .unwrap_or_default(),
                state: row
                    .try_get::<Option<String>>("", "bee_state")?
                    .unwrap_or_default(),
                message_topic: row.try_get("", "bee_message_topic")?,
                observed: json_or_default(row.try_get("", "bee_observed")?)?,
                message_broker: message_broker.as_deref().map(from_json).transpose()?,
                last_update: row.try_get("", "bee_last_update")?,
                min_interval: row.try_get("", "bee_min_interval")?,
                max_interval: row.try_get("", "bee_max_interval")?,
            })
        }
        ModelType::Capability => ElementPayload::Capability,
        ModelType::Operation => ElementPayload::Operation(OperationElement {
            input_variables: json_or_default(row.try_get("", "op_input_variables")?)?,
            output_variables: json_or_default(row.try_get("", "op_output_variables")?)?,
            inoutput_variables: json_or_default(row.try_get("", "op_inoutput_variables")?)?,
        }),
        ModelType::SubmodelElementCollection => ElementPayload::Collection(Vec::new()),
        ModelType::SubmodelElementList => ElementPayload::List(ListElement {
            order_relevant: row
                .try_get::<Option<bool>>("", "list_order_relevant")?
                .unwrap_or(false),
            type_value_list_element: row.try_get("", "list_type_value_list_element")?,
            value_type_list_element: row.try_get("", "list_value_type_list_element")?,
            value: Vec::new(),
        }),
    };
    Ok(payload)
}

/// Fill in multi-language property values with one batched query.
async fn hydrate_mlp_values<C: ConnectionTrait>(
    conn: &C,
    nodes: &mut [RawNode],
) -> EidosResult<()> {
    let mut index: HashMap<i64, usize> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if matches!(
            node.element.payload,
            ElementPayload::MultiLanguageProperty(_)
        ) {
            index.insert(node.id, i);
        }
    }
    if index.is_empty() {
        return Ok(());
    }
    let select = Query::select()
        .from(EidosMlpValue::Table)
        .columns([
            EidosMlpValue::SmeId,
            EidosMlpValue::Language,
            EidosMlpValue::Text,
        ])
        .and_where(Expr::col(EidosMlpValue::SmeId).is_in(index.keys().copied()))
        .order_by(EidosMlpValue::SmeId, Order::Asc)
        .order_by(EidosMlpValue::Position, Order::Asc)
        .to_owned();
    for row in query_all(conn, &select).await? {
        let sme_id: i64 = row.try_get("", &col_name(EidosMlpValue::SmeId))?;
        let language: String = row.try_get("", &col_name(EidosMlpValue::Language))?;
        let text: String = row.try_get("", &col_name(EidosMlpValue::Text))?;
        if let Some(&i) = index.get(&sme_id) {
            if let ElementPayload::MultiLanguageProperty(mlp) = &mut nodes[i].element.payload {
                mlp.value.push(LangString { language, text });
            }
        }
    }
    Ok(())
}

struct ChildRef {
    id: i64,
    position: Option<i32>,
    path: String,
}

struct Forest {
    nodes: HashMap<i64, RawNode>,
    children: HashMap<i64, Vec<ChildRef>>,
    roots: Vec<(i64, String)>,
}

/// Index nodes by id and bucket them under their parents. A node whose
/// parent is not part of the fetched set counts as a root of the fetch.
fn index_rows(raw: Vec<RawNode>) -> Forest {
    let mut nodes: HashMap<i64, RawNode> = HashMap::with_capacity(raw.len());
    for node in raw {
        nodes.insert(node.id, node);
    }

    let mut children: HashMap<i64, Vec<ChildRef>> = HashMap::new();
    let mut roots: Vec<(i64, String)> = Vec::new();
    for node in nodes.values() {
        match node.parent_id {
            Some(parent_id) if nodes.contains_key(&parent_id) => {
                children.entry(parent_id).or_default().push(ChildRef {
                    id: node.id,
                    position: node.position,
                    path: node.path.clone(),
                });
            }
            _ => roots.push((node.id, node.path.clone())),
        }
    }

    for bucket in children.values_mut() {
        bucket.sort_by(sibling_order);
    }
    roots.sort_by(|a, b| a.1.cmp(&b.1));

    Forest {
        nodes,
        children,
        roots,
    }
}

/// Deterministic sibling order: position ascending where both have one, a
/// positioned node before an unpositioned one, path as the final tie-break.
fn sibling_order(a: &ChildRef, b: &ChildRef) -> Ordering {
    match (a.position, b.position) {
        (Some(left), Some(right)) => left.cmp(&right).then_with(|| a.path.cmp(&b.path)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.path.cmp(&b.path),
    }
}

/// Move the node out of the forest with its sorted children attached.
/// Children are only attached to container payloads; buckets under a leaf
/// node are dropped.
fn assemble(forest: &mut Forest, id: i64) -> Option<SubmodelElement> {
    let node = forest.nodes.remove(&id)?;
    let mut element = node.element;
    if let Some(kids) = forest.children.remove(&id) {
        if element.model_type().is_container() {
            for kid in kids {
                if let Some(child) = assemble(forest, kid.id) {
                    element.push_child(child);
                }
            }
        }
    }
    Some(element)
}

// ---------------------------------------------------------------------------
// Subtree deleter

/// Delete the element at `id_short_or_path` and its whole subtree. When the
/// target was an ordered-list member, close the index gap: shift later
/// siblings down one position and rewrite their paths (and their
/// descendants' path prefixes) to the new indexes.
pub(crate) async fn delete_subtree(
    tx: &DatabaseTransaction,
    submodel_db_id: i64,
    id_short_or_path: &str,
) -> EidosResult<()> {
    let trailing = if id_short_or_path.ends_with(']') {
        let (parent_path, index) = parse_trailing_index(id_short_or_path).ok_or_else(|| {
            EidosError::bad_request(format!(
                "malformed trailing list index in path '{id_short_or_path}'"
            ))
        })?;
        Some((parent_path.to_string(), index))
    } else {
        None
    };

    let delete = Query::delete()
        .from_table(EidosSubmodelElement::Table)
        .cond_where(
            Cond::all()
                .add(
                    Expr::col((
                        EidosSubmodelElement::Table,
                        EidosSubmodelElement::SubmodelId,
                    ))
                    .eq(submodel_db_id),
                )
                .add(path_scope_cond(id_short_or_path)),
        )
        .to_owned();
    let affected = exec_count(tx, &delete).await?;
    if affected == 0 {
        return Err(EidosError::not_found(format!(
            "element at path '{id_short_or_path}' not found"
        )));
    }
    debug!("deleted {affected} element rows under path '{id_short_or_path}'");

    if let Some((parent_path, index)) = trailing {
        renumber_list_after_delete(tx, submodel_db_id, &parent_path, index).await?;
    }
    Ok(())
}

async fn renumber_list_after_delete(
    tx: &DatabaseTransaction,
    submodel_db_id: i64,
    parent_path: &str,
    removed_index: i32,
) -> EidosResult<()> {
    let select_parent = Query::select()
        .from(EidosSubmodelElement::Table)
        .column(EidosSubmodelElement::Id)
        .and_where(Expr::col(EidosSubmodelElement::SubmodelId).eq(submodel_db_id))
        .and_where(Expr::col(EidosSubmodelElement::IdshortPath).eq(parent_path))
        .limit(1)
        .to_owned();
    let row = query_one(tx, &select_parent).await?.ok_or_else(|| {
        EidosError::storage(format!("list container at path '{parent_path}' not found"))
    })?;
    let parent_id: i64 = row.try_get("", &col_name(EidosSubmodelElement::Id))?;

    let shift = Query::update()
        .table(EidosSubmodelElement::Table)
        .value(
            EidosSubmodelElement::Position,
            Expr::col(EidosSubmodelElement::Position).sub(1),
        )
        .and_where(Expr::col(EidosSubmodelElement::ParentSmeId).eq(parent_id))
        .and_where(Expr::col(EidosSubmodelElement::Position).gt(removed_index))
        .to_owned();
    exec(tx, &shift).await?;

    // Positions are final now; walk the shifted siblings in ascending order
    // so each path rename lands on a slot the previous rename just vacated.
    let select_siblings = Query::select()
        .from(EidosSubmodelElement::Table)
        .columns([
            EidosSubmodelElement::Id,
            EidosSubmodelElement::Position,
            EidosSubmodelElement::IdshortPath,
        ])
        .and_where(Expr::col(EidosSubmodelElement::ParentSmeId).eq(parent_id))
        .and_where(Expr::col(EidosSubmodelElement::Position).gte(removed_index))
        .order_by(EidosSubmodelElement::Position, Order::Asc)
        .to_owned();
    for row in query_all(tx, &select_siblings).await? {
        let sibling_id: i64 = row.try_get("", &col_name(EidosSubmodelElement::Id))?;
        let position: Option<i32> = row.try_get("", &col_name(EidosSubmodelElement::Position))?;
        let old_path: String = row.try_get("", &col_name(EidosSubmodelElement::IdshortPath))?;
        let Some(position) = position else { continue };

        let new_path = child_path(parent_path, "", ContainerKind::List, position);
        if new_path == old_path {
            continue;
        }
        let rename = Query::update()
            .table(EidosSubmodelElement::Table)
            .value(EidosSubmodelElement::IdshortPath, new_path.clone())
            .and_where(Expr::col(EidosSubmodelElement::Id).eq(sibling_id))
            .to_owned();
        exec(tx, &rename).await?;
        rewrite_descendant_paths(tx, submodel_db_id, &old_path, &new_path).await?;
    }
    Ok(())
}

/// Rewrite the path prefix of every descendant of a renamed node so the
/// concatenation rule stays true below it.
async fn rewrite_descendant_paths(
    tx: &DatabaseTransaction,
    submodel_db_id: i64,
    old_prefix: &str,
    new_prefix: &str,
) -> EidosResult<()> {
    let col = (
        EidosSubmodelElement::Table,
        EidosSubmodelElement::IdshortPath,
    );
    let select = Query::select()
        .from(EidosSubmodelElement::Table)
        .columns([EidosSubmodelElement::Id, EidosSubmodelElement::IdshortPath])
        .cond_where(
            Cond::all()
                .add(
                    Expr::col((
                        EidosSubmodelElement::Table,
                        EidosSubmodelElement::SubmodelId,
                    ))
                    .eq(submodel_db_id),
                )
                .add(
                    Cond::any()
                        .add(Expr::col(col).like(format!("{old_prefix}.%")))
                        .add(Expr::col(col).like(format!("{old_prefix}[%"))),
                ),
        )
        .to_owned();
    for row in query_all(tx, &select).await? {
        let id: i64 = row.try_get("", &col_name(EidosSubmodelElement::Id))?;
        let path: String = row.try_get("", &col_name(EidosSubmodelElement::IdshortPath))?;
        let new_path = format!("{new_prefix}{}", &path[old_prefix.len()..]);
        let update = Query::update()
            .table(EidosSubmodelElement::Table)
            .value(EidosSubmodelElement::IdshortPath, new_path)
            .and_where(Expr::col(EidosSubmodelElement::Id).eq(id))
            .to_owned();
        exec(tx, &update).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Service facade

#[async_trait]
impl SubmodelApi for EidosStore {
    async fn create_submodel(&self, input: CreateSubmodelInput) -> EidosResult<i64> {
        let tx = self.conn.begin().await?;
        let existing = Query::select()
            .from(EidosSubmodel::Table)
            .column(EidosSubmodel::Id)
            .and_where(Expr::col(EidosSubmodel::Identifier).eq(input.identifier.as_str()))
            .limit(1)
            .to_owned();
        if query_one(&tx, &existing).await?.is_some() {
            return Err(EidosError::conflict(format!(
                "submodel '{}' already exists",
                input.identifier
            )));
        }
        let insert = Query::insert()
            .into_table(EidosSubmodel::Table)
            .columns([
                EidosSubmodel::Identifier,
                EidosSubmodel::IdShort,
                EidosSubmodel::Category,
            ])
            .values_panic([
                input.identifier.clone().into(),
                input.id_short.clone().into(),
                input.category.clone().into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;
        let id = submodel_db_id(&tx, &input.identifier).await?;
        tx.commit().await?;
        debug!("created submodel '{}'", input.identifier);
        Ok(id)
    }

    async fn delete_submodel(&self, identifier: &str) -> EidosResult<()> {
        let tx = self.conn.begin().await?;
        let delete = Query::delete()
            .from_table(EidosSubmodel::Table)
            .and_where(Expr::col(EidosSubmodel::Identifier).eq(identifier))
            .to_owned();
        let affected = exec_count(&tx, &delete).await?;
        if affected == 0 {
            return Err(EidosError::not_found(format!(
                "submodel '{identifier}' not found"
            )));
        }
        tx.commit().await?;
        debug!("deleted submodel '{identifier}'");
        Ok(())
    }
}

#[async_trait]
impl ElementWriteApi for EidosStore {
    async fn create_element(
        &self,
        submodel: &str,
        element: SubmodelElement,
    ) -> EidosResult<i64> {
        let tx = self.conn.begin().await?;
        let submodel_id = submodel_db_id(&tx, submodel).await?;
        let position = next_root_position(&tx, submodel_id).await?;
        let id =
            insert_element_tree(&tx, &self.registry, submodel_id, None, &element, position)
                .await?;
        tx.commit().await?;
        debug!(
            "created element '{}' in submodel '{submodel}'",
            element.id_short
        );
        Ok(id)
    }

    async fn create_element_at(
        &self,
        submodel: &str,
        parent_path: &str,
        element: SubmodelElement,
    ) -> EidosResult<i64> {
        let tx = self.conn.begin().await?;
        let submodel_id = submodel_db_id(&tx, submodel).await?;
        let parent = resolve_parent(&tx, submodel_id, parent_path).await?;
        let position = next_position(&tx, parent.id).await?;
        let id = insert_element_tree(
            &tx,
            &self.registry,
            submodel_id,
            Some(&parent),
            &element,
            position,
        )
        .await?;
        tx.commit().await?;
        debug!("created element under '{parent_path}' in submodel '{submodel}'");
        Ok(id)
    }

    async fn update_element(
        &self,
        submodel: &str,
        id_short_or_path: &str,
        element: SubmodelElement,
    ) -> EidosResult<()> {
        let tx = self.conn.begin().await?;
        let submodel_id = submodel_db_id(&tx, submodel).await?;
        let codec = self.registry.handler_for_type(element.model_type())?;
        codec
            .update(&tx, submodel_id, id_short_or_path, &element)
            .await?;
        tx.commit().await?;
        debug!("updated element at '{id_short_or_path}' in submodel '{submodel}'");
        Ok(())
    }
}

#[async_trait]
impl ElementReadApi for EidosStore {
    async fn get_element(
        &self,
        submodel: &str,
        id_short_or_path: &str,
    ) -> EidosResult<SubmodelElement> {
        if id_short_or_path.is_empty() {
            return Err(EidosError::bad_request("idShort or path must not be empty"));
        }
        let submodel_id = submodel_db_id(&self.conn, submodel).await?;
        let (mut elements, _) =
            load_elements(&self.conn, submodel_id, id_short_or_path, 0, None).await?;
        elements.pop().ok_or_else(|| {
            EidosError::not_found(format!(
                "element at path '{id_short_or_path}' not found in submodel '{submodel}'"
            ))
        })
    }

    async fn list_elements(&self, input: ListElementsInput) -> EidosResult<ElementPage> {
        let submodel_id = submodel_db_id(&self.conn, &input.submodel).await?;
        let (elements, next_cursor) = load_elements(
            &self.conn,
            submodel_id,
            "",
            input.limit,
            input.cursor.as_deref(),
        )
        .await?;
        Ok(ElementPage {
            elements,
            next_cursor,
        })
    }
}

#[async_trait]
impl ElementDeleteApi for EidosStore {
    async fn delete_element(&self, submodel: &str, id_short_or_path: &str) -> EidosResult<()> {
        if id_short_or_path.is_empty() {
            return Err(EidosError::bad_request("idShort or path must not be empty"));
        }
        let tx = self.conn.begin().await?;
        let submodel_id = submodel_db_id(&tx, submodel).await?;
        delete_subtree(&tx, submodel_id, id_short_or_path).await?;
        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw statement plumbing

pub(crate) fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> EidosResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(())
}

pub(crate) async fn exec_count<C, S>(conn: &C, stmt: &S) -> EidosResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> EidosResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> EidosResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

fn build_connection_url(config: &EidosConfig, base_dir: &Path) -> EidosResult<String> {
    match &config.database {
        DatabaseConfig::Sqlite { .. } => {
            let path = config.sqlite_path(base_dir)?;
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } => Ok(url.clone()),
        DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}

fn from_json<T: DeserializeOwned>(raw: &str) -> EidosResult<T> {
    serde_json::from_str(raw).map_err(|err| EidosError::storage(err.to_string()))
}

fn json_or_default<T: DeserializeOwned + Default>(raw: Option<String>) -> EidosResult<T> {
    match raw {
        Some(raw) => from_json(&raw),
        None => Ok(T::default()),
    }
}
