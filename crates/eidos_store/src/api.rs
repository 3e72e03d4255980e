use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use eidos_core::SubmodelElement;

use crate::EidosResult;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubmodelInput {
    pub identifier: String,
    pub id_short: Option<String>,
    pub category: Option<String>,
}

#[async_trait]
pub trait SubmodelApi {
    async fn create_submodel(&self, input: CreateSubmodelInput) -> EidosResult<i64>;
    async fn delete_submodel(&self, identifier: &str) -> EidosResult<()>;
}

#[async_trait]
pub trait ElementWriteApi {
    /// Create a top-level element (the whole payload subtree is inserted).
    async fn create_element(
        &self,
        submodel: &str,
        element: SubmodelElement,
    ) -> EidosResult<i64>;

    /// Create an element under an existing container path.
    async fn create_element_at(
        &self,
        submodel: &str,
        parent_path: &str,
        element: SubmodelElement,
    ) -> EidosResult<i64>;

    /// Replace the head fields and payload of an existing element in place.
    /// Identity (idShort, path, parent, position, model type) is immutable;
    /// container children are not touched.
    async fn update_element(
        &self,
        submodel: &str,
        id_short_or_path: &str,
        element: SubmodelElement,
    ) -> EidosResult<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListElementsInput {
    pub submodel: String,
    /// 0 selects the default page size.
    pub limit: u32,
    /// idShort of the last root returned by the previous page.
    pub cursor: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementPage {
    pub elements: Vec<SubmodelElement>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait ElementReadApi {
    async fn get_element(
        &self,
        submodel: &str,
        id_short_or_path: &str,
    ) -> EidosResult<SubmodelElement>;

    async fn list_elements(&self, input: ListElementsInput) -> EidosResult<ElementPage>;
}

#[async_trait]
pub trait ElementDeleteApi {
    async fn delete_element(&self, submodel: &str, id_short_or_path: &str) -> EidosResult<()>;
}

pub trait EidosRepository:
    SubmodelApi + ElementWriteApi + ElementReadApi + ElementDeleteApi + Send + Sync
{
}

impl<T> EidosRepository for T where
    T: SubmodelApi + ElementWriteApi + ElementReadApi + ElementDeleteApi + Send + Sync
{
}
