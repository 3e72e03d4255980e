use serde::{Deserialize, Serialize};

/// Discriminator for the closed set of element variants persisted by the
/// store. The numeric tags are stable and written to the database, so new
/// variants must only ever be appended.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum ModelType {
    AnnotatedRelationshipElement = 1,
    BasicEventElement = 2,
    Blob = 3,
    Capability = 4,
    Entity = 5,
    File = 6,
    MultiLanguageProperty = 7,
    Operation = 8,
    Property = 9,
    Range = 10,
    ReferenceElement = 11,
    RelationshipElement = 12,
    SubmodelElementCollection = 13,
    SubmodelElementList = 14,
}

impl ModelType {
    pub const ALL: [ModelType; 14] = [
        ModelType::AnnotatedRelationshipElement,
        ModelType::BasicEventElement,
        ModelType::Blob,
        ModelType::Capability,
        ModelType::Entity,
        ModelType::File,
        ModelType::MultiLanguageProperty,
        ModelType::Operation,
        ModelType::Property,
        ModelType::Range,
        ModelType::ReferenceElement,
        ModelType::RelationshipElement,
        ModelType::SubmodelElementCollection,
        ModelType::SubmodelElementList,
    ];

    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(ModelType::AnnotatedRelationshipElement),
            2 => Some(ModelType::BasicEventElement),
            3 => Some(ModelType::Blob),
            4 => Some(ModelType::Capability),
            5 => Some(ModelType::Entity),
            6 => Some(ModelType::File),
            7 => Some(ModelType::MultiLanguageProperty),
            8 => Some(ModelType::Operation),
            9 => Some(ModelType::Property),
            10 => Some(ModelType::Range),
            11 => Some(ModelType::ReferenceElement),
            12 => Some(ModelType::RelationshipElement),
            13 => Some(ModelType::SubmodelElementCollection),
            14 => Some(ModelType::SubmodelElementList),
            _ => None,
        }
    }

    /// Only the two container kinds may own child rows; every other variant
    /// is a leaf even if orphaned rows point at it.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            ModelType::SubmodelElementCollection | ModelType::SubmodelElementList
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::AnnotatedRelationshipElement => "AnnotatedRelationshipElement",
            ModelType::BasicEventElement => "BasicEventElement",
            ModelType::Blob => "Blob",
            ModelType::Capability => "Capability",
            ModelType::Entity => "Entity",
            ModelType::File => "File",
            ModelType::MultiLanguageProperty => "MultiLanguageProperty",
            ModelType::Operation => "Operation",
            ModelType::Property => "Property",
            ModelType::Range => "Range",
            ModelType::ReferenceElement => "ReferenceElement",
            ModelType::RelationshipElement => "RelationshipElement",
            ModelType::SubmodelElementCollection => "SubmodelElementCollection",
            ModelType::SubmodelElementList => "SubmodelElementList",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub key_type: String,
    pub value: String,
}

/// Opaque reference to another model element or external resource. The store
/// round-trips references without interpreting them; dereferencing belongs to
/// an external resolver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub reference_type: String,
    pub keys: Vec<Key>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangString {
    pub language: String,
    pub text: String,
}

/// A typed operation argument. Variables nest a full element but are stored
/// as one serialized document, not as element rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationVariable {
    pub value: SubmodelElement,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub value_type: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiLanguageProperty {
    pub value: Vec<LangString>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlobElement {
    pub content_type: String,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FileElement {
    pub content_type: String,
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeElement {
    pub value_type: String,
    pub min: Option<String>,
    pub max: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceElement {
    pub value: Option<Reference>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipElement {
    pub first: Reference,
    pub second: Reference,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityElement {
    pub entity_type: String,
    pub global_asset_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicEventElement {
    pub direction: String,
    pub state: String,
    pub message_topic: Option<String>,
    pub observed: Reference,
    pub message_broker: Option<Reference>,
    pub last_update: Option<String>,
    pub min_interval: Option<String>,
    pub max_interval: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationElement {
    pub input_variables: Vec<OperationVariable>,
    pub output_variables: Vec<OperationVariable>,
    pub inoutput_variables: Vec<OperationVariable>,
}

/// Ordered container. Children live in `value`; their sibling positions are
/// the vector indexes and their paths carry a `[index]` suffix.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListElement {
    pub order_relevant: bool,
    pub type_value_list_element: Option<String>,
    pub value_type_list_element: Option<String>,
    pub value: Vec<SubmodelElement>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ElementPayload {
    Property(Property),
    MultiLanguageProperty(MultiLanguageProperty),
    Blob(BlobElement),
    File(FileElement),
    Range(RangeElement),
    ReferenceElement(ReferenceElement),
    RelationshipElement(RelationshipElement),
    AnnotatedRelationshipElement(RelationshipElement),
    Entity(EntityElement),
    BasicEventElement(BasicEventElement),
    Capability,
    Operation(OperationElement),
    Collection(Vec<SubmodelElement>),
    List(ListElement),
}

/// One node of a submodel tree. `id_short` is the local name segment; list
/// children may leave it empty because their path segment is the index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmodelElement {
    pub id_short: String,
    pub category: Option<String>,
    pub semantic_id: Option<Reference>,
    pub payload: ElementPayload,
}

impl SubmodelElement {
    pub fn new(id_short: impl Into<String>, payload: ElementPayload) -> Self {
        Self {
            id_short: id_short.into(),
            category: None,
            semantic_id: None,
            payload,
        }
    }

    pub fn model_type(&self) -> ModelType {
        match &self.payload {
            ElementPayload::Property(_) => ModelType::Property,
            ElementPayload::MultiLanguageProperty(_) => ModelType::MultiLanguageProperty,
            ElementPayload::Blob(_) => ModelType::Blob,
            ElementPayload::File(_) => ModelType::File,
            ElementPayload::Range(_) => ModelType::Range,
            ElementPayload::ReferenceElement(_) => ModelType::ReferenceElement,
            ElementPayload::RelationshipElement(_) => ModelType::RelationshipElement,
            ElementPayload::AnnotatedRelationshipElement(_) => {
                ModelType::AnnotatedRelationshipElement
            }
            ElementPayload::Entity(_) => ModelType::Entity,
            ElementPayload::BasicEventElement(_) => ModelType::BasicEventElement,
            ElementPayload::Capability => ModelType::Capability,
            ElementPayload::Operation(_) => ModelType::Operation,
            ElementPayload::Collection(_) => ModelType::SubmodelElementCollection,
            ElementPayload::List(_) => ModelType::SubmodelElementList,
        }
    }

    pub fn children(&self) -> &[SubmodelElement] {
        match &self.payload {
            ElementPayload::Collection(children) => children,
            ElementPayload::List(list) => &list.value,
            _ => &[],
        }
    }

    /// Attach a child to a container payload. Returns false (and drops the
    /// child) for leaf payloads.
    pub fn push_child(&mut self, child: SubmodelElement) -> bool {
        match &mut self.payload {
            ElementPayload::Collection(children) => {
                children.push(child);
                true
            }
            ElementPayload::List(list) => {
                list.value.push(child);
                true
            }
            _ => false,
        }
    }
}
