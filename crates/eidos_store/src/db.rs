use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum EidosSchemaVersion {
    Table,
    Version,
    AppliedAtMicros,
    Checksum,
    AppVersion,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosSubmodel {
    Table,
    Id,
    Identifier,
    IdShort,
    Category,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosSubmodelElement {
    Table,
    Id,
    SubmodelId,
    ParentSmeId,
    RootSmeId,
    Position,
    IdShort,
    Category,
    ModelType,
    SemanticId,
    IdshortPath,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosProperty {
    Table,
    SmeId,
    ValueType,
    Value,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosMlpValue {
    Table,
    SmeId,
    Position,
    Language,
    Text,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosBlob {
    Table,
    SmeId,
    ContentType,
    Value,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosFile {
    Table,
    SmeId,
    ContentType,
    Value,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosRange {
    Table,
    SmeId,
    ValueType,
    MinValue,
    MaxValue,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosReferenceElement {
    Table,
    SmeId,
    Value,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosRelationship {
    Table,
    SmeId,
    First,
    Second,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosEntity {
    Table,
    SmeId,
    EntityType,
    GlobalAssetId,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosBasicEvent {
    Table,
    SmeId,
    Direction,
    State,
    MessageTopic,
    Observed,
    MessageBroker,
    LastUpdate,
    MinInterval,
    MaxInterval,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosList {
    Table,
    SmeId,
    OrderRelevant,
    TypeValueListElement,
    ValueTypeListElement,
}

#[derive(Iden, Clone, Copy)]
pub enum EidosOperation {
    Table,
    SmeId,
    InputVariables,
    OutputVariables,
    InoutputVariables,
}
