//! Accepted spellings per logical attribute.
//!
//! Exports from different tool versions (and hand-edited files) spell the
//! same attribute several ways. Each logical attribute maps to an ordered
//! list of keys; the first non-blank one wins.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    Name,
    InstanceName,
    /// `TYPE` on INSTANCE / TRANSFORMATION.
    Type,
    TransformationType,
    RefObject,
    FieldName,
    DataType,
    Precision,
    Scale,
    PortType,
    Expression,
    Db,
    Owner,
    FromInstance,
    FromPort,
    ToInstance,
    ToPort,
    Value,
}

impl Attr {
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Attr::Name => &["NAME"],
            Attr::InstanceName => &["NAME", "INSTANCE_NAME", "INSTANCENAME"],
            Attr::Type => &["TYPE"],
            Attr::TransformationType => &[
                "TRANSFORMATION_TYPE",
                "TRANSFORMATIONTYPE",
                "TRANSFORMTYPE",
            ],
            Attr::RefObject => &[
                "TRANSFORMATION_NAME",
                "REFOBJECTNAME",
                "REF_OBJECT_NAME",
                "REFOBJECT_NAME",
                "TRANFIRMATION_NAME",
            ],
            Attr::FieldName => &["NAME", "FIELDNAME", "COLUMN_NAME"],
            Attr::DataType => &["DATATYPE", "TYPE"],
            Attr::Precision => &["PRECISION"],
            Attr::Scale => &["SCALE"],
            Attr::PortType => &["PORTTYPE", "PORT_TYPE"],
            Attr::Expression => &["EXPRESSION", "EXPR"],
            Attr::Db => &["DBDNAME", "DBNAME", "DATABASENAME"],
            Attr::Owner => &["OWNERNAME", "OWNER", "SCHEMANAME"],
            Attr::FromInstance => &["FROMINSTANCE", "FROM_INSTANCE", "FROMINSTANCENAME"],
            Attr::FromPort => &["FROMFIELD", "FROMPORT", "FROM_FIELD", "FROM_PORT"],
            Attr::ToInstance => &["TOINSTANCE", "TO_INSTANCE", "TOINSTANCENAME"],
            Attr::ToPort => &["TOFIELD", "TOPORT", "TO_FIELD", "TO_PORT"],
            Attr::Value => &["VALUE"],
        }
    }
}
