use crate::error::RuleError;
use crate::predicates;
use crate::rules::{Field, FieldKind};
use crate::store::EmailRecord;
use chrono::{DateTime, Utc};

/// A field value pulled from an email, typed by the field it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(DateTime<Utc>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Date(_) => FieldKind::Date,
        }
    }
}

/// Text fields never fail; an absent attribute is the empty string.
/// The received date fails when the persisted value can't be parsed.
pub fn extract(email: &EmailRecord, field: Field) -> Result<FieldValue, RuleError> {
    match field {
        Field::From => Ok(FieldValue::Text(email.from.clone())),
        Field::To => Ok(FieldValue::Text(email.to.clone())),
        Field::Subject => Ok(FieldValue::Text(email.subject.clone())),
        Field::Message => Ok(FieldValue::Text(email.message_body.clone())),
        Field::ReceivedDate => predicates::parse_datetime(&email.received_date)
            .map(FieldValue::Date)
            .ok_or_else(|| RuleError::InvalidRecord {
                id: email.id.clone(),
                reason: format!("unparsable received date '{}'", email.received_date),
            }),
    }
}
