//! Staff CRM domain: client rows, their editable fields, and the inline-edit grid.

pub mod filter;
pub mod grid;
pub mod session;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

/// Date format used by the visit-date column on the wire.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldValueError {
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("{field} cannot be empty")]
    Required { field: ClientField },
    #[error("invalid value for {field}: {value:?}")]
    InvalidOption { field: ClientField, value: String },
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Closed set of text-backed options stored as `snake_case` strings.
macro_rules! text_enum {
    ($name:ident, $field:expr, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
        #[serde(rename_all = "snake_case")]
        #[ts(export)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = FieldValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(FieldValueError::InvalidOption {
                        field: $field,
                        value: s.to_owned(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = FieldValueError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(LeadStage, ClientField::LeadStage, {
    FollowUpReq => "follow_up_req",
    Dnp => "dnp",
    Disqualified => "disqualified",
    CallbackLater => "callback_later",
});

text_enum!(LeadType, ClientField::LeadType, {
    Hot => "hot",
    Warm => "warm",
    Cold => "cold",
});

text_enum!(DealStatus, ClientField::DealStatus, {
    Open => "open",
    Locked => "locked",
    Lost => "lost",
});

/// One lead in a CRM sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, TS)]
#[ts(export)]
pub struct CrmClient {
    pub id: Uuid,
    pub client_name: String,
    pub customer_number: Option<String>,
    #[sqlx(try_from = "String")]
    pub lead_stage: LeadStage,
    #[sqlx(try_from = "String")]
    pub lead_type: LeadType,
    #[sqlx(try_from = "String")]
    pub deal_status: DealStatus,
    pub location_category: Option<String>,
    pub calling_comment: Option<String>,
    pub admin_notes: Option<String>,
    pub expected_visit_date: Option<NaiveDate>,
    pub sheet_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// How a cell is edited, which decides when an edit commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum FieldKind {
    /// Commits as soon as an option is picked.
    Select,
    /// Commits on blur or Enter.
    Text,
    /// Commits as soon as the date changes.
    Date,
}

/// Inline-editable columns of `crm_clients`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ClientField {
    ClientName,
    CustomerNumber,
    LeadStage,
    LeadType,
    DealStatus,
    LocationCategory,
    CallingComment,
    AdminNotes,
    ExpectedVisitDate,
}

impl ClientField {
    pub const ALL: &'static [ClientField] = &[
        ClientField::ClientName,
        ClientField::CustomerNumber,
        ClientField::LeadStage,
        ClientField::LeadType,
        ClientField::DealStatus,
        ClientField::LocationCategory,
        ClientField::CallingComment,
        ClientField::AdminNotes,
        ClientField::ExpectedVisitDate,
    ];

    /// Column name in `crm_clients`. Safe to interpolate into SQL.
    pub fn column(self) -> &'static str {
        match self {
            ClientField::ClientName => "client_name",
            ClientField::CustomerNumber => "customer_number",
            ClientField::LeadStage => "lead_stage",
            ClientField::LeadType => "lead_type",
            ClientField::DealStatus => "deal_status",
            ClientField::LocationCategory => "location_category",
            ClientField::CallingComment => "calling_comment",
            ClientField::AdminNotes => "admin_notes",
            ClientField::ExpectedVisitDate => "expected_visit_date",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            ClientField::LeadStage | ClientField::LeadType | ClientField::DealStatus => {
                FieldKind::Select
            }
            ClientField::ExpectedVisitDate => FieldKind::Date,
            _ => FieldKind::Text,
        }
    }

    fn nullable(self) -> bool {
        !matches!(
            self,
            ClientField::ClientName
                | ClientField::LeadStage
                | ClientField::LeadType
                | ClientField::DealStatus
        )
    }

    /// Validate an edited value and map it to what gets stored.
    ///
    /// Empty input clears nullable columns (`None`) and is rejected elsewhere.
    pub fn normalize(self, value: &str) -> Result<Option<String>, FieldValueError> {
        let value = value.trim();
        if value.is_empty() {
            return if self.nullable() {
                Ok(None)
            } else {
                Err(FieldValueError::Required { field: self })
            };
        }

        match self {
            ClientField::LeadStage => value.parse::<LeadStage>().map(|_| ()),
            ClientField::LeadType => value.parse::<LeadType>().map(|_| ()),
            ClientField::DealStatus => value.parse::<DealStatus>().map(|_| ()),
            ClientField::ExpectedVisitDate => parse_date(value).map(|_| ()),
            _ => Ok(()),
        }?;
        Ok(Some(value.to_owned()))
    }
}

impl FromStr for ClientField {
    type Err = FieldValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientField::ALL
            .iter()
            .copied()
            .find(|f| f.column() == s)
            .ok_or_else(|| FieldValueError::UnknownField(s.to_owned()))
    }
}

impl fmt::Display for ClientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, FieldValueError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| FieldValueError::InvalidDate(value.to_owned()))
}

impl CrmClient {
    /// Current value of a field as edited in the grid; `""` when unset.
    pub fn get_field(&self, field: ClientField) -> String {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        match field {
            ClientField::ClientName => self.client_name.clone(),
            ClientField::CustomerNumber => text(&self.customer_number),
            ClientField::LeadStage => self.lead_stage.to_string(),
            ClientField::LeadType => self.lead_type.to_string(),
            ClientField::DealStatus => self.deal_status.to_string(),
            ClientField::LocationCategory => text(&self.location_category),
            ClientField::CallingComment => text(&self.calling_comment),
            ClientField::AdminNotes => text(&self.admin_notes),
            ClientField::ExpectedVisitDate => self
                .expected_visit_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
        }
    }

    /// Overwrite one field from its edited text. Leaves the row untouched on error.
    pub fn set_field(&mut self, field: ClientField, value: &str) -> Result<(), FieldValueError> {
        let stored = field.normalize(value)?;
        match field {
            ClientField::ClientName => self.client_name = stored.unwrap_or_default(),
            ClientField::CustomerNumber => self.customer_number = stored,
            ClientField::LeadStage => {
                self.lead_stage = stored.as_deref().unwrap_or_default().parse()?
            }
            ClientField::LeadType => {
                self.lead_type = stored.as_deref().unwrap_or_default().parse()?
            }
            ClientField::DealStatus => {
                self.deal_status = stored.as_deref().unwrap_or_default().parse()?
            }
            ClientField::LocationCategory => self.location_category = stored,
            ClientField::CallingComment => self.calling_comment = stored,
            ClientField::AdminNotes => self.admin_notes = stored,
            ClientField::ExpectedVisitDate => {
                self.expected_visit_date = stored.as_deref().map(parse_date).transpose()?
            }
        }
        Ok(())
    }
}
