//! The canonical lead record handed to persistence.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    aliases::{ContractType, LeadSource, LeadStatus, Priority},
    fields::LeadField,
    normalize::FieldValue,
};

/// How much of each record a batch writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    #[default]
    Full,
    BasicOnly,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Full => "full",
            ImportMode::BasicOnly => "basic_only",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full" => Ok(ImportMode::Full),
            "basic_only" | "basic" => Ok(ImportMode::BasicOnly),
            other => Err(format!("Unknown import mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanonicalLeadRecord {
    pub title: String,
    pub status: LeadStatus,
    pub source: LeadSource,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contract_value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contract_months: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contract_type: Option<ContractType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product_interest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lead_source_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expected_close_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub next_follow_up_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_contact_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lead_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub conversion_probability: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub external_lead_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub adset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub adset_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ad_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ad_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub closed_won_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub closed_lost_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lost_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub due_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub custom_fields: BTreeMap<String, String>,
}

impl CanonicalLeadRecord {
    pub fn new(title: impl Into<String>, status: LeadStatus, source: LeadSource) -> Self {
        Self {
            title: title.into(),
            status,
            source,
            ..Self::default()
        }
    }

    /// Stores a normalized value in the slot for `field`. Returns false when
    /// the value kind does not fit the field; the record is left unchanged.
    pub fn set(&mut self, field: LeadField, value: FieldValue) -> bool {
        use FieldValue as V;
        use LeadField as F;
        match (field, value) {
            (F::Title, V::Text(v)) => self.title = v,
            (F::Status, V::Status(v)) => self.status = v,
            (F::Source, V::Source(v)) => self.source = v,
            (F::Email, V::Text(v)) => self.email = Some(v),
            (F::Phone, V::Text(v)) => self.phone = Some(v),
            (F::Description, V::Text(v)) => self.description = Some(v),
            (F::Value, V::Decimal(v)) => self.value = Some(v),
            (F::ContractValue, V::Decimal(v)) => self.contract_value = Some(v),
            (F::ContractMonths, V::Integer(v)) => self.contract_months = Some(v),
            (F::ContractType, V::ContractType(v)) => self.contract_type = Some(v),
            (F::Priority, V::Priority(v)) => self.priority = Some(v),
            (F::ProductInterest, V::Text(v)) => self.product_interest = Some(v),
            (F::LeadSourceDetail, V::Text(v)) => self.lead_source_detail = Some(v),
            (F::ExpectedCloseDate, V::DateTime(v)) => self.expected_close_date = Some(v),
            (F::NextFollowUpDate, V::DateTime(v)) => self.next_follow_up_date = Some(v),
            (F::LastContactDate, V::DateTime(v)) => self.last_contact_date = Some(v),
            (F::LeadScore, V::Integer(v)) => self.lead_score = Some(v),
            (F::ConversionProbability, V::Decimal(v)) => self.conversion_probability = Some(v),
            (F::CampaignId, V::Text(v)) => self.campaign_id = Some(v),
            (F::ExternalLeadId, V::Text(v)) => self.external_lead_id = Some(v),
            (F::AdsetId, V::Text(v)) => self.adset_id = Some(v),
            (F::AdsetName, V::Text(v)) => self.adset_name = Some(v),
            (F::AdId, V::Text(v)) => self.ad_id = Some(v),
            (F::AdName, V::Text(v)) => self.ad_name = Some(v),
            (F::ClosedWonAt, V::DateTime(v)) => self.closed_won_at = Some(v),
            (F::ClosedLostAt, V::DateTime(v)) => self.closed_lost_at = Some(v),
            (F::LostReason, V::Text(v)) => self.lost_reason = Some(v),
            (F::DueDate, V::DateTime(v)) => self.due_date = Some(v),
            _ => return false,
        }
        true
    }

    /// Copy restricted to what `mode` writes.
    pub fn project(&self, mode: ImportMode) -> CanonicalLeadRecord {
        match mode {
            ImportMode::Full => self.clone(),
            ImportMode::BasicOnly => CanonicalLeadRecord {
                title: self.title.clone(),
                status: self.status.clone(),
                source: self.source,
                organization_id: self.organization_id.clone(),
                email: self.email.clone(),
                phone: self.phone.clone(),
                lead_source_detail: self.lead_source_detail.clone(),
                ..CanonicalLeadRecord::default()
            },
        }
    }
}
