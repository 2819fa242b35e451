//! Closed enumerations of the CRM lead model and their alias tables.
//!
//! Spreadsheets spell the same pipeline stage or channel in many ways
//! ("Ganho", "fechado ganho", "GANHO"). Each enum owns a static table keyed by
//! the canonical token produced by [`crate::normalize::canonical_token`];
//! `resolve_alias` expects a token that is already canonical.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::normalize::canonical_token;

fn lookup<T: Clone>(table: &[(&str, T)], token: &str) -> Option<T> {
    table
        .iter()
        .find(|(alias, _)| *alias == token)
        .map(|(_, value)| value.clone())
}

/// Pipeline stage of a lead.
///
/// Unlike the other enums, status accepts values outside the alias table:
/// they are kept as [`LeadStatus::Custom`], trimmed but otherwise as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum LeadStatus {
    #[default]
    NovoLead,
    Qualificacao,
    Proposta,
    Negociacao,
    FechadoGanho,
    FechadoPerdido,
    FollowUp,
    AguardandoResposta,
    Custom(String),
}

const STATUS_ALIASES: &[(&str, LeadStatus)] = &[
    ("novo_lead", LeadStatus::NovoLead),
    ("novo", LeadStatus::NovoLead),
    ("new", LeadStatus::NovoLead),
    ("qualificacao", LeadStatus::Qualificacao),
    ("qualificacao_lead", LeadStatus::Qualificacao),
    ("qualificado", LeadStatus::Qualificacao),
    ("qualified", LeadStatus::Qualificacao),
    ("proposta", LeadStatus::Proposta),
    ("proposal", LeadStatus::Proposta),
    ("negociacao", LeadStatus::Negociacao),
    ("negotiation", LeadStatus::Negociacao),
    ("fechado_ganho", LeadStatus::FechadoGanho),
    ("ganho", LeadStatus::FechadoGanho),
    ("won", LeadStatus::FechadoGanho),
    ("fechado_perdido", LeadStatus::FechadoPerdido),
    ("perdido", LeadStatus::FechadoPerdido),
    ("lost", LeadStatus::FechadoPerdido),
    ("follow_up", LeadStatus::FollowUp),
    ("follow", LeadStatus::FollowUp),
    ("aguardando_resposta", LeadStatus::AguardandoResposta),
    ("aguardando", LeadStatus::AguardandoResposta),
];

impl LeadStatus {
    pub fn resolve_alias(token: &str) -> Option<Self> {
        lookup(STATUS_ALIASES, token)
    }

    /// Resolves a stage as written in a sheet. The alias lookup uses the
    /// canonical token; a miss keeps the trimmed text verbatim. `None` for
    /// blank input.
    pub fn from_label(raw: &str) -> Option<Self> {
        let label = raw.trim();
        if label.is_empty() {
            return None;
        }
        let status = Self::resolve_alias(&canonical_token(label))
            .unwrap_or_else(|| LeadStatus::Custom(label.to_string()));
        Some(status)
    }

    pub fn as_str(&self) -> &str {
        match self {
            LeadStatus::NovoLead => "novo_lead",
            LeadStatus::Qualificacao => "qualificacao",
            LeadStatus::Proposta => "proposta",
            LeadStatus::Negociacao => "negociacao",
            LeadStatus::FechadoGanho => "fechado_ganho",
            LeadStatus::FechadoPerdido => "fechado_perdido",
            LeadStatus::FollowUp => "follow_up",
            LeadStatus::AguardandoResposta => "aguardando_resposta",
            LeadStatus::Custom(value) => value,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, LeadStatus::Custom(_))
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LeadStatus::from_label(value).ok_or_else(|| "Status cannot be empty".to_string())
    }
}

impl Serialize for LeadStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LeadStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

const PRIORITY_ALIASES: &[(&str, Priority)] = &[
    ("baixa", Priority::Low),
    ("low", Priority::Low),
    ("media", Priority::Medium),
    ("medio", Priority::Medium),
    ("medium", Priority::Medium),
    ("alta", Priority::High),
    ("high", Priority::High),
    ("urgente", Priority::Urgent),
    ("urgent", Priority::Urgent),
];

impl Priority {
    pub fn resolve_alias(token: &str) -> Option<Self> {
        lookup(PRIORITY_ALIASES, token)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acquisition channel of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    #[default]
    Manual,
    MetaAds,
    Whatsapp,
    GoogleAds,
    Site,
    Email,
    Telefone,
    Indicacao,
    Evento,
}

const SOURCE_ALIASES: &[(&str, LeadSource)] = &[
    ("manual", LeadSource::Manual),
    ("meta_ads", LeadSource::MetaAds),
    ("meta", LeadSource::MetaAds),
    ("facebook", LeadSource::MetaAds),
    ("instagram", LeadSource::MetaAds),
    ("whatsapp", LeadSource::Whatsapp),
    ("whats", LeadSource::Whatsapp),
    ("google_ads", LeadSource::GoogleAds),
    ("google", LeadSource::GoogleAds),
    ("site", LeadSource::Site),
    ("website", LeadSource::Site),
    ("email", LeadSource::Email),
    ("telefone", LeadSource::Telefone),
    ("phone", LeadSource::Telefone),
    ("indicacao", LeadSource::Indicacao),
    ("referencia", LeadSource::Indicacao),
    ("referral", LeadSource::Indicacao),
    ("evento", LeadSource::Evento),
    ("event", LeadSource::Evento),
];

impl LeadSource {
    pub fn resolve_alias(token: &str) -> Option<Self> {
        lookup(SOURCE_ALIASES, token)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Manual => "manual",
            LeadSource::MetaAds => "meta_ads",
            LeadSource::Whatsapp => "whatsapp",
            LeadSource::GoogleAds => "google_ads",
            LeadSource::Site => "site",
            LeadSource::Email => "email",
            LeadSource::Telefone => "telefone",
            LeadSource::Indicacao => "indicacao",
            LeadSource::Evento => "evento",
        }
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LeadSource::resolve_alias(&canonical_token(value))
            .ok_or_else(|| format!("Unknown lead source '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Monthly,
    Annual,
    OneTime,
}

const CONTRACT_TYPE_ALIASES: &[(&str, ContractType)] = &[
    ("mensal", ContractType::Monthly),
    ("month", ContractType::Monthly),
    ("monthly", ContractType::Monthly),
    ("anual", ContractType::Annual),
    ("anuidade", ContractType::Annual),
    ("yearly", ContractType::Annual),
    ("annual", ContractType::Annual),
    ("unico", ContractType::OneTime),
    ("once", ContractType::OneTime),
    ("one_time", ContractType::OneTime),
];

impl ContractType {
    pub fn resolve_alias(token: &str) -> Option<Self> {
        lookup(CONTRACT_TYPE_ALIASES, token)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Monthly => "monthly",
            ContractType::Annual => "annual",
            ContractType::OneTime => "one_time",
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
