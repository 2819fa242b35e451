//! The fixed set of mappable lead fields.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Parser family applied to a field's cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Email,
    Phone,
    Integer,
    Decimal,
    Percentage,
    Score,
    Date,
    Status,
    Source,
    Priority,
    ContractType,
}

/// Canonical lead fields a column can be bound to. Declaration order is the
/// order in which the column matcher claims columns.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Title,
    Email,
    Phone,
    Description,
    Status,
    Value,
    ContractValue,
    ContractMonths,
    ContractType,
    Priority,
    Source,
    ProductInterest,
    LeadSourceDetail,
    ExpectedCloseDate,
    NextFollowUpDate,
    LastContactDate,
    LeadScore,
    ConversionProbability,
    CampaignId,
    ExternalLeadId,
    AdsetId,
    AdsetName,
    AdId,
    AdName,
    ClosedWonAt,
    ClosedLostAt,
    LostReason,
    DueDate,
}

impl LeadField {
    pub const ALL: [LeadField; 28] = [
        LeadField::Title,
        LeadField::Email,
        LeadField::Phone,
        LeadField::Description,
        LeadField::Status,
        LeadField::Value,
        LeadField::ContractValue,
        LeadField::ContractMonths,
        LeadField::ContractType,
        LeadField::Priority,
        LeadField::Source,
        LeadField::ProductInterest,
        LeadField::LeadSourceDetail,
        LeadField::ExpectedCloseDate,
        LeadField::NextFollowUpDate,
        LeadField::LastContactDate,
        LeadField::LeadScore,
        LeadField::ConversionProbability,
        LeadField::CampaignId,
        LeadField::ExternalLeadId,
        LeadField::AdsetId,
        LeadField::AdsetName,
        LeadField::AdId,
        LeadField::AdName,
        LeadField::ClosedWonAt,
        LeadField::ClosedLostAt,
        LeadField::LostReason,
        LeadField::DueDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadField::Title => "title",
            LeadField::Email => "email",
            LeadField::Phone => "phone",
            LeadField::Description => "description",
            LeadField::Status => "status",
            LeadField::Value => "value",
            LeadField::ContractValue => "contract_value",
            LeadField::ContractMonths => "contract_months",
            LeadField::ContractType => "contract_type",
            LeadField::Priority => "priority",
            LeadField::Source => "source",
            LeadField::ProductInterest => "product_interest",
            LeadField::LeadSourceDetail => "lead_source_detail",
            LeadField::ExpectedCloseDate => "expected_close_date",
            LeadField::NextFollowUpDate => "next_follow_up_date",
            LeadField::LastContactDate => "last_contact_date",
            LeadField::LeadScore => "lead_score",
            LeadField::ConversionProbability => "conversion_probability",
            LeadField::CampaignId => "campaign_id",
            LeadField::ExternalLeadId => "external_lead_id",
            LeadField::AdsetId => "adset_id",
            LeadField::AdsetName => "adset_name",
            LeadField::AdId => "ad_id",
            LeadField::AdName => "ad_name",
            LeadField::ClosedWonAt => "closed_won_at",
            LeadField::ClosedLostAt => "closed_lost_at",
            LeadField::LostReason => "lost_reason",
            LeadField::DueDate => "due_date",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            LeadField::Email => FieldKind::Email,
            LeadField::Phone => FieldKind::Phone,
            LeadField::Status => FieldKind::Status,
            LeadField::Value | LeadField::ContractValue => FieldKind::Decimal,
            LeadField::ContractMonths => FieldKind::Integer,
            LeadField::ContractType => FieldKind::ContractType,
            LeadField::Priority => FieldKind::Priority,
            LeadField::Source => FieldKind::Source,
            LeadField::LeadScore => FieldKind::Score,
            LeadField::ConversionProbability => FieldKind::Percentage,
            LeadField::ExpectedCloseDate
            | LeadField::NextFollowUpDate
            | LeadField::LastContactDate
            | LeadField::ClosedWonAt
            | LeadField::ClosedLostAt
            | LeadField::DueDate => FieldKind::Date,
            LeadField::Title
            | LeadField::Description
            | LeadField::ProductInterest
            | LeadField::LeadSourceDetail
            | LeadField::CampaignId
            | LeadField::ExternalLeadId
            | LeadField::AdsetId
            | LeadField::AdsetName
            | LeadField::AdId
            | LeadField::AdName
            | LeadField::LostReason => FieldKind::Text,
        }
    }

    /// Substrings that identify this field in a header, already in
    /// canonical-label form.
    pub fn guess_patterns(&self) -> &'static [&'static str] {
        match self {
            LeadField::Title => &[
                "nome",
                "titulo",
                "title",
                "lead name",
                "nome completo",
                "cliente",
                "customer",
            ],
            LeadField::Email => &["email", "e-mail", "mail"],
            LeadField::Phone => &["telefone", "phone", "celular", "whatsapp"],
            LeadField::Description => &["descricao", "description", "notes", "context"],
            LeadField::Status => &["status", "etapa", "fase", "stage"],
            LeadField::Value => &["valor", "value", "amount", "investment"],
            LeadField::ContractValue => &["contract_value", "valor contrato", "contrato valor"],
            LeadField::ContractMonths => &["contract_months", "meses", "months"],
            LeadField::ContractType => &["tipo contrato", "contract_type"],
            LeadField::Priority => &["prioridade", "priority"],
            LeadField::Source => &["origem", "source"],
            LeadField::ProductInterest => &["produto", "product_interest"],
            LeadField::LeadSourceDetail => &["lead_source_detail", "origem detalhe", "channel"],
            LeadField::ExpectedCloseDate => &["expected_close_date", "previsao", "fechamento"],
            LeadField::NextFollowUpDate => &["next_follow_up_date", "follow"],
            LeadField::LastContactDate => &["last_contact_date", "ultimo contato"],
            LeadField::LeadScore => &["lead_score", "score"],
            LeadField::ConversionProbability => {
                &["conversion_probability", "probabilidade", "conversion"]
            }
            LeadField::CampaignId => &["campaign_id", "campanha", "campaign"],
            LeadField::ExternalLeadId => &["external_lead_id", "id externo", "external"],
            LeadField::AdsetId => &["adset_id"],
            LeadField::AdsetName => &["adset_name", "nome adset", "conjunto"],
            LeadField::AdId => &["ad_id"],
            LeadField::AdName => &["ad_name", "nome ad", "anuncio"],
            LeadField::ClosedWonAt => &["closed_won_at", "ganho", "win"],
            LeadField::ClosedLostAt => &["closed_lost_at", "perdido", "lost"],
            LeadField::LostReason => &["lost_reason", "motivo", "reason"],
            LeadField::DueDate => &["due_date", "vencimento"],
        }
    }

    /// Fields written in `basic_only` mode besides the organization id.
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            LeadField::Title
                | LeadField::Status
                | LeadField::Source
                | LeadField::Email
                | LeadField::Phone
                | LeadField::LeadSourceDetail
        )
    }
}

/// Company registry columns the matcher binds as custom fields, keyed by the
/// custom field name. Patterns are in canonical-label form.
pub const COMPANY_FIELDS: [(&str, &[&str]); 16] = [
    ("cnpj", &["cnpj", "cnpj/cpf", "cpf/cnpj", "documento"]),
    ("razao_social", &["razao social", "nome empresarial", "empresa"]),
    ("porte", &["porte", "tamanho"]),
    ("capital_social", &["capital social", "capital"]),
    ("data_abertura", &["data de abertura", "data abertura", "abertura"]),
    ("nome_fantasia", &["nome fantasia", "fantasia", "nome comercial"]),
    ("telefone_principal", &["telefone principal", "telefone 1", "fone principal"]),
    ("telefone_secundario", &["telefone secundario", "telefone 2", "fone secundario"]),
    ("logradouro", &["logradouro", "endereco", "rua"]),
    ("numero", &["numero", "nro"]),
    ("complemento", &["complemento", "compl"]),
    ("bairro", &["bairro", "distrito"]),
    ("cidade", &["cidade", "municipio", "localidade"]),
    ("estado", &["estado", "uf"]),
    ("cep", &["cep", "codigo postal", "postal code"]),
    ("atividade_principal", &["atividade principal", "cnae", "ramo de atividade"]),
];

impl fmt::Display for LeadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        LeadField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("Unknown lead field '{value}'"))
    }
}
