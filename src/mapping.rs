//! Column mappings and the header auto-matcher.

use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::{
    fields::{COMPANY_FIELDS, LeadField},
    normalize::canonical_token,
};

pub const CUSTOM_FIELD_PREFIX: &str = "custom_fields.";
pub const MAX_CUSTOM_FIELDS: usize = 32;

/// Guess patterns this short only match a whole label.
const SHORT_PATTERN_LEN: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("A mapping holds at most {} custom fields", MAX_CUSTOM_FIELDS)]
    TooManyCustomFields,
    #[error("Custom field name cannot be empty")]
    EmptyCustomName,
}

/// Partial binding of lead fields (and custom fields) to sheet columns.
///
/// Serialized as a flat `{key: column}` object; custom entries carry the
/// `custom_fields.` key prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    fields: BTreeMap<LeadField, String>,
    custom: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, field: LeadField, column: impl Into<String>) {
        self.fields.insert(field, column.into());
    }

    pub fn unbind(&mut self, field: LeadField) -> Option<String> {
        self.fields.remove(&field)
    }

    pub fn column_for(&self, field: LeadField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_bound(&self, field: LeadField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn bind_custom(
        &mut self,
        name: impl Into<String>,
        column: impl Into<String>,
    ) -> Result<(), MappingError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(MappingError::EmptyCustomName);
        }
        if !self.custom.contains_key(&name) && self.custom.len() >= MAX_CUSTOM_FIELDS {
            return Err(MappingError::TooManyCustomFields);
        }
        self.custom.insert(name, column.into());
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = (LeadField, &str)> {
        self.fields.iter().map(|(f, c)| (*f, c.as_str()))
    }

    pub fn custom_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.custom.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }

    pub fn custom_column(&self, name: &str) -> Option<&str> {
        self.custom.get(name).map(String::as_str)
    }

    /// Every column referenced by a field or custom binding.
    pub fn bound_columns(&self) -> HashSet<&str> {
        self.fields
            .values()
            .chain(self.custom.values())
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.custom.is_empty()
    }

    /// Title bound to one of `columns`.
    pub fn has_title_in(&self, columns: &[String]) -> bool {
        self.column_for(LeadField::Title)
            .is_some_and(|column| columns.iter().any(|c| c == column))
    }

    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut flat = self
            .fields
            .iter()
            .map(|(field, column)| (field.as_str().to_string(), column.clone()))
            .collect::<BTreeMap<_, _>>();
        for (name, column) in &self.custom {
            flat.insert(format!("{CUSTOM_FIELD_PREFIX}{name}"), column.clone());
        }
        flat
    }

    /// Builds a mapping from flat keys. Unknown keys are ignored.
    pub fn from_flat_map<I, K, V>(entries: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut mapping = ColumnMapping::new();
        for (key, column) in entries {
            let key = key.as_ref();
            if let Some(name) = key.strip_prefix(CUSTOM_FIELD_PREFIX) {
                mapping.bind_custom(name, column)?;
            } else if let Ok(field) = key.parse::<LeadField>() {
                mapping.bind(field, column);
            } else {
                debug!("Ignoring unknown mapping key '{key}'");
            }
        }
        Ok(mapping)
    }
}

impl Serialize for ColumnMapping {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_flat_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ColumnMapping {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let flat = BTreeMap::<String, String>::deserialize(deserializer)?;
        ColumnMapping::from_flat_map(flat).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchPass {
    Exact,
    Contains,
}

impl MatchPass {
    fn accepts(self, label: &str, pattern: &str) -> bool {
        match self {
            MatchPass::Exact => label == pattern,
            MatchPass::Contains => {
                pattern.chars().count() > SHORT_PATTERN_LEN && label.contains(pattern)
            }
        }
    }
}

/// First unclaimed column accepted by `pass` for one of `patterns`; the
/// column is marked as claimed.
fn claim<'c>(
    labels: &[(&'c str, String)],
    claimed: &mut HashSet<String>,
    patterns: &[&str],
    pass: MatchPass,
) -> Option<&'c str> {
    let patterns = patterns
        .iter()
        .map(|pattern| canonical_token(pattern))
        .collect::<Vec<_>>();
    let column = labels
        .iter()
        .filter(|(column, _)| !claimed.contains(*column))
        .find(|(_, label)| patterns.iter().any(|pattern| pass.accepts(label, pattern)))
        .map(|(column, _)| *column)?;
    claimed.insert(column.to_string());
    Some(column)
}

/// Binds still-unbound lead fields, then the company custom fields, to sheet
/// columns. Each column is claimed at most once, columns of existing bindings
/// included. Whole-label matches are tried for every field before any
/// substring match, so `Valor Contrato` goes to `contract_value` rather than
/// `value`. Existing bindings are never replaced.
pub fn auto_match(existing: &ColumnMapping, columns: &[String]) -> ColumnMapping {
    let labels = columns
        .iter()
        .map(|column| (column.as_str(), canonical_token(column)))
        .collect::<Vec<_>>();
    let mut mapping = existing.clone();
    let mut claimed = existing
        .bound_columns()
        .into_iter()
        .map(str::to_string)
        .collect::<HashSet<_>>();

    for pass in [MatchPass::Exact, MatchPass::Contains] {
        for field in LeadField::ALL {
            if mapping.is_bound(field) {
                continue;
            }
            if let Some(column) = claim(&labels, &mut claimed, field.guess_patterns(), pass) {
                debug!("Matched column '{column}' to field {field}");
                mapping.bind(field, column);
            }
        }
        for (name, patterns) in COMPANY_FIELDS {
            if mapping.custom_column(name).is_some() {
                continue;
            }
            if mapping.custom.len() >= MAX_CUSTOM_FIELDS {
                break;
            }
            if let Some(column) = claim(&labels, &mut claimed, patterns, pass) {
                debug!("Matched column '{column}' to custom field {name}");
                mapping.custom.insert(name.to_string(), column.to_string());
            }
        }
    }
    mapping
}

/// Restricts a saved mapping to the columns of the current sheet.
pub fn apply_profile(saved: &ColumnMapping, columns: &[String]) -> ColumnMapping {
    let present = columns.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut mapping = ColumnMapping::new();
    for (field, column) in saved.fields() {
        if present.contains(column) {
            mapping.bind(field, column);
        } else {
            debug!("Dropping {field}: column '{column}' not in sheet");
        }
    }
    for (name, column) in saved.custom_fields() {
        if present.contains(column) {
            // bounded by the saved mapping, which already respects the cap
            let _ = mapping.bind_custom(name, column);
        }
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn auto_match_binds_accented_headers() {
        let cols = columns(&["Nome do Lead", "E-mail", "Telefone", "Descrição", "Valor (R$)"]);
        let mapping = auto_match(&ColumnMapping::new(), &cols);
        assert_eq!(mapping.column_for(LeadField::Title), Some("Nome do Lead"));
        assert_eq!(mapping.column_for(LeadField::Email), Some("E-mail"));
        assert_eq!(mapping.column_for(LeadField::Phone), Some("Telefone"));
        assert_eq!(mapping.column_for(LeadField::Description), Some("Descrição"));
        assert_eq!(mapping.column_for(LeadField::Value), Some("Valor (R$)"));
        assert!(!mapping.is_bound(LeadField::DueDate));
    }

    #[test]
    fn auto_match_keeps_existing_bindings() {
        let cols = columns(&["Nome", "Cliente"]);
        let mut seeded = ColumnMapping::new();
        seeded.bind(LeadField::Title, "Cliente");
        let mapping = auto_match(&seeded, &cols);
        assert_eq!(mapping.column_for(LeadField::Title), Some("Cliente"));
    }

    #[test]
    fn a_column_is_claimed_by_one_field_only() {
        let mapping = auto_match(&ColumnMapping::new(), &columns(&["Valor Contrato", "Nome"]));
        assert_eq!(mapping.column_for(LeadField::ContractValue), Some("Valor Contrato"));
        assert_eq!(mapping.column_for(LeadField::Value), None);
        assert_eq!(mapping.column_for(LeadField::Title), Some("Nome"));

        let mapping = auto_match(&ColumnMapping::new(), &columns(&["Lead Score", "Nome"]));
        assert_eq!(mapping.column_for(LeadField::Title), Some("Nome"));
        assert_eq!(mapping.column_for(LeadField::LeadScore), Some("Lead Score"));

        let mapping = auto_match(&ColumnMapping::new(), &columns(&["external_lead_id", "Cliente"]));
        assert_eq!(mapping.column_for(LeadField::Title), Some("Cliente"));
        assert_eq!(mapping.column_for(LeadField::ExternalLeadId), Some("external_lead_id"));
    }

    #[test]
    fn existing_bindings_keep_their_columns() {
        let mut seeded = ColumnMapping::new();
        seeded.bind(LeadField::Description, "Valor");
        let mapping = auto_match(&seeded, &columns(&["Valor", "Nome"]));
        assert_eq!(mapping.column_for(LeadField::Value), None);
        assert_eq!(mapping.column_for(LeadField::Description), Some("Valor"));
    }

    #[test]
    fn company_columns_become_custom_fields() {
        let cols = columns(&["Nome", "CNPJ", "Razão Social", "Nome Fantasia", "Cidade", "UF", "CEP"]);
        let mapping = auto_match(&ColumnMapping::new(), &cols);
        assert_eq!(mapping.column_for(LeadField::Title), Some("Nome"));
        assert_eq!(mapping.custom_column("cnpj"), Some("CNPJ"));
        assert_eq!(mapping.custom_column("razao_social"), Some("Razão Social"));
        assert_eq!(mapping.custom_column("nome_fantasia"), Some("Nome Fantasia"));
        assert_eq!(mapping.custom_column("cidade"), Some("Cidade"));
        assert_eq!(mapping.custom_column("estado"), Some("UF"));
        assert_eq!(mapping.custom_column("cep"), Some("CEP"));
    }

    #[test]
    fn short_patterns_need_a_whole_label() {
        let mapping = auto_match(&ColumnMapping::new(), &columns(&["Nome", "Rua", "Gruas"]));
        assert_eq!(mapping.custom_column("logradouro"), Some("Rua"));
        let mapping = auto_match(&ColumnMapping::new(), &columns(&["Nome", "Gruas"]));
        assert_eq!(mapping.custom_column("logradouro"), None);
    }

    #[test]
    fn flat_map_round_trip_keeps_custom_prefix() {
        let mut mapping = ColumnMapping::new();
        mapping.bind(LeadField::Title, "Nome");
        mapping.bind_custom("cnpj", "CNPJ").unwrap();
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["title"], "Nome");
        assert_eq!(json["custom_fields.cnpj"], "CNPJ");
        let back: ColumnMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mapping =
            ColumnMapping::from_flat_map([("title", "Nome"), ("nickname", "Apelido")]).unwrap();
        assert_eq!(mapping.fields().count(), 1);
    }

    #[test]
    fn custom_fields_are_capped() {
        let mut mapping = ColumnMapping::new();
        for i in 0..MAX_CUSTOM_FIELDS {
            mapping.bind_custom(format!("f{i}"), "X").unwrap();
        }
        assert_eq!(
            mapping.bind_custom("one_more", "X"),
            Err(MappingError::TooManyCustomFields)
        );
        // rebinding an existing name is still allowed
        mapping.bind_custom("f0", "Y").unwrap();
    }

    #[test]
    fn apply_profile_drops_missing_columns() {
        let mut saved = ColumnMapping::new();
        saved.bind(LeadField::Title, "Nome");
        saved.bind(LeadField::Phone, "Celular");
        saved.bind_custom("cnpj", "CNPJ").unwrap();
        let applied = apply_profile(&saved, &columns(&["Nome", "CNPJ"]));
        assert_eq!(applied.column_for(LeadField::Title), Some("Nome"));
        assert!(!applied.is_bound(LeadField::Phone));
        assert_eq!(applied.custom_fields().count(), 1);
    }
}
