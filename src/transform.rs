//! Source rows to canonical lead records.

use log::debug;

use crate::{
    aliases::{LeadSource, LeadStatus},
    data::SourceRow,
    fields::LeadField,
    mapping::{ColumnMapping, MAX_CUSTOM_FIELDS},
    normalize::{self, normalize_field},
    record::CanonicalLeadRecord,
};

pub const EMAIL_RAW_KEY: &str = "email_raw";

/// Values applied when a row leaves status or source unresolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformDefaults {
    pub status: LeadStatus,
    pub source: LeadSource,
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRow {
    pub row_number: usize,
    pub record: CanonicalLeadRecord,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutcome {
    pub records: Vec<TransformedRow>,
    /// Sheet row numbers dropped for lacking a title.
    pub skipped_rows: Vec<usize>,
}

impl TransformOutcome {
    pub fn total_rows(&self) -> usize {
        self.records.len() + self.skipped_rows.len()
    }
}

/// Builds the record for one row, or `None` when the mapped title is blank.
pub fn transform_row(
    row: &SourceRow,
    mapping: &ColumnMapping,
    defaults: &TransformDefaults,
) -> Option<CanonicalLeadRecord> {
    let cell = |column: &str| row.get(column);
    let title = mapping
        .column_for(LeadField::Title)
        .and_then(cell)
        .and_then(normalize::normalize_text)?;

    let mut record =
        CanonicalLeadRecord::new(title, defaults.status.clone(), defaults.source);
    record.organization_id = defaults.organization_id.clone();

    for (field, column) in mapping.fields() {
        if field == LeadField::Title {
            continue;
        }
        let Some(value) = cell(column) else {
            continue;
        };
        match normalize_field(field.kind(), value) {
            Some(normalized) => {
                record.set(field, normalized);
            }
            None if field == LeadField::Email => {
                if let Some(raw) = normalize::normalize_text(value) {
                    record.custom_fields.insert(EMAIL_RAW_KEY.to_string(), raw);
                }
            }
            None if !value.is_blank() => {
                debug!(
                    "Row {}: could not normalize {field} from '{}'",
                    row.row_number,
                    value.as_display()
                );
            }
            None => {}
        }
    }

    if record.status.is_custom() {
        debug!("Row {}: keeping unrecognized status '{}'", row.row_number, record.status);
    }

    for (name, column) in mapping.custom_fields() {
        if let Some(text) = cell(column).and_then(normalize::normalize_text) {
            record.custom_fields.insert(name.to_string(), text);
        }
    }
    capture_unmapped(row, mapping, &mut record);
    Some(record)
}

/// Copies non-blank cells of columns no binding refers to into the custom
/// fields, keyed by column label, in label order until the map is full.
fn capture_unmapped(row: &SourceRow, mapping: &ColumnMapping, record: &mut CanonicalLeadRecord) {
    let bound = mapping.bound_columns();
    let mut unmapped = row
        .columns()
        .filter(|column| !bound.contains(column))
        .collect::<Vec<_>>();
    unmapped.sort_unstable();
    for column in unmapped {
        if record.custom_fields.contains_key(column) {
            continue;
        }
        let Some(text) = row.get(column).and_then(normalize::normalize_text) else {
            continue;
        };
        if record.custom_fields.len() >= MAX_CUSTOM_FIELDS {
            debug!(
                "Row {}: custom fields full, dropping column '{column}'",
                row.row_number
            );
            break;
        }
        record.custom_fields.insert(column.to_string(), text);
    }
}

/// Transforms a sheet in order. Pure.
pub fn transform_rows<'a, I>(
    rows: I,
    mapping: &ColumnMapping,
    defaults: &TransformDefaults,
) -> TransformOutcome
where
    I: IntoIterator<Item = &'a SourceRow>,
{
    let mut outcome = TransformOutcome::default();
    for row in rows {
        match transform_row(row, mapping, defaults) {
            Some(record) => outcome.records.push(TransformedRow {
                row_number: row.row_number,
                record,
            }),
            None => outcome.skipped_rows.push(row.row_number),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn mapping() -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        mapping.bind(LeadField::Title, "Nome");
        mapping.bind(LeadField::Status, "Etapa");
        mapping.bind(LeadField::Value, "Valor");
        mapping.bind(LeadField::Email, "Email");
        mapping
    }

    #[test]
    fn blank_title_skips_row() {
        let row = SourceRow::from_pairs(2, [("Nome", "   "), ("Valor", "10")]);
        assert!(transform_row(&row, &mapping(), &TransformDefaults::default()).is_none());
    }

    #[test]
    fn unresolved_status_keeps_custom_and_failed_value_is_omitted() {
        let row = SourceRow::from_pairs(
            2,
            [("Nome", "Ana"), ("Etapa", "Em análise"), ("Valor", "abc")],
        );
        let record = transform_row(&row, &mapping(), &TransformDefaults::default()).unwrap();
        assert_eq!(record.status, LeadStatus::Custom("Em análise".into()));
        assert!(record.value.is_none());
    }

    #[test]
    fn defaults_fill_missing_status_and_source() {
        let defaults = TransformDefaults {
            status: LeadStatus::Qualificacao,
            source: LeadSource::MetaAds,
            organization_id: Some("org-1".into()),
        };
        let row = SourceRow::from_pairs(2, [("Nome", "Ana"), ("Valor", "1.234,56")]);
        let record = transform_row(&row, &mapping(), &defaults).unwrap();
        assert_eq!(record.status, LeadStatus::Qualificacao);
        assert_eq!(record.source, LeadSource::MetaAds);
        assert_eq!(record.organization_id.as_deref(), Some("org-1"));
        assert_eq!(record.value, Some(Decimal::new(123456, 2)));
    }

    #[test]
    fn invalid_email_is_kept_raw() {
        let row = SourceRow::from_pairs(2, [("Nome", "Ana"), ("Email", "ana at home")]);
        let record = transform_row(&row, &mapping(), &TransformDefaults::default()).unwrap();
        assert!(record.email.is_none());
        assert_eq!(record.custom_fields.get(EMAIL_RAW_KEY).map(String::as_str), Some("ana at home"));
    }

    #[test]
    fn unmapped_columns_land_in_custom_fields() {
        let row = SourceRow::from_pairs(
            2,
            [
                ("Nome", "Ana"),
                ("Valor", "10"),
                ("CNPJ", "12.345.678/0001-90"),
                ("Observação interna", " ligar cedo "),
                ("Vazio", "  "),
            ],
        );
        let record = transform_row(&row, &mapping(), &TransformDefaults::default()).unwrap();
        let keys = record.custom_fields.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["CNPJ", "Observação interna"]);
        assert_eq!(record.custom_fields["Observação interna"], "ligar cedo");
    }

    #[test]
    fn bound_custom_name_wins_over_raw_label() {
        let mut mapping = mapping();
        mapping.bind_custom("cnpj", "CNPJ").unwrap();
        let row = SourceRow::from_pairs(2, [("Nome", "Ana"), ("CNPJ", "123")]);
        let record = transform_row(&row, &mapping, &TransformDefaults::default()).unwrap();
        assert_eq!(record.custom_fields.len(), 1);
        assert_eq!(record.custom_fields["cnpj"], "123");
    }

    #[test]
    fn captured_columns_stop_at_the_custom_field_limit() {
        let mut pairs = vec![("Nome".to_string(), "Ana".to_string())];
        pairs.extend((0..40).map(|i| (format!("c{i:02}"), format!("v{i}"))));
        let row = SourceRow::from_pairs(2, pairs);
        let record = transform_row(&row, &mapping(), &TransformDefaults::default()).unwrap();
        assert_eq!(record.custom_fields.len(), MAX_CUSTOM_FIELDS);
        assert!(record.custom_fields.contains_key("c31"));
        assert!(!record.custom_fields.contains_key("c32"));
    }

    #[test]
    fn transform_rows_preserves_order_and_counts_skips() {
        let rows = vec![
            SourceRow::from_pairs(2, [("Nome", "A")]),
            SourceRow::from_pairs(3, [("Nome", "")]),
            SourceRow::from_pairs(4, [("Nome", "C")]),
        ];
        let outcome = transform_rows(&rows, &mapping(), &TransformDefaults::default());
        let numbers = outcome.records.iter().map(|r| r.row_number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![2, 4]);
        assert_eq!(outcome.skipped_rows, vec![3]);
        assert_eq!(outcome.total_rows(), 3);
    }
}
